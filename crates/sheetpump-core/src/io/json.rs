use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{ReadFilter, ReadSettings, SheetReader, SheetWriter, WorksheetInfo};
use crate::binder::ValueBinder;
use crate::error::GridError;
use crate::workbook::Workbook;

/// Reads the workbook's own JSON representation
#[derive(Debug, Clone, Default)]
pub struct JsonReader {
    read: ReadSettings,
}

impl JsonReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(path: &Path) -> Result<Workbook, GridError> {
        let text = fs::read_to_string(path)?;
        Ok(Workbook::from_json(&text)?)
    }
}

impl SheetReader for JsonReader {
    fn set_read_filter(&mut self, filter: Arc<dyn ReadFilter>) {
        self.read.filter = filter;
    }

    fn set_read_data_only(&mut self, read_data_only: bool) {
        self.read.read_data_only = read_data_only;
    }

    fn set_read_empty_cells(&mut self, read_empty_cells: bool) {
        self.read.read_empty_cells = read_empty_cells;
    }

    // Cells in this format are already typed.
    fn set_value_binder(&mut self, binder: Arc<dyn ValueBinder>) {
        self.read.binder = binder;
    }

    fn list_worksheet_info(&self, path: &Path) -> Result<Vec<WorksheetInfo>, GridError> {
        let workbook = Self::parse(path)?;
        Ok(workbook
            .sheets
            .iter()
            .map(|sheet| WorksheetInfo {
                name: sheet.name.clone(),
                total_rows: sheet.highest_row(),
                total_columns: sheet.column_count(),
            })
            .collect())
    }

    fn load(&self, path: &Path) -> Result<Workbook, GridError> {
        let mut workbook = Self::parse(path)?;

        for sheet in &mut workbook.sheets {
            let name = sheet.name.clone();
            sheet.retain_cells(|coord, cell| match self.read.admit(&name, coord, cell.clone()) {
                Some(admitted) => {
                    *cell = admitted;
                    true
                }
                None => false,
            });
            if self.read.read_data_only {
                sheet.column_formats.clear();
                sheet.auto_size_columns.clear();
                sheet.charts.clear();
                sheet.drawings.clear();
            }
        }

        Ok(workbook)
    }
}

/// Writes the workbook's own JSON representation
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWriter {
    pretty: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

impl SheetWriter for JsonWriter {
    fn save(&self, workbook: &Workbook, path: &Path) -> Result<(), GridError> {
        let json = if self.pretty {
            workbook.to_json_pretty()?
        } else {
            workbook.to_json()?
        };
        fs::write(path, json)?;
        Ok(())
    }
}
