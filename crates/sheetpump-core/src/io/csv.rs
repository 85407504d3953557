use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{ReadFilter, ReadSettings, SheetReader, SheetWriter, WorksheetInfo};
use crate::binder::ValueBinder;
use crate::cell::Cell;
use crate::error::GridError;
use crate::range::CellCoord;
use crate::sheet::Sheet;
use crate::workbook::Workbook;

/// CSV files hold a single sheet with this name
pub const CSV_SHEET_NAME: &str = "Worksheet";

const UTF8_BOM: &str = "\u{feff}";

/// Delimited text settings for reading and writing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    pub delimiter: char,
    pub enclosure: char,
    pub escape_character: Option<char>,
    pub input_encoding: String,
    pub line_ending: String,
    pub use_bom: bool,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            enclosure: '"',
            escape_character: None,
            input_encoding: "UTF-8".to_string(),
            line_ending: "\n".to_string(),
            use_bom: false,
        }
    }
}

impl CsvSettings {
    fn byte(c: char, what: &str) -> Result<u8, GridError> {
        u8::try_from(c).map_err(|_| {
            GridError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} must be a single-byte character, got {:?}", what, c),
            ))
        })
    }

    fn check_encoding(&self) -> Result<(), GridError> {
        match self.input_encoding.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(()),
            _ => Err(GridError::UnsupportedEncoding(self.input_encoding.clone())),
        }
    }
}

/// Reads a delimited text file into a single-sheet workbook
#[derive(Debug, Clone)]
pub struct CsvReader {
    settings: CsvSettings,
    read: ReadSettings,
}

impl CsvReader {
    pub fn new(settings: CsvSettings) -> Self {
        Self {
            settings,
            read: ReadSettings::default(),
        }
    }

    fn records(&self, path: &Path) -> Result<Vec<::csv::StringRecord>, GridError> {
        self.settings.check_encoding()?;

        let text = fs::read_to_string(path)?;
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(&text);

        let mut builder = ::csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(CsvSettings::byte(self.settings.delimiter, "delimiter")?)
            .quote(CsvSettings::byte(self.settings.enclosure, "enclosure")?);
        if let Some(escape) = self.settings.escape_character {
            builder.escape(Some(CsvSettings::byte(escape, "escape character")?));
        }

        let mut reader = builder.from_reader(text.as_bytes());
        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?);
        }
        Ok(records)
    }
}

impl SheetReader for CsvReader {
    fn set_read_filter(&mut self, filter: Arc<dyn ReadFilter>) {
        self.read.filter = filter;
    }

    fn set_read_data_only(&mut self, read_data_only: bool) {
        self.read.read_data_only = read_data_only;
    }

    fn set_read_empty_cells(&mut self, read_empty_cells: bool) {
        self.read.read_empty_cells = read_empty_cells;
    }

    fn set_value_binder(&mut self, binder: Arc<dyn ValueBinder>) {
        self.read.binder = binder;
    }

    fn list_worksheet_info(&self, path: &Path) -> Result<Vec<WorksheetInfo>, GridError> {
        let records = self.records(path)?;
        let total_columns = records.iter().map(|r| r.len()).max().unwrap_or(0);

        Ok(vec![WorksheetInfo {
            name: CSV_SHEET_NAME.to_string(),
            total_rows: records.len() as u32,
            total_columns: total_columns as u32,
        }])
    }

    fn load(&self, path: &Path) -> Result<Workbook, GridError> {
        let records = self.records(path)?;
        let mut sheet = Sheet::new(CSV_SHEET_NAME);

        for (row, record) in records.iter().enumerate() {
            for (col, field) in record.iter().enumerate() {
                let coord = CellCoord::new(row as u32, col as u32);
                let content = if field.is_empty() {
                    Default::default()
                } else {
                    self.read.binder.bind_value(&Value::String(field.to_string()))
                };
                if let Some(cell) = self.read.admit(CSV_SHEET_NAME, coord, Cell::new(content)) {
                    sheet.set_cell(coord, cell);
                }
            }
        }

        tracing::debug!(
            path = %path.display(),
            rows = sheet.highest_row(),
            "loaded csv sheet"
        );

        let mut workbook = Workbook::new();
        workbook.sheets.push(sheet);
        Ok(workbook)
    }
}

/// Writes the first sheet of a workbook as delimited text
#[derive(Debug, Clone)]
pub struct CsvWriter {
    settings: CsvSettings,
    sheet_index: usize,
}

impl CsvWriter {
    pub fn new(settings: CsvSettings) -> Self {
        Self {
            settings,
            sheet_index: 0,
        }
    }

    /// Write a different sheet than the first one
    pub fn with_sheet_index(mut self, index: usize) -> Self {
        self.sheet_index = index;
        self
    }
}

impl SheetWriter for CsvWriter {
    fn save(&self, workbook: &Workbook, path: &Path) -> Result<(), GridError> {
        let sheet = workbook.sheet_by_index(self.sheet_index)?;

        let terminator = match self.settings.line_ending.as_str() {
            "\r\n" => ::csv::Terminator::CRLF,
            other => ::csv::Terminator::Any(
                other
                    .bytes()
                    .next()
                    .map_or(Ok(b'\n'), |b| CsvSettings::byte(b as char, "line ending"))?,
            ),
        };

        let mut buffer = Vec::new();
        if self.settings.use_bom {
            buffer.extend_from_slice(UTF8_BOM.as_bytes());
        }

        {
            let mut writer = ::csv::WriterBuilder::new()
                .flexible(true)
                .delimiter(CsvSettings::byte(self.settings.delimiter, "delimiter")?)
                .quote(CsvSettings::byte(self.settings.enclosure, "enclosure")?)
                .terminator(terminator)
                .from_writer(&mut buffer);

            for (_, cells) in sheet.rows(1, sheet.highest_row()) {
                let fields: Vec<String> = cells
                    .iter()
                    .map(|cell| cell.read_value(true, false).as_text())
                    .collect();
                writer.write_record(&fields)?;
            }
            writer.flush()?;
        }

        fs::write(path, buffer)?;
        Ok(())
    }
}
