//! File codecs and the reader/writer factory.
//!
//! Readers materialise a [`Workbook`] from disk, optionally restricted by a
//! [`ReadFilter`] so that only part of a large sheet is loaded.

pub mod csv;
pub mod html;
pub mod json;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::binder::{DefaultValueBinder, ValueBinder};
use crate::cell::Cell;
use crate::error::GridError;
use crate::range::CellCoord;
use crate::workbook::Workbook;

pub use self::csv::{CsvReader, CsvSettings, CsvWriter};
pub use self::html::{HtmlTableLoader, ViewLoader};
pub use self::json::{JsonReader, JsonWriter};

/// Decides which cells a reader materialises
pub trait ReadFilter: Send + Sync {
    /// `row` is 1-based, `column` is a label such as "B"
    fn read_cell(&self, column: &str, row: u32, worksheet_name: &str) -> bool;
}

/// Accepts every cell
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReadFilter;

impl ReadFilter for DefaultReadFilter {
    fn read_cell(&self, _column: &str, _row: u32, _worksheet_name: &str) -> bool {
        true
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Csv,
    Json,
}

impl FileType {
    /// Detect the type from a file extension
    pub fn identify(path: &Path) -> Result<Self, GridError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv") | Some("tsv") | Some("txt") => Ok(FileType::Csv),
            Some("json") => Ok(FileType::Json),
            _ => Err(GridError::NoTypeDetected(path.to_path_buf())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Json => "json",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Csv => write!(f, "Csv"),
            FileType::Json => write!(f, "Json"),
        }
    }
}

/// Dimensions of a worksheet, obtained without keeping the cells around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetInfo {
    pub name: String,
    pub total_rows: u32,
    pub total_columns: u32,
}

/// A reader bound to one file type
pub trait SheetReader: Send {
    fn set_read_filter(&mut self, filter: Arc<dyn ReadFilter>);

    /// Drop formatting and keep values only
    fn set_read_data_only(&mut self, read_data_only: bool);

    /// Whether cells without a value are materialised
    fn set_read_empty_cells(&mut self, read_empty_cells: bool);

    fn set_value_binder(&mut self, binder: Arc<dyn ValueBinder>);

    fn list_worksheet_info(&self, path: &Path) -> Result<Vec<WorksheetInfo>, GridError>;

    fn load(&self, path: &Path) -> Result<Workbook, GridError>;
}

/// Writes a workbook to a file
pub trait SheetWriter: Send {
    fn save(&self, workbook: &Workbook, path: &Path) -> Result<(), GridError>;
}

/// Settings shared by every reader implementation
#[derive(Clone)]
pub struct ReadSettings {
    pub filter: Arc<dyn ReadFilter>,
    pub read_data_only: bool,
    pub read_empty_cells: bool,
    pub binder: Arc<dyn ValueBinder>,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            filter: Arc::new(DefaultReadFilter),
            read_data_only: false,
            read_empty_cells: true,
            binder: Arc::new(DefaultValueBinder),
        }
    }
}

impl fmt::Debug for ReadSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSettings")
            .field("read_data_only", &self.read_data_only)
            .field("read_empty_cells", &self.read_empty_cells)
            .finish()
    }
}

impl ReadSettings {
    /// Apply filter and loading flags to one cell; `None` means skip it
    pub fn admit(&self, sheet: &str, coord: CellCoord, mut cell: Cell) -> Option<Cell> {
        if !self
            .filter
            .read_cell(&coord.column_label(), coord.row_number(), sheet)
        {
            return None;
        }
        if cell.content.is_empty() && !self.read_empty_cells {
            return None;
        }
        if self.read_data_only {
            cell.format = Default::default();
        }
        Some(cell)
    }
}

/// Serializable description of how to construct a reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderOptions {
    pub file_type: FileType,
    #[serde(default = "default_true")]
    pub read_data_only: bool,
    #[serde(default)]
    pub csv: CsvSettings,
}

fn default_true() -> bool {
    true
}

impl ReaderOptions {
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            read_data_only: true,
            csv: CsvSettings::default(),
        }
    }
}

/// Build a fresh reader for the given options
pub fn create_reader(options: &ReaderOptions) -> Box<dyn SheetReader> {
    let mut reader: Box<dyn SheetReader> = match options.file_type {
        FileType::Csv => Box::new(CsvReader::new(options.csv.clone())),
        FileType::Json => Box::new(JsonReader::new()),
    };
    reader.set_read_data_only(options.read_data_only);
    reader
}

/// Build a writer for the given type
pub fn create_writer(file_type: FileType, csv: &CsvSettings) -> Box<dyn SheetWriter> {
    match file_type {
        FileType::Csv => Box::new(CsvWriter::new(csv.clone())),
        FileType::Json => Box::new(JsonWriter::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct OnlyRow(u32);

    impl ReadFilter for OnlyRow {
        fn read_cell(&self, _column: &str, row: u32, _worksheet_name: &str) -> bool {
            row == self.0
        }
    }

    #[test]
    fn test_identify() {
        assert_eq!(FileType::identify(Path::new("a/b.CSV")).unwrap(), FileType::Csv);
        assert_eq!(FileType::identify(Path::new("x.json")).unwrap(), FileType::Json);

        let err = FileType::identify(Path::new("report.xlsx")).unwrap_err();
        assert!(matches!(err, GridError::NoTypeDetected(p) if p == PathBuf::from("report.xlsx")));
    }

    #[test]
    fn test_read_settings_admit() {
        let settings = ReadSettings {
            filter: Arc::new(OnlyRow(2)),
            read_empty_cells: false,
            read_data_only: true,
            ..ReadSettings::default()
        };

        let mut bold = Cell::number(1.0);
        bold.format.bold = true;

        assert!(settings.admit("S", CellCoord::new(0, 0), bold.clone()).is_none());
        let admitted = settings.admit("S", CellCoord::new(1, 0), bold).unwrap();
        assert!(!admitted.format.bold);
        assert!(settings.admit("S", CellCoord::new(1, 1), Cell::default()).is_none());
    }
}
