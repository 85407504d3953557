use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Represents possible cell errors (Excel-compatible)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellError {
    /// #DIV/0! - Division by zero
    DivisionByZero,
    /// #VALUE! - Invalid value type
    InvalidValue,
    /// #REF! - Invalid cell reference
    InvalidReference,
    /// #NAME? - Unrecognized function or name
    InvalidName,
    /// #N/A - Value not available
    NotAvailable,
}

impl CellError {
    /// Parse the display form back into an error value
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "#DIV/0!" => Some(CellError::DivisionByZero),
            "#VALUE!" => Some(CellError::InvalidValue),
            "#REF!" => Some(CellError::InvalidReference),
            "#NAME?" => Some(CellError::InvalidName),
            "#N/A" => Some(CellError::NotAvailable),
            _ => None,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::DivisionByZero => write!(f, "#DIV/0!"),
            CellError::InvalidValue => write!(f, "#VALUE!"),
            CellError::InvalidReference => write!(f, "#REF!"),
            CellError::InvalidName => write!(f, "#NAME?"),
            CellError::NotAvailable => write!(f, "#N/A"),
        }
    }
}

/// Errors raised by the grid model and the file codecs
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Your requested sheet index: {index} is out of bounds. The actual number of sheets is {count}.")]
    SheetNotFoundByIndex { index: usize, count: usize },

    #[error("Your requested sheet name [{0}] is out of bounds.")]
    SheetNotFoundByName(String),

    #[error("Sheet name already exists: {0}")]
    SheetNameExists(String),

    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(String),

    #[error("Invalid cell coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("No reader type could be detected for {}", .0.display())]
    NoTypeDetected(PathBuf),

    #[error("Unsupported input encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl GridError {
    /// True when the error means the requested sheet does not exist
    pub fn is_sheet_not_found(&self) -> bool {
        matches!(
            self,
            GridError::SheetNotFoundByIndex { .. } | GridError::SheetNotFoundByName(_)
        )
    }
}
