use std::path::PathBuf;

use sheetpump_core::GridError;
use thiserror::Error;

/// Errors raised while exporting or importing
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("No reader type could be detected for {}", .0.display())]
    NoTypeDetected(PathBuf),

    #[error("Failed to convert row {row}: {source}")]
    RowConversion {
        row: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Heading not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error(transparent)]
    Grid(GridError),

    #[error(transparent)]
    Processor(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a processor failure raised while handling one row
    pub fn row(row: u32, source: anyhow::Error) -> Self {
        Error::RowConversion {
            row,
            source: source.into(),
        }
    }
}

impl From<GridError> for Error {
    fn from(err: GridError) -> Self {
        match err {
            GridError::SheetNotFoundByName(name) => Error::SheetNotFound(name),
            GridError::SheetNotFoundByIndex { index, .. } => Error::SheetNotFound(index.to_string()),
            GridError::NoTypeDetected(path) => Error::NoTypeDetected(path),
            other => Error::Grid(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_grid_errors_are_classified() {
        let err: Error = GridError::SheetNotFoundByName("Data".into()).into();
        assert!(matches!(err, Error::SheetNotFound(name) if name == "Data"));

        let err: Error = GridError::NoTypeDetected(PathBuf::from("a.xlsx")).into();
        assert!(matches!(err, Error::NoTypeDetected(_)));
    }

    #[test]
    fn test_row_error_keeps_source() {
        let err = Error::row(4, anyhow::anyhow!("bad value"));
        assert_eq!(err.to_string(), "Failed to convert row 4: bad value");
        assert!(err.source().is_some());
    }
}
