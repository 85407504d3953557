use serde::{Deserialize, Serialize};

use sheetpump_core::ReadFilter;

use crate::error::{Error, Result};

/// One planned chunk: an absolute row window of a named sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub start_row: u32,
    pub size: u32,
    pub sheet_name: String,
}

impl ChunkSpec {
    pub fn new(sheet_name: impl Into<String>, start_row: u32, size: u32) -> Result<Self> {
        if start_row < 1 {
            return Err(Error::InvalidChunk(format!("start row must be at least 1, got {}", start_row)));
        }
        if size < 1 {
            return Err(Error::InvalidChunk("chunk size must be at least 1".to_string()));
        }
        Ok(Self {
            start_row,
            size,
            sheet_name: sheet_name.into(),
        })
    }

    pub fn end_row(&self) -> u32 {
        self.start_row.saturating_add(self.size - 1)
    }

    /// End row, clipped to the sheet's highest populated row
    pub fn clipped_end(&self, highest_row: u32) -> u32 {
        self.end_row().min(highest_row)
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.start_row && row <= self.end_row()
    }
}

/// Split `[start_row, end_row]` into consecutive windows of `size` rows.
///
/// The last window is clipped to `end_row`. An empty range yields no chunks.
pub fn plan(sheet_name: &str, start_row: u32, end_row: u32, size: u32) -> Result<Vec<ChunkSpec>> {
    if size < 1 {
        return Err(Error::InvalidChunk("chunk size must be at least 1".to_string()));
    }

    let mut chunks = Vec::new();
    let mut current = start_row.max(1);
    while current <= end_row {
        let len = size.min(end_row - current + 1);
        chunks.push(ChunkSpec::new(sheet_name, current, len)?);
        match current.checked_add(len) {
            Some(next) => current = next,
            None => break,
        }
    }

    tracing::debug!(sheet = sheet_name, start_row, end_row, size, chunks = chunks.len(), "planned chunks");
    Ok(chunks)
}

/// Restricts a reader to one chunk window plus the heading row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReadFilter {
    heading_row: Option<u32>,
    start_row: u32,
    end_row: u32,
    worksheet_name: String,
}

impl ChunkReadFilter {
    pub fn new(heading_row: Option<u32>, chunk: &ChunkSpec) -> Self {
        Self {
            heading_row,
            start_row: chunk.start_row,
            end_row: chunk.end_row(),
            worksheet_name: chunk.sheet_name.clone(),
        }
    }
}

impl ReadFilter for ChunkReadFilter {
    fn read_cell(&self, _column: &str, row: u32, worksheet_name: &str) -> bool {
        if worksheet_name != self.worksheet_name {
            return false;
        }
        (row >= self.start_row && row <= self.end_row) || self.heading_row == Some(row)
    }
}
