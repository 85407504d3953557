use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::cell::{Cell, CellContent, CellValue};
use crate::drawing::{Chart, Drawing};
use crate::range::{col_from_label, col_to_label, CellCoord};

type RowMap = BTreeMap<u32, BTreeMap<u32, Cell>>;

/// A single worksheet with sparse, row-major cell storage.
///
/// Row numbers in the public API are 1-based, matching A1 notation.
/// Column indexes are 0-based.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet name (displayed in tab)
    pub name: String,
    /// Only non-empty cells are stored, keyed by 0-based row then column
    #[serde(default, with = "cells_serde")]
    cells: RowMap,
    /// Number format codes applied per column label
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_formats: BTreeMap<String, String>,
    /// Columns flagged for auto-sizing
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub auto_size_columns: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<Chart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drawings: Vec<Drawing>,
}

/// Serialize cells as a flat map keyed by A1 coordinate
mod cells_serde {
    use super::*;
    use serde::ser::SerializeMap;
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(cells: &RowMap, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = cells.values().map(BTreeMap::len).sum();
        let mut map = serializer.serialize_map(Some(len))?;
        for (row, columns) in cells {
            for (col, cell) in columns {
                map.serialize_entry(&CellCoord::new(*row, *col).to_a1(), cell)?;
            }
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RowMap, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CellsVisitor;

        impl<'de> de::Visitor<'de> for CellsVisitor {
            type Value = RowMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map with A1 coordinate keys")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let mut cells = RowMap::new();

                while let Some(key) = map.next_key::<String>()? {
                    let cell: Cell = map.next_value()?;
                    let coord = CellCoord::from_a1(&key).ok_or_else(|| {
                        de::Error::custom(format!("invalid cell coordinate: {}", key))
                    })?;
                    if !cell.is_empty() {
                        cells.entry(coord.row).or_default().insert(coord.col, cell);
                    }
                }

                Ok(cells)
            }
        }

        deserializer.deserialize_map(CellsVisitor)
    }
}

impl Sheet {
    /// Maximum number of rows (Excel compatibility)
    pub const MAX_ROWS: u32 = 1_048_576;
    /// Maximum number of columns (Column XFD)
    pub const MAX_COLS: u32 = 16_384;

    /// Create a new empty sheet with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get a reference to a cell at the given coordinate
    pub fn get_cell(&self, coord: CellCoord) -> Option<&Cell> {
        self.cells.get(&coord.row)?.get(&coord.col)
    }

    /// Get a cell by A1 coordinate
    pub fn get_cell_a1(&self, notation: &str) -> Option<&Cell> {
        self.get_cell(CellCoord::from_a1(notation)?)
    }

    /// Set a cell at the given coordinate; empty cells are removed
    pub fn set_cell(&mut self, coord: CellCoord, cell: Cell) {
        if cell.is_empty() {
            self.remove_cell(coord);
        } else {
            self.cells.entry(coord.row).or_default().insert(coord.col, cell);
        }
    }

    /// Set the content of a cell, keeping its format
    pub fn set_content(&mut self, coord: CellCoord, content: CellContent) {
        let format = self
            .get_cell(coord)
            .map(|c| c.format.clone())
            .unwrap_or_default();
        self.set_cell(coord, Cell { content, format });
    }

    /// Remove a cell (make it empty)
    pub fn remove_cell(&mut self, coord: CellCoord) {
        if let Some(columns) = self.cells.get_mut(&coord.row) {
            columns.remove(&coord.col);
            if columns.is_empty() {
                self.cells.remove(&coord.row);
            }
        }
    }

    /// Get the computed value of a cell (returns Empty for non-existent cells)
    pub fn get_cell_value(&self, coord: CellCoord) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.get_cell(coord)
            .map(|c| c.computed_value())
            .unwrap_or(&EMPTY)
    }

    /// Whether a cell exists at an A1 coordinate
    pub fn cell_exists(&self, notation: &str) -> bool {
        self.get_cell_a1(notation).is_some()
    }

    /// Highest populated row number (1-based), 0 for an empty sheet
    pub fn highest_row(&self) -> u32 {
        self.cells.keys().next_back().map_or(0, |row| row + 1)
    }

    /// Highest populated row number within one column, 0 if the column is empty
    pub fn highest_row_in_column(&self, col: u32) -> u32 {
        self.cells
            .iter()
            .rev()
            .find(|(_, columns)| columns.contains_key(&col))
            .map_or(0, |(row, _)| row + 1)
    }

    /// Number of columns up to the right-most populated one
    pub fn column_count(&self) -> u32 {
        self.cells
            .values()
            .filter_map(|columns| columns.keys().next_back())
            .max()
            .map_or(0, |col| col + 1)
    }

    /// Label of the right-most populated column ("A" for an empty sheet)
    pub fn highest_data_column(&self) -> String {
        col_to_label(self.column_count().saturating_sub(1))
    }

    /// Cells of one row, padded with empty cells to `width` columns
    pub fn row_cells(&self, row_number: u32, width: u32) -> Vec<Cell> {
        let mut cells = vec![Cell::default(); width as usize];
        if let Some(columns) = row_number
            .checked_sub(1)
            .and_then(|row| self.cells.get(&row))
        {
            for (col, cell) in columns.range(..width) {
                cells[*col as usize] = cell.clone();
            }
        }
        cells
    }

    /// Iterate rows `start..=end` (1-based, inclusive).
    ///
    /// Every row number in the window is yielded, including empty ones, each
    /// padded to the sheet's column count at the time of the call.
    pub fn rows(&self, start: u32, end: u32) -> RowIter<'_> {
        RowIter {
            sheet: self,
            next: start.max(1),
            end,
            width: self.column_count(),
        }
    }

    /// Write a block of rows starting at `start`.
    ///
    /// With `strict_null` only `Empty` values are skipped; otherwise every
    /// loosely-null value (empty, `false`, `0`, `""`) is left unwritten.
    pub fn from_array(&mut self, rows: Vec<Vec<CellContent>>, start: CellCoord, strict_null: bool) {
        for (row_offset, row) in rows.into_iter().enumerate() {
            for (col_offset, content) in row.into_iter().enumerate() {
                let skip = match &content {
                    CellContent::Formula { .. } => false,
                    CellContent::Value { value } if strict_null => value.is_empty(),
                    CellContent::Value { value } => value.is_loosely_null(),
                };
                if skip {
                    continue;
                }
                let coord = CellCoord::new(
                    start.row + row_offset as u32,
                    start.col + col_offset as u32,
                );
                self.set_content(coord, content);
            }
        }
    }

    /// Apply a number format to a column for rows 1..=highest row
    pub fn format_column(&mut self, column: &str, code: &str) {
        let Some(col) = col_from_label(column) else {
            return;
        };
        for columns in self.cells.values_mut() {
            if let Some(cell) = columns.get_mut(&col) {
                cell.format.number_format = Some(code.to_string());
            }
        }
        self.column_formats
            .insert(column.to_uppercase(), code.to_string());
    }

    /// Flag a column for auto-sizing
    pub fn set_auto_size(&mut self, column: &str) {
        self.auto_size_columns.insert(column.to_uppercase());
    }

    pub fn add_chart(&mut self, chart: Chart) {
        self.charts.push(chart);
    }

    pub fn add_drawing(&mut self, drawing: Drawing) {
        self.drawings.push(drawing);
    }

    /// Iterate all stored cells in row-major order
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellCoord, &Cell)> + '_ {
        self.cells.iter().flat_map(|(row, columns)| {
            columns
                .iter()
                .map(move |(col, cell)| (CellCoord::new(*row, *col), cell))
        })
    }

    /// Keep only the cells for which `keep` returns true; `keep` may edit them
    pub fn retain_cells<F>(&mut self, mut keep: F)
    where
        F: FnMut(CellCoord, &mut Cell) -> bool,
    {
        for (row, columns) in self.cells.iter_mut() {
            columns.retain(|col, cell| keep(CellCoord::new(*row, *col), cell));
        }
        self.cells.retain(|_, columns| !columns.is_empty());
    }

    /// Get the number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Check if the sheet is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Release all cell storage
    pub fn disconnect_cells(&mut self) {
        self.cells.clear();
        self.charts.clear();
        self.drawings.clear();
    }
}

/// Finite iterator over a fixed row window of a sheet
pub struct RowIter<'a> {
    sheet: &'a Sheet,
    next: u32,
    end: u32,
    width: u32,
}

impl Iterator for RowIter<'_> {
    type Item = (u32, Vec<Cell>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.end {
            return None;
        }
        let row_number = self.next;
        self.next += 1;
        Some((row_number, self.sheet.row_cells(row_number, self.width)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end + 1).saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

/// Parse user input to determine cell content type
pub fn parse_cell_input(input: &str) -> CellContent {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return CellContent::default();
    }

    // Formulas: store expression
    if trimmed.starts_with('=') && trimmed.len() > 1 {
        return CellContent::formula(trimmed);
    }

    // Boolean
    match trimmed.to_uppercase().as_str() {
        "TRUE" => return CellContent::value(true),
        "FALSE" => return CellContent::value(false),
        _ => {}
    }

    // Number
    if let Ok(num) = trimmed.parse::<f64>() {
        if num.is_finite() {
            return CellContent::value(num);
        }
    }

    // Percentage
    if let Some(body) = trimmed.strip_suffix('%') {
        if let Ok(num) = body.parse::<f64>() {
            return CellContent::value(num / 100.0);
        }
    }

    // Text keeps surrounding whitespace
    CellContent::value(input.to_string())
}
