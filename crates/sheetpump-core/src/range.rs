use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell coordinate (0-indexed internally).
///
/// Sheets expose 1-based row numbers to callers; `row_number()` converts.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub const fn new(row: u32, col: u32) -> Self {
        CellCoord { row, col }
    }

    /// 1-based row number as shown in A1 notation
    pub fn row_number(&self) -> u32 {
        self.row + 1
    }

    /// Column label (A, B, ..., AA)
    pub fn column_label(&self) -> String {
        col_to_label(self.col)
    }

    /// Create from A1 notation (e.g., "A1" -> (0, 0), "B2" -> (1, 1)).
    ///
    /// Absolute markers (`$A$1`) are accepted and ignored.
    pub fn from_a1(notation: &str) -> Option<Self> {
        let (col_str, row_str) = split_coordinate(notation)?;
        let col = col_from_label(&col_str)?;
        let row: u32 = row_str.parse().ok()?;

        if row == 0 {
            return None; // Rows are 1-indexed in A1 notation
        }

        Some(CellCoord { row: row - 1, col })
    }

    /// Convert to A1 notation (e.g., (0, 0) -> "A1")
    pub fn to_a1(&self) -> String {
        format!("{}{}", col_to_label(self.col), self.row + 1)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

/// Split "AB12" into ("AB", "12"), uppercasing the column part
fn split_coordinate(notation: &str) -> Option<(String, String)> {
    let notation = notation.trim().replace('$', "").to_uppercase();
    let mut col_str = String::new();
    let mut row_str = String::new();

    for c in notation.chars() {
        if c.is_ascii_alphabetic() {
            if !row_str.is_empty() {
                return None; // Letters after numbers
            }
            col_str.push(c);
        } else if c.is_ascii_digit() {
            row_str.push(c);
        } else {
            return None;
        }
    }

    if col_str.is_empty() || row_str.is_empty() {
        return None;
    }

    Some((col_str, row_str))
}

/// Column label for a 0-based index: 0 -> A, 25 -> Z, 26 -> AA
pub fn col_to_label(col: u32) -> String {
    let mut digits = Vec::new();
    let mut n = col as u64 + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        digits.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    digits.iter().rev().collect()
}

/// 0-based index of a column label, case-insensitive; `None` if not a label
pub fn col_from_label(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    label
        .chars()
        .try_fold(0u32, |acc, c| {
            let digit = c.is_ascii_alphabetic().then(|| c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
            acc.checked_mul(26)?.checked_add(digit)
        })
        .map(|n| n - 1)
}

/// Column labels from `lower` to `upper` inclusive ("A".."C" -> A, B, C)
pub fn column_range(lower: &str, upper: &str) -> Vec<String> {
    match (col_from_label(lower), col_from_label(upper)) {
        (Some(lo), Some(hi)) if lo <= hi => (lo..=hi).map(col_to_label).collect(),
        _ => Vec::new(),
    }
}

/// A range of cells (e.g., A1:B10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellCoord,
    pub end: CellCoord,
}

impl CellRange {
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        // Normalize so start is top-left and end is bottom-right
        CellRange {
            start: CellCoord::new(start.row.min(end.row), start.col.min(end.col)),
            end: CellCoord::new(start.row.max(end.row), start.col.max(end.col)),
        }
    }

    /// Create from A1:B1 notation
    pub fn from_a1(notation: &str) -> Option<Self> {
        let parts: Vec<&str> = notation.split(':').collect();
        match parts.len() {
            1 => {
                let coord = CellCoord::from_a1(parts[0])?;
                Some(CellRange::new(coord, coord))
            }
            2 => {
                let start = CellCoord::from_a1(parts[0])?;
                let end = CellCoord::from_a1(parts[1])?;
                Some(CellRange::new(start, end))
            }
            _ => None,
        }
    }

    /// Convert to A1:B1 notation
    pub fn to_a1(&self) -> String {
        if self.start == self.end {
            self.start.to_a1()
        } else {
            format!("{}:{}", self.start.to_a1(), self.end.to_a1())
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}
