//! Heading row and row range resolution.
//!
//! Everything here is computed once per operation from the processor's
//! capabilities plus a fixed "highest row" figure. Chunked imports take that
//! figure from the worksheet info before any chunk runs, so later chunks never
//! see a different range than earlier ones.

use sheetpump_core::Sheet;

use crate::concerns::Concerns;
use crate::config::HeadingFormatter;
use crate::row::HeadingRowState;

/// Inclusive, 1-based row window of one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub start_row: u32,
    pub end_row: u32,
}

impl RowBounds {
    pub fn is_empty(&self) -> bool {
        self.end_row < self.start_row
    }

    pub fn len(&self) -> u32 {
        self.end_row.saturating_add(1).saturating_sub(self.start_row)
    }
}

/// Headings plus row window, as resolved for one sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub heading: HeadingRowState,
    pub bounds: RowBounds,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingResolver {
    formatter: HeadingFormatter,
}

impl HeadingResolver {
    pub fn new(formatter: HeadingFormatter) -> Self {
        Self { formatter }
    }

    /// Declared heading row, if any
    pub fn heading_row(concerns: &Concerns<'_>) -> Option<u32> {
        concerns.with_heading_row.map(|h| h.heading_row().max(1))
    }

    /// First data row: below the heading row, else the declared start row, else 1
    pub fn start_row(concerns: &Concerns<'_>) -> u32 {
        match Self::heading_row(concerns) {
            Some(heading_row) => heading_row.saturating_add(1),
            None => concerns
                .with_start_row
                .map(|s| s.start_row().max(1))
                .unwrap_or(1),
        }
    }

    /// Last data row: start + limit - 1 when limited, never past `highest_row`
    pub fn end_row(concerns: &Concerns<'_>, start_row: u32, highest_row: u32) -> u32 {
        match concerns.with_limit {
            Some(limit) => start_row
                .saturating_add(limit.limit())
                .saturating_sub(1)
                .min(highest_row),
            None => highest_row,
        }
    }

    pub fn bounds(concerns: &Concerns<'_>, highest_row: u32) -> RowBounds {
        let start_row = Self::start_row(concerns);
        RowBounds {
            start_row,
            end_row: Self::end_row(concerns, start_row, highest_row),
        }
    }

    /// Read and format the heading labels from `sheet`
    pub fn headings(&self, sheet: &Sheet, heading_row: Option<u32>) -> HeadingRowState {
        let Some(row_number) = heading_row else {
            return HeadingRowState::none();
        };

        let labels = sheet
            .row_cells(row_number, sheet.column_count())
            .iter()
            .map(|cell| format_heading(self.formatter, &cell.read_value(true, false).as_text()))
            .collect();

        HeadingRowState::new(row_number, labels)
    }

    pub fn resolve(&self, sheet: &Sheet, concerns: &Concerns<'_>) -> ResolvedRange {
        ResolvedRange {
            heading: self.headings(sheet, Self::heading_row(concerns)),
            bounds: Self::bounds(concerns, sheet.highest_row()),
        }
    }
}

pub fn format_heading(formatter: HeadingFormatter, label: &str) -> String {
    match formatter {
        HeadingFormatter::Slug => slug(label),
        HeadingFormatter::Raw => label.to_string(),
    }
}

/// Lowercase, with runs of anything non-alphanumeric collapsed to `_`
pub fn slug(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_separator = false;

    for c in label.trim().chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}
