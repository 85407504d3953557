use serde::{Deserialize, Serialize};

use crate::cell::CellValue;

/// Number format code for plain text
pub const FORMAT_TEXT: &str = "@";
/// Number format code for two decimals
pub const FORMAT_NUMBER_00: &str = "0.00";
/// Number format code for thousands separated integers
pub const FORMAT_NUMBER_COMMA: &str = "#,##0";
/// Number format code for whole percentages
pub const FORMAT_PERCENTAGE: &str = "0%";

/// Cell formatting properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellFormat {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl CellFormat {
    /// Create a new format with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set bold
    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Builder pattern: set number format code
    pub fn with_number_format(mut self, code: impl Into<String>) -> Self {
        self.number_format = Some(code.into());
        self
    }

    /// Render a value for display using this format's number format
    pub fn render(&self, value: &CellValue) -> String {
        match (&self.number_format, value) {
            (Some(code), CellValue::Number(n)) => format_number(*n, code),
            _ => value.as_text(),
        }
    }
}

/// Apply a (simplified) number format code to a number.
///
/// Supports `General`, `@`, fixed decimals (`0`, `0.00`), thousands
/// separators (`#,##0.00`) and percentages (`0%`, `0.0%`). Anything else
/// falls back to the general representation.
pub fn format_number(n: f64, code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.eq_ignore_ascii_case("General") || code == FORMAT_TEXT {
        return CellValue::Number(n).as_text();
    }

    let (body, percent) = match code.strip_suffix('%') {
        Some(body) => (body, true),
        None => (code, false),
    };

    if !body.chars().all(|c| matches!(c, '0' | '#' | ',' | '.')) {
        return CellValue::Number(n).as_text();
    }

    let value = if percent { n * 100.0 } else { n };
    let decimals = body
        .split_once('.')
        .map(|(_, frac)| frac.chars().filter(|c| *c == '0').count())
        .unwrap_or(0);

    let mut rendered = format!("{:.*}", decimals, value.abs());
    if body.contains(',') {
        rendered = group_thousands(&rendered);
    }
    if value < 0.0 && rendered.chars().any(|c| c.is_ascii_digit() && c != '0') {
        rendered.insert(0, '-');
    }
    if percent {
        rendered.push('%');
    }
    rendered
}

fn group_thousands(rendered: &str) -> String {
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rendered, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match frac_part {
        Some(frac) => format!("{}.{}", grouped, frac),
        None => grouped,
    }
}
