use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CellError;
use crate::format::CellFormat;

/// Represents the raw value stored in a cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl CellValue {
    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get the value as a string
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Error(e) => e.to_string(),
        }
    }

    /// Whether the value compares equal to null under loose comparison.
    ///
    /// Empty, `false`, zero and the empty string all count as null.
    pub fn is_loosely_null(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => *n == 0.0,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Boolean(b) => !*b,
            CellValue::Error(_) => false,
        }
    }

    /// Convert to an application-side JSON value.
    ///
    /// Integral numbers become JSON integers so `7.0` reads back as `7`.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::Null,
            CellValue::Number(n) => number_to_json(*n),
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Boolean(b) => Value::Bool(*b),
            CellValue::Error(e) => Value::String(e.to_string()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// The content of a cell - either a raw value or a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CellContent {
    #[serde(rename = "Value")]
    Value {
        #[serde(rename = "value")]
        value: CellValue,
    },
    #[serde(rename = "Formula")]
    Formula {
        #[serde(rename = "expression")]
        /// Original formula text (e.g., "=SUM(A1:A10)")
        expression: String,
        #[serde(rename = "cachedValue")]
        /// Last calculated value, as stored by the producer of the file
        cached_value: CellValue,
    },
}

impl Default for CellContent {
    fn default() -> Self {
        CellContent::Value {
            value: CellValue::Empty,
        }
    }
}

impl CellContent {
    pub fn value(value: impl Into<CellValue>) -> Self {
        CellContent::Value {
            value: value.into(),
        }
    }

    /// Create a new formula content
    pub fn formula(expression: impl Into<String>) -> Self {
        CellContent::Formula {
            expression: expression.into(),
            cached_value: CellValue::Empty,
        }
    }

    /// Get the computed value (for both value and formula)
    pub fn computed_value(&self) -> &CellValue {
        match self {
            CellContent::Value { value } => value,
            CellContent::Formula { cached_value, .. } => cached_value,
        }
    }

    /// Check if this is a formula
    pub fn is_formula(&self) -> bool {
        matches!(self, CellContent::Formula { .. })
    }

    /// Get the formula expression if this is a formula
    pub fn formula_expression(&self) -> Option<&str> {
        match self {
            CellContent::Formula { expression, .. } => Some(expression),
            _ => None,
        }
    }

    /// Check if this content is empty (empty value, not a formula)
    pub fn is_empty(&self) -> bool {
        matches!(
            self,
            CellContent::Value {
                value: CellValue::Empty
            }
        )
    }
}

/// Complete cell data structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub content: CellContent,
    #[serde(default, skip_serializing_if = "is_default_format")]
    pub format: CellFormat,
}

fn is_default_format(format: &CellFormat) -> bool {
    *format == CellFormat::default()
}

impl Cell {
    /// Create a new cell with a value
    pub fn new(content: CellContent) -> Self {
        Cell {
            content,
            format: CellFormat::default(),
        }
    }

    /// Create a cell with a number value
    pub fn number(value: f64) -> Self {
        Cell::new(CellContent::value(value))
    }

    /// Create a cell with a text value
    pub fn text(value: impl Into<String>) -> Self {
        Cell::new(CellContent::value(value.into()))
    }

    /// Create a cell with a boolean value
    pub fn boolean(value: bool) -> Self {
        Cell::new(CellContent::value(value))
    }

    /// Create a cell with a formula
    pub fn formula(expression: impl Into<String>) -> Self {
        Cell::new(CellContent::formula(expression))
    }

    /// Create a formula cell that carries a previously calculated result
    pub fn calculated(expression: impl Into<String>, cached_value: CellValue) -> Self {
        Cell::new(CellContent::Formula {
            expression: expression.into(),
            cached_value,
        })
    }

    /// Get the computed value of the cell
    pub fn computed_value(&self) -> &CellValue {
        self.content.computed_value()
    }

    /// Value as read back by an importer.
    ///
    /// Formula cells yield their expression unless `calculate` is set, in which
    /// case the cached result is used. With `formatted`, the cell's number
    /// format is applied and the result is always text.
    pub fn read_value(&self, calculate: bool, formatted: bool) -> CellValue {
        let raw = match &self.content {
            CellContent::Formula { expression, .. } if !calculate => {
                return CellValue::Text(expression.clone());
            }
            content => content.computed_value(),
        };

        if formatted && !raw.is_empty() {
            CellValue::Text(self.format.render(raw))
        } else {
            raw.clone()
        }
    }

    /// Check if the cell is empty (empty value and default format)
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.format == CellFormat::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_value_as_number() {
        assert_eq!(CellValue::Number(42.0).as_number(), Some(42.0));
        assert_eq!(CellValue::Boolean(true).as_number(), Some(1.0));
        assert_eq!(CellValue::Text("123".to_string()).as_number(), Some(123.0));
        assert_eq!(CellValue::Empty.as_number(), None);
    }

    #[test]
    fn test_cell_value_as_text() {
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
        assert_eq!(CellValue::Number(42.5).as_text(), "42.5");
        assert_eq!(CellValue::Boolean(true).as_text(), "TRUE");
        assert_eq!(CellValue::Text("hello".to_string()).as_text(), "hello");
    }

    #[test]
    fn test_loose_null() {
        assert!(CellValue::Empty.is_loosely_null());
        assert!(CellValue::Number(0.0).is_loosely_null());
        assert!(CellValue::Text(String::new()).is_loosely_null());
        assert!(CellValue::Boolean(false).is_loosely_null());
        assert!(!CellValue::Text("0".to_string()).is_loosely_null());
        assert!(!CellValue::Number(1.0).is_loosely_null());
    }

    #[test]
    fn test_to_json_keeps_integers() {
        assert_eq!(CellValue::Number(7.0).to_json(), json!(7));
        assert_eq!(CellValue::Number(1.5).to_json(), json!(1.5));
        assert_eq!(CellValue::Empty.to_json(), json!(null));
        assert_eq!(CellValue::Boolean(true).to_json(), json!(true));
    }

    #[test]
    fn test_read_value_formula() {
        let cell = Cell::calculated("=A1+B1", CellValue::Number(3.0));
        assert_eq!(cell.read_value(false, false), CellValue::Text("=A1+B1".into()));
        assert_eq!(cell.read_value(true, false), CellValue::Number(3.0));
    }

    #[test]
    fn test_read_value_formatted() {
        let mut cell = Cell::number(1234.5);
        cell.format.number_format = Some("#,##0.00".to_string());
        assert_eq!(cell.read_value(false, true), CellValue::Text("1,234.50".into()));
        assert_eq!(cell.read_value(false, false), CellValue::Number(1234.5));
    }
}
