//! Value binders decide how a raw application or file value becomes cell content.

use serde_json::Value;

use crate::cell::CellContent;
use crate::sheet::parse_cell_input;

/// Turns a raw value into typed cell content
pub trait ValueBinder: Send + Sync {
    fn bind_value(&self, value: &Value) -> CellContent;
}

/// Keeps strings as text except formulas and plain numbers
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueBinder;

impl ValueBinder for DefaultValueBinder {
    fn bind_value(&self, value: &Value) -> CellContent {
        match value {
            Value::String(s) => {
                if s.len() > 1 && s.starts_with('=') {
                    return CellContent::formula(s.as_str());
                }
                match s.trim().parse::<f64>() {
                    Ok(n) if n.is_finite() && !s.trim().is_empty() => CellContent::value(n),
                    _ => CellContent::value(s.as_str()),
                }
            }
            other => bind_scalar(other),
        }
    }
}

/// Also recognises booleans and percentages in strings
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvancedValueBinder;

impl ValueBinder for AdvancedValueBinder {
    fn bind_value(&self, value: &Value) -> CellContent {
        match value {
            Value::String(s) => parse_cell_input(s),
            other => bind_scalar(other),
        }
    }
}

/// Stores every string as text, even if it looks like a number or formula
#[derive(Debug, Clone, Copy, Default)]
pub struct StringValueBinder;

impl ValueBinder for StringValueBinder {
    fn bind_value(&self, value: &Value) -> CellContent {
        match value {
            Value::String(s) => CellContent::value(s.as_str()),
            other => bind_scalar(other),
        }
    }
}

fn bind_scalar(value: &Value) -> CellContent {
    match value {
        Value::Null => CellContent::default(),
        Value::Bool(b) => CellContent::value(*b),
        Value::Number(n) => n
            .as_f64()
            .map(CellContent::value)
            .unwrap_or_default(),
        Value::String(s) => CellContent::value(s.as_str()),
        nested => CellContent::value(nested.to_string()),
    }
}
