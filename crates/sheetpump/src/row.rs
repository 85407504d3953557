use serde_json::{Map, Value};
use std::sync::Arc;

use sheetpump_core::Cell;

use crate::error::{Error, Result};

/// The heading row of one sheet, resolved once per operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadingRowState {
    /// 1-based row number, `None` when the processor has no heading row
    pub row_number: Option<u32>,
    /// Formatted labels in column order; empty labels fall back to positional keys
    pub labels: Vec<String>,
}

impl HeadingRowState {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(row_number: u32, labels: Vec<String>) -> Self {
        Self {
            row_number: Some(row_number),
            labels,
        }
    }

    pub fn is_present(&self) -> bool {
        self.row_number.is_some()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| !l.is_empty() && l == label)
    }

    /// Record key for a column
    pub fn key(&self, column: usize) -> String {
        match self.labels.get(column) {
            Some(label) if !label.is_empty() => label.clone(),
            _ => column.to_string(),
        }
    }
}

/// One sheet row.
///
/// Column order matches the sheet. Conversions never modify the row.
#[derive(Debug, Clone)]
pub struct Row {
    index: u32,
    cells: Vec<Cell>,
    headings: Option<Arc<HeadingRowState>>,
}

impl Row {
    /// Build a row; cells are padded so every heading has a column
    pub fn new(index: u32, mut cells: Vec<Cell>, headings: Option<Arc<HeadingRowState>>) -> Self {
        let headings = headings.filter(|h| h.is_present());
        if let Some(h) = &headings {
            if cells.len() < h.labels.len() {
                cells.resize(h.labels.len(), Cell::default());
            }
        }
        Self {
            index,
            cells,
            headings,
        }
    }

    /// 1-based row number in the sheet
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.content.is_empty())
    }

    pub fn headings(&self) -> Option<&HeadingRowState> {
        self.headings.as_deref()
    }

    /// Value under a heading label
    pub fn keyed_value(&self, name: &str) -> Result<Value> {
        let position = self
            .headings
            .as_ref()
            .and_then(|h| h.position(name))
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;

        Ok(self
            .cells
            .get(position)
            .map(|cell| cell.read_value(false, false).to_json())
            .unwrap_or(Value::Null))
    }

    /// Cell values in column order, `null` standing in for empty cells
    pub fn to_ordered_list(&self, null: &Value, calculate: bool, formatted: bool) -> Vec<Value> {
        self.cells
            .iter()
            .map(|cell| {
                let value = cell.read_value(calculate, formatted);
                if value.is_empty() {
                    null.clone()
                } else {
                    value.to_json()
                }
            })
            .collect()
    }

    /// Values keyed by heading label, or by column position without headings
    pub fn to_keyed_map(&self, null: &Value, calculate: bool, formatted: bool) -> Map<String, Value> {
        let values = self.to_ordered_list(null, calculate, formatted);
        values
            .into_iter()
            .enumerate()
            .map(|(column, value)| {
                let key = match &self.headings {
                    Some(h) => h.key(column),
                    None => column.to_string(),
                };
                (key, value)
            })
            .collect()
    }

    /// Keyed object when headings are attached, plain array otherwise
    pub fn to_record(&self, null: &Value, calculate: bool, formatted: bool) -> Value {
        if self.headings.is_some() {
            Value::Object(self.to_keyed_map(null, calculate, formatted))
        } else {
            Value::Array(self.to_ordered_list(null, calculate, formatted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headings(labels: &[&str]) -> Option<Arc<HeadingRowState>> {
        Some(Arc::new(HeadingRowState::new(
            1,
            labels.iter().map(|s| s.to_string()).collect(),
        )))
    }

    #[test]
    fn test_keyed_map_with_placeholder() {
        let row = Row::new(2, vec![Cell::number(7.0), Cell::default()], headings(&["id", "name"]));
        let map = row.to_keyed_map(&json!("N/A"), false, false);
        assert_eq!(Value::Object(map), json!({"id": 7, "name": "N/A"}));
    }

    #[test]
    fn test_keyed_value() {
        let row = Row::new(3, vec![Cell::text("bob"), Cell::number(1.5)], headings(&["name", "score"]));
        assert_eq!(row.keyed_value("score").unwrap(), json!(1.5));
        assert!(matches!(row.keyed_value("age"), Err(Error::KeyNotFound(k)) if k == "age"));

        let bare = Row::new(3, vec![Cell::text("bob")], None);
        assert!(matches!(bare.keyed_value("name"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_positional_fallback() {
        let row = Row::new(2, vec![Cell::text("a"), Cell::text("b")], headings(&["first", ""]));
        let map = row.to_keyed_map(&Value::Null, false, false);
        assert_eq!(Value::Object(map), json!({"first": "a", "1": "b"}));

        let bare = Row::new(2, vec![Cell::text("a"), Cell::default()], None);
        assert_eq!(bare.to_record(&Value::Null, false, false), json!(["a", null]));
    }

    #[test]
    fn test_headings_wider_than_cells() {
        let row = Row::new(4, vec![Cell::number(1.0)], headings(&["a", "b", "c"]));
        assert_eq!(row.len(), 3);
        assert_eq!(
            row.to_record(&Value::Null, false, false),
            json!({"a": 1, "b": null, "c": null})
        );
    }

    #[test]
    fn test_formulas_and_formatting() {
        let mut percent = Cell::number(0.5);
        percent.format.number_format = Some("0%".into());
        let row = Row::new(
            2,
            vec![Cell::calculated("=1+1", sheetpump_core::CellValue::Number(2.0)), percent],
            None,
        );

        assert_eq!(row.to_ordered_list(&Value::Null, false, false), vec![json!("=1+1"), json!(0.5)]);
        assert_eq!(row.to_ordered_list(&Value::Null, true, true), vec![json!("2"), json!("50%")]);
    }
}
