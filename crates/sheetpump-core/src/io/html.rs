use regex::Regex;
use serde_json::Value;

use crate::binder::{DefaultValueBinder, ValueBinder};
use crate::cell::Cell;
use crate::error::GridError;
use crate::range::CellCoord;
use crate::sheet::Sheet;

/// Loads rendered markup into an existing sheet
pub trait ViewLoader: Send + Sync {
    fn load_into(&self, html: &str, sheet: &mut Sheet) -> Result<(), GridError>;
}

/// Minimal `<table>` reader: one row per `<tr>`, one cell per `<td>`/`<th>`.
///
/// Header cells are written bold. Rows land below whatever the sheet
/// already holds.
#[derive(Debug, Clone)]
pub struct HtmlTableLoader {
    row: Regex,
    cell: Regex,
    tag: Regex,
}

impl HtmlTableLoader {
    pub fn new() -> Result<Self, GridError> {
        Ok(Self {
            row: Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>")?,
            cell: Regex::new(r"(?is)<(td|th)\b[^>]*>(.*?)</(?:td|th)\s*>")?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    fn text(&self, inner: &str) -> String {
        let stripped = self.tag.replace_all(inner, "");
        decode_entities(stripped.trim())
    }
}

impl ViewLoader for HtmlTableLoader {
    fn load_into(&self, html: &str, sheet: &mut Sheet) -> Result<(), GridError> {
        let mut row = sheet.highest_row();

        for tr in self.row.captures_iter(html) {
            let body = tr.get(1).map_or("", |m| m.as_str());
            for (col, td) in self.cell.captures_iter(body).enumerate() {
                let is_header = td
                    .get(1)
                    .is_some_and(|m| m.as_str().eq_ignore_ascii_case("th"));
                let text = self.text(td.get(2).map_or("", |m| m.as_str()));
                if text.is_empty() {
                    continue;
                }

                let mut cell = Cell::new(DefaultValueBinder.bind_value(&Value::String(text)));
                cell.format.bold = is_header;
                sheet.set_cell(CellCoord::new(row, col as u32), cell);
            }
            row += 1;
        }

        Ok(())
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
