use serde::{Deserialize, Serialize};

use crate::range::{CellCoord, CellRange};

/// Kind of chart placed on a sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
    Scatter,
}

/// A chart placement. Rendering is left to the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub name: String,
    #[serde(default)]
    pub kind: ChartKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub data_range: CellRange,
    pub top_left: CellCoord,
}

impl Chart {
    pub fn new(name: impl Into<String>, kind: ChartKind, data_range: CellRange, top_left: CellCoord) -> Self {
        Self {
            name: name.into(),
            kind,
            title: None,
            data_range,
            top_left,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// An image anchored at a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    pub name: String,
    pub path: String,
    pub coordinates: CellCoord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Drawing {
    pub fn new(name: impl Into<String>, path: impl Into<String>, coordinates: CellCoord) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            coordinates,
            height: None,
        }
    }
}
