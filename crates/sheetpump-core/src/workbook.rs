use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::sheet::Sheet;

/// Metadata about the workbook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

/// A workbook containing zero or more sheets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    /// List of sheets in the workbook
    #[serde(default)]
    pub sheets: Vec<Sheet>,
    /// Workbook metadata
    #[serde(default)]
    pub metadata: WorkbookMetadata,
}

impl Workbook {
    /// Create a workbook without sheets
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a sheet by index
    pub fn get_sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    /// Get a mutable sheet by index
    pub fn get_sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    /// Get a sheet by name
    pub fn get_sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Get the index of a sheet by name
    pub fn get_sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    /// Whether a sheet with this name exists
    pub fn sheet_name_exists(&self, name: &str) -> bool {
        self.get_sheet_index(name).is_some()
    }

    /// Sheet by index or a not-found error
    pub fn sheet_by_index(&self, index: usize) -> Result<&Sheet, GridError> {
        self.sheets.get(index).ok_or(GridError::SheetNotFoundByIndex {
            index,
            count: self.sheets.len(),
        })
    }

    /// Sheet by name or a not-found error
    pub fn sheet_by_name(&self, name: &str) -> Result<&Sheet, GridError> {
        self.get_sheet_by_name(name)
            .ok_or_else(|| GridError::SheetNotFoundByName(name.to_string()))
    }

    /// Remove a sheet from the workbook and hand over ownership of it
    pub fn take_sheet_by_name(&mut self, name: &str) -> Result<Sheet, GridError> {
        let index = self
            .get_sheet_index(name)
            .ok_or_else(|| GridError::SheetNotFoundByName(name.to_string()))?;
        Ok(self.sheets.remove(index))
    }

    /// Remove a sheet by index and hand over ownership of it
    pub fn take_sheet(&mut self, index: usize) -> Result<Sheet, GridError> {
        if index >= self.sheets.len() {
            return Err(GridError::SheetNotFoundByIndex {
                index,
                count: self.sheets.len(),
            });
        }
        Ok(self.sheets.remove(index))
    }

    /// Add a new sheet with the given name
    pub fn add_sheet(&mut self, name: impl Into<String>) -> Result<usize, GridError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(GridError::InvalidSheetName("Name cannot be empty".to_string()));
        }

        if self.sheet_name_exists(&name) {
            return Err(GridError::SheetNameExists(name));
        }

        let index = self.sheets.len();
        self.sheets.push(Sheet::new(name));
        Ok(index)
    }

    /// Add a new sheet with an auto-generated name (Worksheet, Worksheet 1, ...)
    pub fn create_sheet(&mut self) -> usize {
        let mut name = "Worksheet".to_string();
        let mut num = 1;
        while self.sheet_name_exists(&name) {
            name = format!("Worksheet {}", num);
            num += 1;
        }
        self.sheets.push(Sheet::new(name));
        self.sheets.len() - 1
    }

    /// Rename a sheet
    pub fn rename_sheet(&mut self, index: usize, new_name: impl Into<String>) -> Result<(), GridError> {
        let new_name = new_name.into();

        if new_name.trim().is_empty() {
            return Err(GridError::InvalidSheetName("Name cannot be empty".to_string()));
        }

        // Check if name is already used by another sheet
        for (i, sheet) in self.sheets.iter().enumerate() {
            if i != index && sheet.name == new_name {
                return Err(GridError::SheetNameExists(new_name));
            }
        }

        let count = self.sheets.len();
        let sheet = self
            .sheets
            .get_mut(index)
            .ok_or(GridError::SheetNotFoundByIndex { index, count })?;
        sheet.name = new_name;
        Ok(())
    }

    /// Get the number of sheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Serialize the workbook to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize the workbook to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a workbook from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_lookup_errors() {
        let mut wb = Workbook::new();
        wb.add_sheet("Data").unwrap();

        assert!(wb.sheet_by_name("Data").is_ok());
        let err = wb.sheet_by_name("Missing").unwrap_err();
        assert!(err.is_sheet_not_found());

        let err = wb.sheet_by_index(3).unwrap_err();
        assert!(matches!(err, GridError::SheetNotFoundByIndex { index: 3, count: 1 }));
    }

    #[test]
    fn test_create_sheet_names() {
        let mut wb = Workbook::new();
        let first = wb.create_sheet();
        let second = wb.create_sheet();
        assert_eq!(wb.sheets[first].name, "Worksheet");
        assert_eq!(wb.sheets[second].name, "Worksheet 1");
    }

    #[test]
    fn test_take_sheet() {
        let mut wb = Workbook::new();
        wb.add_sheet("A").unwrap();
        wb.add_sheet("B").unwrap();

        let sheet = wb.take_sheet_by_name("B").unwrap();
        assert_eq!(sheet.name, "B");
        assert_eq!(wb.sheet_names(), vec!["A"]);
        assert!(wb.take_sheet(5).is_err());
    }

    #[test]
    fn test_rename_sheet() {
        let mut wb = Workbook::new();
        wb.add_sheet("Sheet1").unwrap();
        wb.add_sheet("Sheet2").unwrap();

        assert!(wb.rename_sheet(0, "Main").is_ok());
        assert_eq!(wb.sheets[0].name, "Main");

        // Cannot rename to existing name
        assert!(wb.rename_sheet(1, "Main").is_err());
        assert!(wb.add_sheet(" ").is_err());
    }

    #[test]
    fn test_serialization() {
        let mut wb = Workbook::new();
        wb.add_sheet("Sheet1").unwrap();
        wb.add_sheet("Sheet2").unwrap();

        let json = wb.to_json().unwrap();
        let wb2 = Workbook::from_json(&json).unwrap();

        assert_eq!(wb2.sheet_count(), 2);
        assert_eq!(wb2.sheet_names(), vec!["Sheet1", "Sheet2"]);
    }
}
