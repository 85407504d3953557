use serde_json::{Map, Value};

use sheetpump_core::{CellCoord, GridError, Sheet};

use crate::concerns::{Concern, Concerns, Record};
use crate::error::{Error, Result};
use crate::persistence::Persistence;

/// Reads named cells into a single record instead of streaming rows
pub struct MappedReader<'a> {
    persistence: &'a dyn Persistence,
}

impl<'a> MappedReader<'a> {
    pub fn new(persistence: &'a dyn Persistence) -> Self {
        Self { persistence }
    }

    /// Extract the mapped record; `None` when the processor has no mapping
    pub fn extract(sheet: &Sheet, concerns: &Concerns<'_>) -> Result<Option<Record>> {
        let Some(mapped) = concerns.with_mapped_cells else {
            return Ok(None);
        };
        let calculate = concerns.has(Concern::WithCalculatedFormulas);

        let mut record = Map::new();
        for (name, coordinate) in mapped.mapping() {
            let coord = CellCoord::from_a1(&coordinate)
                .ok_or_else(|| Error::from(GridError::InvalidCoordinate(coordinate.clone())))?;
            let value = sheet
                .get_cell(coord)
                .map(|cell| cell.read_value(calculate, false))
                .filter(|value| !value.is_empty())
                .map(|value| value.to_json())
                .unwrap_or(Value::Null);
            record.insert(name, value);
        }

        Ok(Some(Value::Object(record)))
    }

    /// Deliver the mapped record to every sink the processor declares
    pub fn map(&self, sheet: &Sheet, concerns: &Concerns<'_>) -> Result<()> {
        let Some(record) = Self::extract(sheet, concerns)? else {
            return Ok(());
        };

        if let Some(sink) = concerns.to_model {
            if let Some(model) = sink.model(&record)? {
                self.persistence.save(model)?;
            }
        }
        if let Some(sink) = concerns.to_collection {
            sink.to_collection(vec![record.clone()])?;
        }
        if let Some(sink) = concerns.to_array {
            sink.to_array(vec![record])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concerns::{ProcessorResult, ToModel, WithMappedCells};
    use crate::persistence::MemoryStore;
    use serde_json::json;
    use sheetpump_core::{Cell, CellValue};

    struct Invoice;

    impl WithMappedCells for Invoice {
        fn mapping(&self) -> Vec<(String, String)> {
            vec![
                ("number".into(), "B1".into()),
                ("total".into(), "$B$3".into()),
                ("note".into(), "D9".into()),
            ]
        }
    }

    impl ToModel for Invoice {
        fn model(&self, row: &Record) -> ProcessorResult<Option<Record>> {
            Ok(Some(row.clone()))
        }
    }

    fn sheet() -> Sheet {
        let mut sheet = Sheet::new("Invoice");
        sheet.set_cell(CellCoord::new(0, 1), Cell::text("INV-7"));
        sheet.set_cell(CellCoord::new(2, 1), Cell::calculated("=SUM(B2:B2)", CellValue::Number(12.0)));
        sheet
    }

    #[test]
    fn test_extract_with_and_without_calculation() {
        let invoice = Invoice;
        let concerns = Concerns::new().with_mapped_cells(&invoice);
        let raw = MappedReader::extract(&sheet(), &concerns).unwrap().unwrap();
        assert_eq!(raw, json!({"number": "INV-7", "total": "=SUM(B2:B2)", "note": null}));

        let concerns = concerns.mark(Concern::WithCalculatedFormulas);
        let calculated = MappedReader::extract(&sheet(), &concerns).unwrap().unwrap();
        assert_eq!(calculated["total"], json!(12));
    }

    #[test]
    fn test_map_persists_model() {
        let invoice = Invoice;
        let store = MemoryStore::new();
        let concerns = Concerns::new().with_mapped_cells(&invoice).to_model(&invoice);

        MappedReader::new(&store).map(&sheet(), &concerns).unwrap();
        assert_eq!(store.records().unwrap()[0]["number"], json!("INV-7"));
    }

    struct Rejecting;

    impl ToModel for Rejecting {
        fn model(&self, _row: &Record) -> ProcessorResult<Option<Record>> {
            anyhow::bail!("invoice rejected")
        }
    }

    #[test]
    fn test_model_error_is_not_tied_to_a_row() {
        let store = MemoryStore::new();
        let concerns = Concerns::new().with_mapped_cells(&Invoice).to_model(&Rejecting);

        let err = MappedReader::new(&store).map(&sheet(), &concerns).unwrap_err();
        assert!(matches!(err, Error::Processor(_)));
        assert_eq!(store.len().unwrap(), 0);
    }
}
