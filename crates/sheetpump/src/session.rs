//! Sheet orchestration.
//!
//! A [`SheetSession`] exclusively owns one [`Sheet`] for the length of an
//! export or import. Export runs `open → populate → close`; import streams
//! rows from a fixed window through every sink the processor declares in a
//! single pass. Dropping the session releases the sheet on every exit path,
//! [`SheetSession::disconnect`] does it eagerly.

use serde_json::{Map, Value};
use std::sync::Arc;

use sheetpump_core::{column_range, CellContent, CellCoord, DefaultValueBinder, GridError, Sheet, ValueBinder};

use crate::concerns::{
    Concern, Concerns, FromIterator, FromQuery, FromView, Processor, Record,
};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::heading::{HeadingResolver, RowBounds};
use crate::mapped::MappedReader;
use crate::persistence::ModelImporter;
use crate::row::Row;

pub struct SheetSession<'c> {
    sheet: Sheet,
    context: &'c Context,
    binder: Arc<dyn ValueBinder>,
}

impl<'c> SheetSession<'c> {
    pub fn new(sheet: Sheet, context: &'c Context) -> Self {
        Self {
            sheet,
            context,
            binder: Arc::new(DefaultValueBinder),
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn sheet_mut(&mut self) -> &mut Sheet {
        &mut self.sheet
    }

    pub fn into_sheet(self) -> Sheet {
        self.sheet
    }

    /// Release the sheet's cells
    pub fn disconnect(mut self) {
        tracing::trace!(sheet = %self.sheet.name, "disconnecting sheet");
        self.sheet.disconnect_cells();
    }

    /// Open, populate and close the sheet for an export processor
    pub fn export(&mut self, processor: &dyn Processor) -> Result<()> {
        let concerns = processor.concerns();
        concerns.validate_export()?;
        let events = self.context.events.for_processor(&concerns);

        self.open(&concerns, &events)?;
        self.populate(&concerns)?;
        self.close(&concerns, &events)
    }

    pub fn open(&mut self, concerns: &Concerns<'_>, events: &EventBus) -> Result<()> {
        concerns.validate_export()?;

        if let Some(custom) = concerns.with_custom_value_binder {
            self.binder = custom.value_binder();
        }

        events.raise(&mut Event::BeforeSheet {
            sheet: &mut self.sheet,
            concerns: concerns.set(),
        })?;

        if let Some(titled) = concerns.with_title {
            self.sheet.name = titled.title();
        }

        if !concerns.has(Concern::FromView) {
            if let Some(headed) = concerns.with_headings {
                let rows = expand_rows(headed.headings());
                let start_cell = start_cell(concerns);
                self.append(rows, start_cell.as_deref(), self.strict_nulls(concerns))?;
            }
        }

        if let Some(charted) = concerns.with_charts {
            for chart in charted.charts() {
                self.sheet.add_chart(chart);
            }
        }

        if let Some(drawn) = concerns.with_drawings {
            for drawing in drawn.drawings() {
                self.sheet.add_drawing(drawing);
            }
        }

        tracing::debug!(sheet = %self.sheet.name, concerns = ?concerns.set(), "opened sheet");
        Ok(())
    }

    /// Fill the sheet from the first declared source
    pub fn populate(&mut self, concerns: &Concerns<'_>) -> Result<()> {
        let Some(source) = concerns.populate_source() else {
            tracing::debug!(sheet = %self.sheet.name, "no source declared, nothing to populate");
            return Ok(());
        };

        match source {
            Concern::FromView => {
                if let Some(view) = concerns.from_view {
                    self.from_view(view)?;
                }
            }
            Concern::FromQuery => {
                if let Some(query) = concerns.from_query {
                    self.from_query(query, concerns)?;
                }
            }
            Concern::FromCollection => {
                if let Some(collection) = concerns.from_collection {
                    self.append_rows(collection.collection()?, concerns)?;
                }
            }
            Concern::FromArray => {
                if let Some(array) = concerns.from_array {
                    self.append_rows(array.array()?, concerns)?;
                }
            }
            Concern::FromIterator => {
                if let Some(iterator) = concerns.from_iterator {
                    self.from_iterator(iterator, concerns)?;
                }
            }
            _ => {}
        }

        tracing::debug!(sheet = %self.sheet.name, source = %source, rows = self.sheet.highest_row(), "populated sheet");
        Ok(())
    }

    pub fn close(&mut self, concerns: &Concerns<'_>, events: &EventBus) -> Result<()> {
        if let Some(formatted) = concerns.with_column_formatting {
            for (column, code) in formatted.column_formats() {
                self.sheet.format_column(&column, &code);
            }
        }

        if concerns.has(Concern::ShouldAutoSize) {
            for column in column_range("A", &self.sheet.highest_data_column()) {
                self.sheet.set_auto_size(&column);
            }
        }

        events.raise(&mut Event::AfterSheet {
            sheet: &mut self.sheet,
            concerns: concerns.set(),
        })
    }

    fn from_view(&mut self, view: &dyn FromView) -> Result<()> {
        let html = view.view()?;
        self.context.view_loader.load_into(&html, &mut self.sheet)?;
        Ok(())
    }

    fn from_query(&mut self, query: &dyn FromQuery, concerns: &Concerns<'_>) -> Result<()> {
        let page_size = self.page_size(concerns);
        let mut offset = 0;

        loop {
            let page = query.query(offset, page_size)?;
            let len = page.len();
            if len == 0 {
                break;
            }
            tracing::trace!(offset, len, "appending query page");
            self.append_rows(page, concerns)?;
            if len < page_size {
                break;
            }
            offset += len;
        }
        Ok(())
    }

    fn from_iterator(&mut self, iterator: &dyn FromIterator, concerns: &Concerns<'_>) -> Result<()> {
        let page_size = self.page_size(concerns);
        let mut records = iterator.iterator()?;

        loop {
            let batch: Vec<Record> = records.by_ref().take(page_size).collect();
            if batch.is_empty() {
                break;
            }
            self.append_rows(batch, concerns)?;
        }
        Ok(())
    }

    fn page_size(&self, concerns: &Concerns<'_>) -> usize {
        concerns
            .with_custom_chunk_size
            .map(|c| c.page_size())
            .unwrap_or(self.context.config.exports.chunk_size)
            .max(1)
    }

    fn strict_nulls(&self, concerns: &Concerns<'_>) -> bool {
        concerns.has(Concern::WithStrictNullComparison) || self.context.config.exports.strict_null_comparison
    }

    /// Map source records and append them below the existing rows
    pub fn append_rows(&mut self, records: Vec<Record>, concerns: &Concerns<'_>) -> Result<()> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let record = match concerns.with_mapping {
                Some(mapping) => mapping.map(record)?,
                None => record,
            };
            rows.extend(expand_rows(record));
        }

        let start_cell = start_cell(concerns);
        self.append(rows, start_cell.as_deref(), self.strict_nulls(concerns))
    }

    /// Write rows at `start_cell` (default A1), or below the sheet's highest
    /// row when that cell is already filled
    pub fn append(&mut self, rows: Vec<Vec<Value>>, start_cell: Option<&str>, strict: bool) -> Result<()> {
        let start_cell = start_cell.unwrap_or("A1");
        let mut start = CellCoord::from_a1(start_cell)
            .ok_or_else(|| GridError::InvalidCoordinate(start_cell.to_string()))?;

        if self.sheet.cell_exists(start_cell) {
            start = CellCoord::new(self.sheet.highest_row(), start.col);
        }

        let contents: Vec<Vec<CellContent>> = rows
            .iter()
            .map(|row| row.iter().map(|value| self.binder.bind_value(value)).collect())
            .collect();

        self.sheet.from_array(contents, start, strict);
        Ok(())
    }

    /// Import rows from `start_row` to the resolved end row
    pub fn import(&mut self, processor: &dyn Processor, start_row: u32) -> Result<usize> {
        let concerns = processor.concerns();
        let end_row = HeadingResolver::end_row(&concerns, start_row, self.sheet.highest_row());
        self.import_rows(processor, RowBounds { start_row, end_row })
    }

    /// Import exactly the rows in `bounds`
    pub fn import_rows(&mut self, processor: &dyn Processor, bounds: RowBounds) -> Result<usize> {
        let concerns = processor.concerns();
        let events = self.context.events.for_processor(&concerns);

        events.raise(&mut Event::BeforeSheet {
            sheet: &mut self.sheet,
            concerns: concerns.set(),
        })?;

        let whole_sheet = !concerns.has(Concern::WithChunkReading);
        if let Some(progress) = concerns.with_progress_bar.filter(|_| whole_sheet) {
            progress.progress_start(self.sheet.highest_row());
        }

        let rows = if concerns.has(Concern::WithMappedCells) {
            MappedReader::new(self.context.persistence.as_ref()).map(&self.sheet, &concerns)?;
            0
        } else {
            self.stream_rows(&concerns, bounds)?
        };

        events.raise(&mut Event::AfterSheet {
            sheet: &mut self.sheet,
            concerns: concerns.set(),
        })?;

        if let Some(progress) = concerns.with_progress_bar.filter(|_| whole_sheet) {
            progress.progress_finish();
        }

        tracing::debug!(
            sheet = %self.sheet.name,
            start_row = bounds.start_row,
            end_row = bounds.end_row,
            rows,
            "imported rows"
        );
        Ok(rows)
    }

    fn stream_rows(&self, concerns: &Concerns<'_>, bounds: RowBounds) -> Result<usize> {
        let heading = Arc::new(
            self.context
                .heading_resolver()
                .headings(&self.sheet, HeadingResolver::heading_row(concerns)),
        );
        let calculate = concerns.has(Concern::WithCalculatedFormulas);
        let formatted = concerns.has(Concern::WithFormatData);
        let end_row = bounds.end_row.min(self.sheet.highest_row());
        let needs_record = concerns
            .set()
            .contains_any(&[Concern::ToModel, Concern::ToArray, Concern::ToCollection]);

        let mut models = concerns.to_model.map(|sink| {
            let batch_size = concerns.with_batch_inserts.map_or(1, |b| b.batch_size());
            ModelImporter::new(sink, self.context.persistence.as_ref(), batch_size)
        });
        let mut arrays = Vec::new();
        let mut collection = Vec::new();
        let mut count = 0;

        for (row_number, cells) in self.sheet.rows(bounds.start_row, end_row) {
            let row = Row::new(row_number, cells, Some(heading.clone()));

            if let Some(callback) = concerns.on_each_row {
                callback.on_row(&row).map_err(|e| Error::row(row_number, e))?;
            }

            if needs_record {
                let mut record = row.to_record(&Value::Null, calculate, formatted);
                if let Some(mapping) = concerns.with_mapping {
                    record = mapping.map(record).map_err(|e| Error::row(row_number, e))?;
                }
                if let Some(models) = models.as_mut() {
                    models.push(row_number, &record)?;
                }
                if concerns.to_collection.is_some() {
                    collection.push(keyed(record.clone()));
                }
                if concerns.to_array.is_some() {
                    arrays.push(record);
                }
            }

            if let Some(progress) = concerns.with_progress_bar {
                progress.progress_advance(1);
            }
            count += 1;
        }

        if let Some(models) = models.as_mut() {
            models.flush()?;
        }
        if let Some(sink) = concerns.to_collection {
            sink.to_collection(collection)?;
        }
        if let Some(sink) = concerns.to_array {
            sink.to_array(arrays)?;
        }

        Ok(count)
    }
}

fn start_cell(concerns: &Concerns<'_>) -> Option<String> {
    concerns.with_custom_start_cell.map(|c| c.start_cell())
}

/// Turn one source record into one or more sheet rows.
///
/// Objects flatten to their values in field order, arrays stay as they are,
/// scalars become a single cell. An array holding arrays is several rows.
pub fn expand_rows(record: Record) -> Vec<Vec<Value>> {
    match record {
        Value::Array(items) if items.iter().any(Value::is_array) => {
            items.into_iter().map(flatten_row).collect()
        }
        other => vec![flatten_row(other)],
    }
}

fn flatten_row(record: Record) -> Vec<Value> {
    match record {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, value)| value).collect(),
        scalar => vec![scalar],
    }
}

fn keyed(record: Record) -> Record {
    match record {
        Value::Array(items) => Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, value)| (i.to_string(), value))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concerns::{
        FromCollection, OnEachRow, ProcessorResult, ToArray, ToCollection, WithColumnFormatting,
        WithCustomStartCell, WithHeadingRow, WithHeadings, WithMapping, WithProgressBar, WithTitle,
    };
    use crate::config::Config;
    use crate::events::EventKind;
    use serde_json::json;
    use sheetpump_core::{Cell, CellValue};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn context() -> Context {
        Context::new(Config::default()).unwrap()
    }

    fn values(sheet: &Sheet) -> Vec<Vec<Value>> {
        sheet
            .rows(1, sheet.highest_row())
            .map(|(_, cells)| cells.iter().map(|c| c.read_value(false, false).to_json()).collect())
            .collect()
    }

    struct Users;

    impl WithHeadings for Users {
        fn headings(&self) -> Record {
            json!(["id", "name"])
        }
    }

    impl FromCollection for Users {
        fn collection(&self) -> ProcessorResult<Vec<Record>> {
            Ok(vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})])
        }
    }

    impl WithTitle for Users {
        fn title(&self) -> String {
            "Users".into()
        }
    }

    impl WithColumnFormatting for Users {
        fn column_formats(&self) -> Vec<(String, String)> {
            vec![("A".into(), "0.00".into())]
        }
    }

    impl Processor for Users {
        fn concerns(&self) -> Concerns<'_> {
            Concerns::new()
                .with_headings(self)
                .from_collection(self)
                .with_title(self)
                .with_column_formatting(self)
                .mark(Concern::ShouldAutoSize)
        }
    }

    #[test]
    fn test_export_headings_and_collection() {
        let ctx = context();
        let mut session = SheetSession::new(Sheet::new("Worksheet"), &ctx);
        session.export(&Users).unwrap();
        let sheet = session.into_sheet();

        assert_eq!(sheet.name, "Users");
        assert_eq!(
            values(&sheet),
            vec![
                vec![json!("id"), json!("name")],
                vec![json!(1), json!("a")],
                vec![json!(2), json!("b")],
            ]
        );
        assert_eq!(sheet.get_cell_a1("A2").unwrap().format.number_format.as_deref(), Some("0.00"));
        assert!(sheet.auto_size_columns.contains("A") && sheet.auto_size_columns.contains("B"));
    }

    struct Offset;

    impl WithCustomStartCell for Offset {
        fn start_cell(&self) -> String {
            "B3".into()
        }
    }

    impl WithMapping for Offset {
        fn map(&self, record: Record) -> ProcessorResult<Record> {
            let n = record.as_i64().unwrap_or_default();
            Ok(json!([[n, n * 10], [0, false]]))
        }
    }

    #[test]
    fn test_append_start_cell_mapping_and_nulls() {
        let ctx = context();
        let offset = Offset;
        let concerns = Concerns::new().with_custom_start_cell(&offset).with_mapping(&offset);

        let mut session = SheetSession::new(Sheet::new("S"), &ctx);
        session.append_rows(vec![json!(1)], &concerns).unwrap();
        assert_eq!(session.sheet().get_cell_value(CellCoord::from_a1("B3").unwrap()), &CellValue::Number(1.0));
        assert_eq!(session.sheet().get_cell_value(CellCoord::from_a1("C3").unwrap()), &CellValue::Number(10.0));
        assert!(!session.sheet().cell_exists("B4"));
        assert!(!session.sheet().cell_exists("C4"));

        session.append_rows(vec![json!(2)], &concerns).unwrap();
        let sheet = session.into_sheet();
        assert_eq!(sheet.get_cell_value(CellCoord::from_a1("B4").unwrap()), &CellValue::Number(2.0));
        assert_eq!(sheet.get_cell_value(CellCoord::from_a1("C4").unwrap()), &CellValue::Number(20.0));
        assert_eq!(sheet.highest_row(), 4);

        let strict = concerns.mark(Concern::WithStrictNullComparison);
        let mut session = SheetSession::new(Sheet::new("S"), &ctx);
        session.append_rows(vec![json!(1)], &strict).unwrap();
        let sheet = session.into_sheet();
        assert_eq!(sheet.get_cell_value(CellCoord::from_a1("B4").unwrap()), &CellValue::Number(0.0));
        assert_eq!(sheet.get_cell_value(CellCoord::from_a1("C4").unwrap()), &CellValue::Boolean(false));
    }

    #[test]
    fn test_expand_rows() {
        assert_eq!(expand_rows(json!({"b": 2, "a": 1})), vec![vec![json!(2), json!(1)]]);
        assert_eq!(expand_rows(json!("x")), vec![vec![json!("x")]]);
        assert_eq!(expand_rows(json!([[1], [2, 3]])), vec![vec![json!(1)], vec![json!(2), json!(3)]]);
    }

    #[derive(Default)]
    struct Reader {
        heading: bool,
        seen: Mutex<Vec<u32>>,
        arrays: Mutex<Vec<Record>>,
        collection: Mutex<Vec<Record>>,
        progress: AtomicU32,
        fail_on: Option<u32>,
    }

    impl WithHeadingRow for Reader {}

    impl OnEachRow for Reader {
        fn on_row(&self, row: &Row) -> ProcessorResult<()> {
            if self.fail_on == Some(row.index()) {
                anyhow::bail!("row {} rejected", row.index());
            }
            self.seen.lock().unwrap().push(row.index());
            Ok(())
        }
    }

    impl ToArray for Reader {
        fn to_array(&self, rows: Vec<Record>) -> ProcessorResult<()> {
            self.arrays.lock().unwrap().extend(rows);
            Ok(())
        }
    }

    impl ToCollection for Reader {
        fn to_collection(&self, rows: Vec<Record>) -> ProcessorResult<()> {
            self.collection.lock().unwrap().extend(rows);
            Ok(())
        }
    }

    impl WithProgressBar for Reader {
        fn progress_advance(&self, step: u32) {
            self.progress.fetch_add(step, Ordering::SeqCst);
        }
    }

    impl Processor for Reader {
        fn concerns(&self) -> Concerns<'_> {
            let concerns = Concerns::new()
                .on_each_row(self)
                .to_array(self)
                .to_collection(self)
                .with_progress_bar(self);
            if self.heading {
                concerns.with_heading_row(self)
            } else {
                concerns
            }
        }
    }

    fn data_sheet() -> Sheet {
        let mut sheet = Sheet::new("Data");
        sheet.set_cell(CellCoord::new(0, 0), Cell::text("ID"));
        sheet.set_cell(CellCoord::new(0, 1), Cell::text("Full Name"));
        for (i, name) in ["ann", "bob", "cy"].iter().enumerate() {
            sheet.set_cell(CellCoord::new(i as u32 + 1, 0), Cell::number(i as f64 + 1.0));
            sheet.set_cell(CellCoord::new(i as u32 + 1, 1), Cell::text(*name));
        }
        sheet
    }

    #[test]
    fn test_import_single_pass_with_heading() {
        let ctx = context();
        let reader = Reader {
            heading: true,
            ..Reader::default()
        };

        let mut session = SheetSession::new(data_sheet(), &ctx);
        let rows = session.import(&reader, 2).unwrap();

        assert_eq!(rows, 3);
        assert_eq!(*reader.seen.lock().unwrap(), vec![2, 3, 4]);
        assert_eq!(reader.progress.load(Ordering::SeqCst), 3);
        assert_eq!(reader.arrays.lock().unwrap()[1], json!({"id": 2, "full_name": "bob"}));
        assert_eq!(reader.collection.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_import_without_heading_uses_positions() {
        let ctx = context();
        let reader = Reader::default();

        let mut session = SheetSession::new(data_sheet(), &ctx);
        session.import(&reader, 1).unwrap();

        assert_eq!(reader.arrays.lock().unwrap()[0], json!(["ID", "Full Name"]));
        assert_eq!(reader.collection.lock().unwrap()[3], json!({"0": 3, "1": "cy"}));
    }

    #[test]
    fn test_row_failure_aborts() {
        let ctx = context();
        let reader = Reader {
            heading: true,
            fail_on: Some(3),
            ..Reader::default()
        };

        let mut session = SheetSession::new(data_sheet(), &ctx);
        let err = session.import(&reader, 2).unwrap_err();

        assert!(matches!(err, Error::RowConversion { row: 3, .. }));
        assert_eq!(*reader.seen.lock().unwrap(), vec![2]);
        assert!(reader.arrays.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sheet_events_fire_around_import() {
        let mut ctx = context();
        let order = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::BeforeSheet, EventKind::AfterSheet] {
            let order = order.clone();
            ctx.events.listen(kind, move |event| {
                order.lock().unwrap().push(event.kind());
                Ok(())
            });
        }

        let reader = Reader::default();
        let mut session = SheetSession::new(data_sheet(), &ctx);
        session.import(&reader, 1).unwrap();

        assert_eq!(*order.lock().unwrap(), vec![EventKind::BeforeSheet, EventKind::AfterSheet]);
    }
}
