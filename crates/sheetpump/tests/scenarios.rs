use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use sheetpump::concerns::{
    FromCollection, FromIterator, FromQuery, FromView, HandlesFailures, OnEachRow, ToModel, WithChunkReading,
    WithCustomChunkSize, WithHeadingRow, WithHeadings,
};
use sheetpump::{
    run_with_retries, Concerns, Config, Engine, Error, EventKind, HeadingResolver, HeadingRowState, Job,
    MemoryStore, Processor, ProcessorResult, Queue, Record, Row, TransactionHandlerKind,
};
use sheetpump_core::{Cell, CellCoord, Sheet};

fn config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.temporary_files.local_path = Some(dir.path().join("tmp"));
    config
}

fn source(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("source.csv");
    fs::write(&path, body).unwrap();
    path
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

impl Processor for Users {
    fn concerns(&self) -> Concerns<'_> {
        Concerns::new().with_headings(self).from_collection(self)
    }
}

#[test]
fn export_headings_and_collection_from_a1() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(config(&dir)).unwrap();

    let workbook = engine.export(&Users).unwrap();
    let sheet = &workbook.sheets[0];
    let rows: Vec<Vec<_>> = sheet
        .rows(1, sheet.highest_row())
        .map(|(_, cells)| cells.iter().map(|c| c.read_value(false, false).to_json()).collect())
        .collect();
    assert_eq!(
        rows,
        vec![vec![json!("id"), json!("name")], vec![json!(1), json!("a")], vec![json!(2), json!("b")]]
    );

    let out = dir.path().join("users.csv");
    engine.write(&Users, &out, None).unwrap();
    assert_eq!(fs::read_to_string(out).unwrap(), "id,name\n1,a\n2,b\n");
}

struct Paged {
    calls: Mutex<Vec<usize>>,
}

impl FromQuery for Paged {
    fn query(&self, offset: usize, limit: usize) -> ProcessorResult<Vec<Record>> {
        self.calls.lock().unwrap().push(offset);
        Ok((offset..(offset + limit).min(5)).map(|n| json!([n + 1])).collect())
    }
}

impl WithCustomChunkSize for Paged {
    fn page_size(&self) -> usize {
        2
    }
}

impl Processor for Paged {
    fn concerns(&self) -> Concerns<'_> {
        Concerns::new().from_query(self).with_custom_chunk_size(self)
    }
}

struct Counting(usize);

impl WithHeadings for Counting {
    fn headings(&self) -> Record {
        json!(["n"])
    }
}

impl FromIterator for Counting {
    fn iterator(&self) -> ProcessorResult<Box<dyn Iterator<Item = Record> + '_>> {
        Ok(Box::new((1..=self.0).map(|n| json!([n]))))
    }
}

impl Processor for Counting {
    fn concerns(&self) -> Concerns<'_> {
        Concerns::new().with_headings(self).from_iterator(self)
    }
}

#[test]
fn export_row_count_matches_source() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(config(&dir)).unwrap();

    let paged = Paged {
        calls: Mutex::new(Vec::new()),
    };
    let workbook = engine.export(&paged).unwrap();
    assert_eq!(workbook.sheets[0].highest_row(), 5);
    assert_eq!(*paged.calls.lock().unwrap(), vec![0, 2, 4]);

    for count in [0, 1, 7, 250] {
        let workbook = engine.export(&Counting(count)).unwrap();
        assert_eq!(workbook.sheets[0].highest_row() as usize, count + 1);
    }
}

struct ViewAndCollection;

impl FromView for ViewAndCollection {
    fn view(&self) -> ProcessorResult<String> {
        Ok("<table><tr><td>x</td></tr></table>".to_string())
    }
}

impl FromCollection for ViewAndCollection {
    fn collection(&self) -> ProcessorResult<Vec<Record>> {
        Ok(vec![json!(["y"])])
    }
}

impl Processor for ViewAndCollection {
    fn concerns(&self) -> Concerns<'_> {
        Concerns::new().from_view(self).from_collection(self)
    }
}

#[test]
fn view_with_collection_conflicts_before_any_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::new(config(&dir)).unwrap();
    let raised = Arc::new(AtomicUsize::new(0));
    for kind in [EventKind::BeforeExport, EventKind::BeforeSheet] {
        let raised = raised.clone();
        engine.listen(kind, move |_| {
            raised.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let err = engine.export(&ViewAndCollection).unwrap_err();
    assert!(matches!(err, Error::ConfigurationConflict(_)));
    assert_eq!(raised.load(Ordering::SeqCst), 0);
}

#[derive(Default)]
struct ChunkedNames {
    rows: Mutex<Vec<(u32, Vec<String>)>>,
}

impl WithHeadingRow for ChunkedNames {}

impl WithChunkReading for ChunkedNames {
    fn chunk_size(&self) -> usize {
        2
    }
}

impl OnEachRow for ChunkedNames {
    fn on_row(&self, row: &Row) -> ProcessorResult<()> {
        let labels = row.headings().map(|h| h.labels.clone()).unwrap_or_default();
        self.rows.lock().unwrap().push((row.index(), labels));
        Ok(())
    }
}

impl Processor for ChunkedNames {
    fn concerns(&self) -> Concerns<'_> {
        Concerns::new()
            .with_heading_row(self)
            .with_chunk_reading(self)
            .on_each_row(self)
    }
}

#[test]
fn chunked_import_resolves_headings_per_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(&dir, "Id,Full Name\n1,a\n2,b\n3,c\n4,d\n5,e\n");
    let mut engine = Engine::new(config(&dir)).unwrap();
    let sheets = Arc::new(AtomicUsize::new(0));
    let counter = sheets.clone();
    engine.listen(EventKind::BeforeSheet, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let names = Arc::new(ChunkedNames::default());
    let planned = engine.queue_import(names.clone(), &path, None).unwrap();
    let windows: Vec<_> = planned
        .jobs
        .iter()
        .map(|job| (job.chunk().start_row, job.chunk().end_row()))
        .collect();
    assert_eq!(windows, vec![(2, 3), (4, 5), (6, 6)]);
    engine.finish_import(names.as_ref(), &planned.file).unwrap();

    engine.import(names.clone(), &path, None).unwrap();

    let rows = names.rows.lock().unwrap();
    assert_eq!(rows.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
    for (_, labels) in rows.iter() {
        assert_eq!(labels, &vec!["id".to_string(), "full_name".to_string()]);
    }
    assert_eq!(sheets.load(Ordering::SeqCst), 3);
    assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

/// Holds jobs until the test runs them
#[derive(Default)]
struct Deferred {
    jobs: Mutex<Vec<Box<dyn Job>>>,
}

impl Queue for Deferred {
    fn dispatch(&self, job: Box<dyn Job>) -> sheetpump::Result<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

#[test]
fn deferred_chunks_keep_the_working_copy_until_the_last_one_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(&dir, "Id,Full Name\n1,a\n2,b\n3,c\n4,d\n5,e\n");
    let mut config = config(&dir);
    config.filesystem.disks.insert("shared".into(), dir.path().join("shared"));
    config.temporary_files.remote_disk = Some("shared".into());

    let queue = Arc::new(Deferred::default());
    let mut engine = Engine::new(config).unwrap().with_queue(queue.clone());
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    engine.listen(EventKind::AfterImport, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let names = Arc::new(ChunkedNames::default());
    engine.import(names.clone(), &path, None).unwrap();

    let mut jobs = std::mem::take(&mut *queue.jobs.lock().unwrap());
    assert_eq!(jobs.len(), 3);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_dir(dir.path().join("shared")).unwrap().count(), 1);

    while let Some(job) = jobs.pop() {
        run_with_retries(job.as_ref()).unwrap();
        drop(job);
        if !jobs.is_empty() {
            assert_eq!(finished.load(Ordering::SeqCst), 0);
        }
    }

    let mut rows: Vec<u32> = names.rows.lock().unwrap().iter().map(|(index, _)| *index).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec![2, 3, 4, 5, 6]);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    assert_eq!(fs::read_dir(dir.path().join("shared")).unwrap().count(), 0);
}

#[test]
fn keyed_row_with_null_placeholder() {
    let headings = Arc::new(HeadingRowState::new(1, vec!["id".into(), "name".into()]));
    let row = Row::new(2, vec![Cell::number(7.0), Cell::default()], Some(headings));

    let map = row.to_keyed_map(&json!("N/A"), false, false);
    assert_eq!(serde_json::Value::Object(map), json!({"id": 7, "name": "N/A"}));
}

#[test]
fn heading_resolution_is_idempotent() {
    let mut sheet = Sheet::new("Data");
    sheet.set_cell(CellCoord::new(0, 0), Cell::text("First Name"));
    sheet.set_cell(CellCoord::new(1, 0), Cell::text("ann"));
    sheet.set_cell(CellCoord::new(2, 0), Cell::text("bob"));

    let names = ChunkedNames::default();
    let concerns = names.concerns();
    let resolver = HeadingResolver::default();

    let first = resolver.resolve(&sheet, &concerns);
    let second = resolver.resolve(&sheet, &concerns);
    assert_eq!(first, second);
    assert_eq!(first.heading.labels, vec!["first_name".to_string()]);
    assert_eq!((first.bounds.start_row, first.bounds.end_row), (2, 3));
}

#[derive(Default)]
struct Models {
    chunked: bool,
    failures: AtomicUsize,
}

impl WithHeadingRow for Models {}

impl WithChunkReading for Models {
    fn chunk_size(&self) -> usize {
        2
    }
}

impl ToModel for Models {
    fn model(&self, row: &Record) -> ProcessorResult<Option<Record>> {
        if row["name"] == "fail" {
            anyhow::bail!("cannot persist {}", row["name"]);
        }
        Ok(Some(row.clone()))
    }
}

impl HandlesFailures for Models {
    fn failed(&self, _error: &Error) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

impl Processor for Models {
    fn concerns(&self) -> Concerns<'_> {
        let concerns = Concerns::new()
            .with_heading_row(self)
            .to_model(self)
            .handles_failures(self);
        if self.chunked {
            concerns.with_chunk_reading(self)
        } else {
            concerns
        }
    }
}

fn store_engine(dir: &tempfile::TempDir, store: Arc<MemoryStore>) -> Engine {
    let mut config = config(dir);
    config.transactions.handler = TransactionHandlerKind::Store;
    Engine::with_store(config, store).unwrap()
}

#[test]
fn inline_import_rolls_back_on_row_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(&dir, "name\na\nb\nfail\n");
    let store = Arc::new(MemoryStore::new());
    let engine = store_engine(&dir, store.clone());

    let models = Arc::new(Models::default());
    let err = engine.import(models.clone(), &path, None).unwrap_err();

    assert!(matches!(err, Error::RowConversion { row: 4, .. }));
    assert_eq!(store.len().unwrap(), 0);
    assert!(!store.in_transaction().unwrap());
    assert_eq!(models.failures.load(Ordering::SeqCst), 1);

    let clean = source(&dir, "name\na\nb\n");
    engine.import(models, &clean, None).unwrap();
    assert_eq!(store.records().unwrap(), vec![json!({"name": "a"}), json!({"name": "b"})]);
}

#[test]
fn failing_chunk_keeps_earlier_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = source(&dir, "name\na\nb\nc\nfail\nz\n");
    let store = Arc::new(MemoryStore::new());
    let engine = store_engine(&dir, store.clone());

    let models = Arc::new(Models {
        chunked: true,
        ..Models::default()
    });
    let err = engine.import(models.clone(), &path, None).unwrap_err();

    assert!(matches!(err, Error::RowConversion { row: 5, .. }));
    assert_eq!(store.records().unwrap(), vec![json!({"name": "a"}), json!({"name": "b"})]);
    assert_eq!(models.failures.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}
