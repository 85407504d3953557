use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sheetpump_core::{create_reader, ReaderOptions};

use super::Job;
use crate::chunk::{ChunkReadFilter, ChunkSpec};
use crate::concerns::Processor;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::files::TemporaryFile;
use crate::heading::{HeadingResolver, RowBounds};
use crate::session::SheetSession;
use crate::transaction::within;

/// The serializable part of a chunk job: everything a worker on another
/// machine needs besides the processor itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTask {
    pub reader: ReaderOptions,
    pub file: TemporaryFile,
    pub chunk: ChunkSpec,
    #[serde(default = "default_tries")]
    pub tries: u32,
}

fn default_tries() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk starts below the sheet's last row
    Skipped,
    Imported { rows: usize },
}

/// Shared by every chunk of one import.
///
/// When the last chunk lets go of it, whichever worker that happens on, the
/// working copy is removed and `AfterImport` is raised unless a chunk failed.
pub(crate) struct PendingImport {
    file: TemporaryFile,
    import: Arc<dyn Processor>,
    context: Context,
    failed: AtomicBool,
}

impl PendingImport {
    pub(crate) fn new(file: TemporaryFile, import: Arc<dyn Processor>, context: Context) -> Self {
        Self {
            file,
            import,
            context,
            failed: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }
}

impl Drop for PendingImport {
    fn drop(&mut self) {
        if let Err(err) = self.file.delete(&self.context.filesystem) {
            tracing::warn!(error = %err, "could not remove temporary import file");
        }
        if *self.failed.get_mut() {
            tracing::debug!("import finished with failed chunks");
            return;
        }

        let concerns = self.import.concerns();
        let raised = self
            .context
            .events
            .for_processor(&concerns)
            .raise(&mut Event::AfterImport {
                concerns: concerns.set(),
            });
        match raised {
            Ok(()) => tracing::info!("chunked import finished"),
            Err(err) => tracing::error!(error = %err, "after import listener raised an error"),
        }
    }
}

/// Imports one chunk of one sheet
#[derive(Clone)]
pub struct ReadChunk {
    task: ChunkTask,
    import: Arc<dyn Processor>,
    sheet_import: Arc<dyn Processor>,
    context: Context,
    pending: Option<Arc<PendingImport>>,
}

impl ReadChunk {
    /// `import` is the processor the caller handed in; `sheet_import` is the
    /// one handling this sheet (the same unless it has multiple sheets)
    pub fn new(
        task: ChunkTask,
        import: Arc<dyn Processor>,
        sheet_import: Arc<dyn Processor>,
        context: Context,
    ) -> Self {
        Self {
            task,
            import,
            sheet_import,
            context,
            pending: None,
        }
    }

    pub(crate) fn finishing(mut self, pending: Arc<PendingImport>) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn with_tries(mut self, tries: u32) -> Self {
        self.task.tries = tries.max(1);
        self
    }

    pub fn task(&self) -> &ChunkTask {
        &self.task
    }

    pub fn file(&self) -> &TemporaryFile {
        &self.task.file
    }

    pub fn chunk(&self) -> &ChunkSpec {
        &self.task.chunk
    }

    pub fn run(&self) -> Result<ChunkOutcome> {
        let chunk = &self.task.chunk;
        let concerns = self.sheet_import.concerns();

        let mut reader = create_reader(&self.task.reader);
        if let Some(custom) = concerns.with_custom_value_binder {
            reader.set_value_binder(custom.value_binder());
        }
        let heading_row = HeadingResolver::heading_row(&concerns);
        reader.set_read_filter(Arc::new(ChunkReadFilter::new(heading_row, chunk)));
        reader.set_read_data_only(true);
        reader.set_read_empty_cells(false);

        let local = self.task.file.sync(&self.context.filesystem)?;
        let sheet = reader.load(local.path())?.take_sheet_by_name(&chunk.sheet_name)?;
        drop(local);
        let mut session = SheetSession::new(sheet, &self.context);

        if session.sheet().highest_row() < chunk.start_row {
            tracing::debug!(
                sheet = %chunk.sheet_name,
                start_row = chunk.start_row,
                highest_row = session.sheet().highest_row(),
                "chunk starts past the last row, skipping"
            );
            session.disconnect();
            return Ok(ChunkOutcome::Skipped);
        }

        let bounds = RowBounds {
            start_row: chunk.start_row,
            end_row: chunk.end_row(),
        };
        let result = within(self.context.transactions.as_ref(), || {
            session.import_rows(self.sheet_import.as_ref(), bounds)
        });
        session.disconnect();

        let rows = result?;
        tracing::debug!(sheet = %chunk.sheet_name, start_row = chunk.start_row, rows, "chunk imported");
        Ok(ChunkOutcome::Imported { rows })
    }
}

impl Job for ReadChunk {
    fn handle(&self) -> Result<()> {
        self.run().map(|_| ())
    }

    fn failed(&self, error: &Error) {
        if let Some(pending) = &self.pending {
            pending.mark_failed();
        }
        super::report_failure(&self.context, self.import.as_ref(), error);
    }

    fn tries(&self) -> u32 {
        self.task.tries
    }

    fn name(&self) -> String {
        let chunk = &self.task.chunk;
        format!("read-chunk[{}:{}-{}]", chunk.sheet_name, chunk.start_row, chunk.end_row())
    }
}

impl fmt::Debug for ReadChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadChunk")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concerns::{Concerns, HandlesFailures, OnEachRow, ProcessorResult, WithChunkReading, WithHeadingRow};
    use crate::config::Config;
    use crate::events::EventKind;
    use crate::row::Row;
    use crate::transaction::TransactionHandler;
    use sheetpump_core::FileType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Names {
        seen: Mutex<Vec<(u32, String)>>,
        failures: AtomicUsize,
    }

    impl WithHeadingRow for Names {}

    impl WithChunkReading for Names {
        fn chunk_size(&self) -> usize {
            2
        }
    }

    impl OnEachRow for Names {
        fn on_row(&self, row: &Row) -> ProcessorResult<()> {
            let name = row.keyed_value("name")?;
            if name == "boom" {
                anyhow::bail!("bad name");
            }
            self.seen
                .lock()
                .unwrap()
                .push((row.index(), name.as_str().unwrap_or_default().to_string()));
            Ok(())
        }
    }

    impl HandlesFailures for Names {
        fn failed(&self, _error: &Error) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Processor for Names {
        fn concerns(&self) -> Concerns<'_> {
            Concerns::new()
                .with_heading_row(self)
                .with_chunk_reading(self)
                .on_each_row(self)
                .handles_failures(self)
        }
    }

    struct Counting(AtomicUsize);

    impl TransactionHandler for Counting {
        fn run(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            work()
        }
    }

    fn job(dir: &tempfile::TempDir, body: &str, start_row: u32, names: Arc<Names>, context: Context) -> ReadChunk {
        let path = dir.path().join("names.csv");
        std::fs::write(&path, body).unwrap();
        let task = ChunkTask {
            reader: ReaderOptions::new(FileType::Csv),
            file: TemporaryFile::Local { path },
            chunk: ChunkSpec::new("Worksheet", start_row, 2).unwrap(),
            tries: 1,
        };
        ReadChunk::new(task, names.clone(), names, context)
    }

    #[test]
    fn test_chunk_reads_its_window_with_headings() {
        let dir = tempfile::tempdir().unwrap();
        let names = Arc::new(Names::default());
        let context = Context::new(Config::default()).unwrap();
        let job = job(&dir, "name\na\nb\nc\nd\n", 4, names.clone(), context);

        assert_eq!(job.run().unwrap(), ChunkOutcome::Imported { rows: 2 });
        assert_eq!(
            *names.seen.lock().unwrap(),
            vec![(4, "c".to_string()), (5, "d".to_string())]
        );
    }

    #[test]
    fn test_chunk_past_end_skips_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let names = Arc::new(Names::default());
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let mut context = Context::new(Config::default()).unwrap();
        context.transactions = counting.clone() as Arc<dyn TransactionHandler>;

        let past = job(&dir, "name\na\n", 4, names.clone(), context.clone());
        assert_eq!(past.run().unwrap(), ChunkOutcome::Skipped);
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);

        let inside = job(&dir, "name\na\n", 2, names, context);
        assert_eq!(inside.run().unwrap(), ChunkOutcome::Imported { rows: 1 });
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_raises_event_and_hook() {
        let dir = tempfile::tempdir().unwrap();
        let names = Arc::new(Names::default());
        let raised = Arc::new(AtomicUsize::new(0));
        let mut context = Context::new(Config::default()).unwrap();
        let counter = raised.clone();
        context.events.listen(EventKind::ImportFailed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let job = job(&dir, "name\nok\nboom\n", 2, names.clone(), context);
        let err = super::super::run_with_retries(&job).unwrap_err();

        assert!(matches!(err, Error::RowConversion { row: 3, .. }));
        assert_eq!(raised.load(Ordering::SeqCst), 1);
        assert_eq!(names.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_chunk_suppresses_after_import() {
        let dir = tempfile::tempdir().unwrap();
        let names = Arc::new(Names::default());
        let finished = Arc::new(AtomicUsize::new(0));
        let mut context = Context::new(Config::default()).unwrap();
        let counter = finished.clone();
        context.events.listen(EventKind::AfterImport, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let base = job(&dir, "name\nok\nboom\n", 2, names.clone(), context.clone());
        let file = base.file().clone();
        let pending = Arc::new(PendingImport::new(file.clone(), names.clone(), context.clone()));
        let window = |start_row| {
            let task = ChunkTask {
                chunk: ChunkSpec::new("Worksheet", start_row, 1).unwrap(),
                ..base.task().clone()
            };
            ReadChunk::new(task, names.clone(), names.clone(), context.clone()).finishing(pending.clone())
        };
        let ok = window(2);
        let bad = window(3);
        drop(window);
        drop(pending);

        assert!(super::super::run_with_retries(&bad).is_err());
        drop(bad);
        assert!(file.local_path().exists());

        ok.run().unwrap();
        drop(ok);
        assert!(!file.local_path().exists());
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_task_serializes() {
        let task = ChunkTask {
            reader: ReaderOptions::new(FileType::Json),
            file: TemporaryFile::Local { path: "/tmp/x.json".into() },
            chunk: ChunkSpec::new("Data", 10, 5).unwrap(),
            tries: 3,
        };
        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(serde_json::from_str::<ChunkTask>(&json).unwrap(), task);
    }
}
