//! Top-level export and import entry points.

use std::path::Path;
use std::sync::Arc;

use sheetpump_core::{
    create_reader, create_writer, CsvSettings, FileType, GridError, ReaderOptions, SheetReader, ViewLoader,
    Workbook, WorksheetInfo,
};

use crate::chunk::plan;
use crate::concerns::{Concern, Concerns, Processor, ProcessorResult, SheetSelector};
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::files::{Disk, TemporaryFile};
use crate::heading::HeadingResolver;
use crate::jobs::{report_failure, ChunkTask, PendingImport, Queue, ReadChunk, StoreQueuedExport, SyncQueue};
use crate::persistence::{MemoryStore, Persistence};
use crate::session::SheetSession;
use crate::transaction::{within, TransactionHandler};

/// A chunked import that has been planned but not yet run
#[derive(Debug)]
pub struct QueuedImport {
    /// Working copy every job reads from
    pub file: TemporaryFile,
    pub jobs: Vec<ReadChunk>,
}

pub struct Engine {
    context: Context,
    queue: Arc<dyn Queue>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            context: Context::new(config)?,
            queue: Arc::new(SyncQueue),
        })
    }

    /// Engine whose store transaction handler and persistence share `store`
    pub fn with_store(config: Config, store: Arc<MemoryStore>) -> Result<Self> {
        Ok(Self {
            context: Context::with_store(config, store)?,
            queue: Arc::new(SyncQueue),
        })
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.context.persistence = persistence;
        self
    }

    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionHandler>) -> Self {
        self.context.transactions = transactions;
        self
    }

    pub fn with_disk(mut self, name: impl Into<String>, disk: Arc<dyn Disk>) -> Self {
        self.context.filesystem.add_disk(name, disk);
        self
    }

    pub fn with_view_loader(mut self, loader: Arc<dyn ViewLoader>) -> Self {
        self.context.view_loader = loader;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = queue;
        self
    }

    /// Register a global listener
    pub fn listen<F>(&mut self, kind: EventKind, f: F)
    where
        F: Fn(&mut Event<'_>) -> ProcessorResult<()> + Send + Sync + 'static,
    {
        self.context.events.listen(kind, f);
    }

    /// Register a global listener that only fires for processors with `concern`
    pub fn extend<F>(&mut self, concern: Concern, kind: EventKind, f: F)
    where
        F: Fn(&mut Event<'_>) -> ProcessorResult<()> + Send + Sync + 'static,
    {
        self.context.events.extend(concern, kind, f);
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Build a workbook from an export processor
    pub fn export(&self, processor: &dyn Processor) -> Result<Workbook> {
        let concerns = processor.concerns();
        concerns.validate_export()?;

        let sheets = concerns.with_multiple_sheets.map(|multi| multi.sheets());
        if let Some(sheets) = &sheets {
            for (_, sheet_export) in sheets {
                sheet_export.concerns().validate_export()?;
            }
        }

        let events = self.context.events.for_processor(&concerns);
        events.raise(&mut Event::BeforeExport {
            concerns: concerns.set(),
        })?;

        let mut workbook = Workbook::new();
        match sheets {
            Some(sheets) => {
                for (_, sheet_export) in sheets {
                    self.export_sheet(&mut workbook, sheet_export.as_ref())?;
                }
            }
            None => self.export_sheet(&mut workbook, processor)?,
        }

        events.raise(&mut Event::BeforeWriting {
            workbook: &mut workbook,
            concerns: concerns.set(),
        })?;

        tracing::info!(sheets = workbook.sheet_count(), "export built");
        Ok(workbook)
    }

    fn export_sheet(&self, workbook: &mut Workbook, processor: &dyn Processor) -> Result<()> {
        let index = workbook.create_sheet();
        let sheet = workbook.take_sheet(index)?;

        let mut session = SheetSession::new(sheet, &self.context);
        session.export(processor)?;
        let sheet = session.into_sheet();

        if sheet.name.trim().is_empty() {
            return Err(GridError::InvalidSheetName("Name cannot be empty".to_string()).into());
        }
        if workbook.sheet_name_exists(&sheet.name) {
            return Err(GridError::SheetNameExists(sheet.name).into());
        }
        workbook.sheets.insert(index, sheet);
        Ok(())
    }

    /// Write an export straight to a local path
    pub fn write(&self, processor: &dyn Processor, path: &Path, writer_type: Option<FileType>) -> Result<()> {
        let file_type = file_type(path, writer_type)?;
        let workbook = self.export(processor)?;
        let csv = csv_settings(&processor.concerns(), self.context.config.exports.csv.clone());

        create_writer(file_type, &csv).save(&workbook, path)?;
        tracing::info!(path = %path.display(), file_type = %file_type, "export written");
        Ok(())
    }

    /// Export to a temporary file, then queue the copy onto `disk`
    pub fn store(
        &self,
        processor: &dyn Processor,
        path: &str,
        disk: Option<&str>,
        writer_type: Option<FileType>,
    ) -> Result<()> {
        let file_type = file_type(Path::new(path), writer_type)?;
        let temporary = self.context.temporary_files.make_local(file_type.extension())?;
        self.write(processor, temporary.local_path(), Some(file_type))?;

        self.queue.dispatch(Box::new(StoreQueuedExport::new(
            temporary,
            disk.map(str::to_string),
            path,
            self.context.clone(),
        )))
    }

    /// Import a file.
    ///
    /// Processors reading in chunks are planned and handed to the queue. The
    /// working copy is removed and `AfterImport` raised once the last chunk
    /// has finished, which may be after this returns. Everything else runs
    /// inline inside one transaction.
    pub fn import(&self, processor: Arc<dyn Processor>, path: &Path, reader_type: Option<FileType>) -> Result<()> {
        let concerns = processor.concerns();
        concerns.validate_import()?;
        let file_type = file_type(path, reader_type)?;

        let events = self.context.events.for_processor(&concerns);
        events.raise(&mut Event::BeforeImport {
            concerns: concerns.set(),
        })?;

        if concerns.has(Concern::WithChunkReading) {
            let queued = self.queue_import(processor.clone(), path, Some(file_type))?;
            let pending = Arc::new(PendingImport::new(queued.file, processor.clone(), self.context.clone()));

            for job in queued.jobs {
                if let Err(err) = self.queue.dispatch(Box::new(job.finishing(pending.clone()))) {
                    pending.mark_failed();
                    return Err(err);
                }
            }
            return Ok(());
        }

        let result = self.import_inline(&processor, &concerns, path, file_type);
        if let Err(err) = &result {
            report_failure(&self.context, processor.as_ref(), err);
            return result.map(|_| ());
        }

        events.raise(&mut Event::AfterImport {
            concerns: concerns.set(),
        })
    }

    fn import_inline(
        &self,
        processor: &Arc<dyn Processor>,
        concerns: &Concerns<'_>,
        path: &Path,
        file_type: FileType,
    ) -> Result<usize> {
        let reader = self.reader(concerns, file_type);
        let mut workbook = reader.load(path)?;

        let mut targets = Vec::new();
        for (selector, sheet_import) in sheet_processors(processor, concerns) {
            let name = match &selector {
                SheetSelector::Index(index) => workbook.sheet_by_index(*index)?.name.clone(),
                SheetSelector::Name(name) => workbook.sheet_by_name(name)?.name.clone(),
            };
            targets.push((name, sheet_import));
        }

        within(self.context.transactions.as_ref(), || {
            let mut rows = 0;
            for (name, sheet_import) in &targets {
                let sheet = workbook.take_sheet_by_name(name)?;
                let start_row = HeadingResolver::start_row(&sheet_import.concerns());

                let mut session = SheetSession::new(sheet, &self.context);
                let imported = session.import(sheet_import.as_ref(), start_row);
                session.disconnect();
                rows += imported?;
            }
            tracing::info!(path = %path.display(), rows, "import finished");
            Ok(rows)
        })
    }

    /// Plan a chunked import without running it.
    ///
    /// The source is copied to a temporary file first; the caller owns that
    /// file and should hand it to [`Engine::finish_import`] once every job
    /// has completed.
    pub fn queue_import(
        &self,
        processor: Arc<dyn Processor>,
        path: &Path,
        reader_type: Option<FileType>,
    ) -> Result<QueuedImport> {
        let concerns = processor.concerns();
        concerns.validate_import()?;
        let file_type = file_type(path, reader_type)?;

        let file = self
            .context
            .temporary_files
            .copy_from(path, &self.context.filesystem)?;

        match self.plan_jobs(&processor, &concerns, &file, file_type) {
            Ok(jobs) => {
                tracing::info!(path = %path.display(), chunks = jobs.len(), "import queued");
                Ok(QueuedImport { file, jobs })
            }
            Err(err) => {
                self.cleanup(&file);
                Err(err)
            }
        }
    }

    fn plan_jobs(
        &self,
        processor: &Arc<dyn Processor>,
        concerns: &Concerns<'_>,
        file: &TemporaryFile,
        file_type: FileType,
    ) -> Result<Vec<ReadChunk>> {
        let options = self.reader_options(concerns, file_type);
        let infos = create_reader(&options).list_worksheet_info(file.local_path())?;

        let chunk_size = concerns
            .with_chunk_reading
            .map(|c| c.chunk_size())
            .unwrap_or(self.context.config.imports.chunk_size);
        let chunk_size = u32::try_from(chunk_size)
            .map_err(|_| Error::InvalidChunk(format!("chunk size {} is too large", chunk_size)))?;

        let mut jobs = Vec::new();
        for (selector, sheet_import) in sheet_processors(processor, concerns) {
            let info = worksheet(&infos, &selector)?;
            let bounds = HeadingResolver::bounds(&sheet_import.concerns(), info.total_rows);

            for chunk in plan(&info.name, bounds.start_row, bounds.end_row, chunk_size)? {
                let task = ChunkTask {
                    reader: options.clone(),
                    file: file.clone(),
                    chunk,
                    tries: 1,
                };
                jobs.push(ReadChunk::new(
                    task,
                    processor.clone(),
                    sheet_import.clone(),
                    self.context.clone(),
                ));
            }
        }
        Ok(jobs)
    }

    /// Remove the working copy and raise `AfterImport`
    pub fn finish_import(&self, processor: &dyn Processor, file: &TemporaryFile) -> Result<()> {
        file.delete(&self.context.filesystem)?;

        let concerns = processor.concerns();
        self.context
            .events
            .for_processor(&concerns)
            .raise(&mut Event::AfterImport {
                concerns: concerns.set(),
            })
    }

    fn cleanup(&self, file: &TemporaryFile) {
        if let Err(err) = file.delete(&self.context.filesystem) {
            tracing::warn!(error = %err, "could not remove temporary import file");
        }
    }

    fn reader_options(&self, concerns: &Concerns<'_>, file_type: FileType) -> ReaderOptions {
        let imports = &self.context.config.imports;
        ReaderOptions {
            file_type,
            read_data_only: imports.read_only,
            csv: csv_settings(concerns, imports.csv.clone()),
        }
    }

    fn reader(&self, concerns: &Concerns<'_>, file_type: FileType) -> Box<dyn SheetReader> {
        let mut reader = create_reader(&self.reader_options(concerns, file_type));
        if let Some(custom) = concerns.with_custom_value_binder {
            reader.set_value_binder(custom.value_binder());
        }
        reader
    }
}

fn file_type(path: &Path, declared: Option<FileType>) -> Result<FileType> {
    match declared {
        Some(file_type) => Ok(file_type),
        None => Ok(FileType::identify(path)?),
    }
}

fn csv_settings(concerns: &Concerns<'_>, base: CsvSettings) -> CsvSettings {
    match concerns.with_custom_csv_settings {
        Some(custom) => custom.csv_settings(base),
        None => base,
    }
}

fn sheet_processors(processor: &Arc<dyn Processor>, concerns: &Concerns<'_>) -> Vec<(SheetSelector, Arc<dyn Processor>)> {
    match concerns.with_multiple_sheets {
        Some(multi) => multi.sheets(),
        None => vec![(SheetSelector::Index(0), processor.clone())],
    }
}

fn worksheet<'a>(infos: &'a [WorksheetInfo], selector: &SheetSelector) -> Result<&'a WorksheetInfo> {
    let found = match selector {
        SheetSelector::Index(index) => infos.get(*index),
        SheetSelector::Name(name) => infos.iter().find(|info| &info.name == name),
    };
    found.ok_or_else(|| Error::SheetNotFound(selector.to_string()))
}
