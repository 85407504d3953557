use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sheetpump::concerns::{OnEachRow, WithChunkReading, WithHeadingRow};
use sheetpump::{Concerns, Engine, Processor, ProcessorResult, Queue, Row};
use sheetpump_worker::{WorkerConfig, WorkerPool};

#[derive(Parser, Debug)]
#[command(about = "Stream a spreadsheet through a chunked import and print each row as JSON")]
struct Args {
    /// Input file (CSV or JSON workbook)
    path: PathBuf,

    /// Rows per chunk; defaults to the configured import chunk size
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Treat the first row as data instead of headings
    #[arg(long = "no-heading")]
    no_heading: bool,

    /// Number of workers; overrides SHEETPUMP_WORKERS
    #[arg(long)]
    workers: Option<usize>,

    /// Attempts per chunk; overrides SHEETPUMP_TRIES
    #[arg(long)]
    tries: Option<u32>,
}

/// Prints every row as one JSON line
struct PrintRows {
    chunk_size: usize,
    heading: bool,
    out: Mutex<std::io::Stdout>,
}

impl WithChunkReading for PrintRows {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl WithHeadingRow for PrintRows {}

impl OnEachRow for PrintRows {
    fn on_row(&self, row: &Row) -> ProcessorResult<()> {
        let line = serde_json::json!({
            "row": row.index(),
            "values": row.to_record(&serde_json::Value::Null, true, false),
        });
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("stdout lock poisoned"))?;
        writeln!(out, "{}", line)?;
        Ok(())
    }
}

impl Processor for PrintRows {
    fn concerns(&self) -> Concerns<'_> {
        let concerns = Concerns::new().with_chunk_reading(self).on_each_row(self);
        if self.heading {
            concerns.with_heading_row(self)
        } else {
            concerns
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = WorkerConfig::from_env()?;
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if let Some(tries) = args.tries {
        config.tries = tries.max(1);
    }

    let engine_config = config.load_engine_config()?;
    let processor = Arc::new(PrintRows {
        chunk_size: args.chunk_size.unwrap_or(engine_config.imports.chunk_size),
        heading: !args.no_heading,
        out: Mutex::new(std::io::stdout()),
    });
    let engine = Engine::new(engine_config)?;

    let queued = engine
        .queue_import(processor.clone(), &args.path, None)
        .with_context(|| format!("planning import of {}", args.path.display()))?;
    tracing::info!(chunks = queued.jobs.len(), workers = config.workers, "starting import");

    let pool = WorkerPool::new(config.workers);
    let queue = pool.queue();
    for job in queued.jobs {
        queue.dispatch(Box::new(job.with_tries(config.tries)))?;
    }
    drop(queue);

    let report = pool.shutdown().await?;
    if report.failed > 0 {
        if let Err(err) = queued.file.delete(&engine.context().filesystem) {
            tracing::warn!(error = %err, "could not remove temporary import file");
        }
        anyhow::bail!("{} of {} chunks failed", report.failed, report.failed + report.succeeded);
    }

    engine.finish_import(processor.as_ref(), &queued.file)?;
    tracing::info!(chunks = report.succeeded, "import finished");
    Ok(())
}
