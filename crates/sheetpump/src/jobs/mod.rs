//! Queued units of work.
//!
//! Chunked imports and queued exports are broken into [`Job`]s and handed to
//! a [`Queue`]. The default [`SyncQueue`] runs each job on the calling thread;
//! the worker crate provides a pooled queue.

mod read_chunk;
mod store_export;

pub(crate) use read_chunk::PendingImport;
pub use read_chunk::{ChunkOutcome, ChunkTask, ReadChunk};
pub use store_export::StoreQueuedExport;

use crate::concerns::Processor;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::Event;

pub trait Job: Send + Sync {
    fn handle(&self) -> Result<()>;

    /// Called once after the last attempt failed
    fn failed(&self, _error: &Error) {}

    /// Total attempts before the job is given up
    fn tries(&self) -> u32 {
        1
    }

    fn name(&self) -> String;
}

pub trait Queue: Send + Sync {
    fn dispatch(&self, job: Box<dyn Job>) -> Result<()>;
}

/// Run `job` up to its allowed number of tries.
///
/// On exhaustion the failure hook is invoked and the last error returned.
pub fn run_with_retries(job: &dyn Job) -> Result<()> {
    let tries = job.tries().max(1);
    let mut attempt = 1;

    loop {
        match job.handle() {
            Ok(()) => return Ok(()),
            Err(err) if attempt < tries => {
                tracing::warn!(job = %job.name(), attempt, error = %err, "job failed, retrying");
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(job = %job.name(), attempt, error = %err, "job failed");
                job.failed(&err);
                return Err(err);
            }
        }
    }
}

/// Tell the processor an import failed: `ImportFailed` listeners first, then
/// its own failure hook. Listener errors are logged, not returned.
pub(crate) fn report_failure(context: &Context, processor: &dyn Processor, error: &Error) {
    let concerns = processor.concerns();
    let events = context.events.for_processor(&concerns);

    if let Err(err) = events.raise(&mut Event::ImportFailed { error }) {
        tracing::error!(error = %err, "import failed listener raised an error");
    }
    if let Some(handler) = concerns.handles_failures {
        handler.failed(error);
    }
}

/// Runs every job inline, as soon as it is dispatched
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncQueue;

impl Queue for SyncQueue {
    fn dispatch(&self, job: Box<dyn Job>) -> Result<()> {
        tracing::debug!(job = %job.name(), "running job inline");
        run_with_retries(job.as_ref())
    }
}
