pub mod config;
pub mod error;

use std::sync::{Arc, Mutex};

use sheetpump::{Error, Job, Queue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use crate::config::WorkerConfig;
pub use crate::error::WorkerError;

type Sender = mpsc::UnboundedSender<Box<dyn Job>>;
type Receiver = mpsc::UnboundedReceiver<Box<dyn Job>>;

/// Outcome counts of a pool's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl PoolReport {
    fn merge(&mut self, other: PoolReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// A fixed set of tokio workers pulling jobs from one channel
pub struct WorkerPool {
    sender: Arc<Mutex<Option<Sender>>>,
    workers: Vec<JoinHandle<PoolReport>>,
}

impl WorkerPool {
    /// Spawn `workers` workers on the current runtime
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| tokio::spawn(work(id, receiver.clone())))
            .collect();

        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            workers,
        }
    }

    /// A handle that dispatches onto this pool
    pub fn queue(&self) -> PoolQueue {
        PoolQueue {
            sender: self.sender.clone(),
        }
    }

    /// Stop accepting jobs, drain what is queued and wait for every worker
    pub async fn shutdown(self) -> Result<PoolReport, WorkerError> {
        drop(
            self.sender
                .lock()
                .map_err(|_| WorkerError::Config("pool sender lock poisoned".to_string()))?
                .take(),
        );

        let mut report = PoolReport::default();
        for worker in self.workers {
            report.merge(worker.await?);
        }
        tracing::info!(succeeded = report.succeeded, failed = report.failed, "worker pool shut down");
        Ok(report)
    }
}

/// [`Queue`] implementation feeding a [`WorkerPool`]
#[derive(Clone)]
pub struct PoolQueue {
    sender: Arc<Mutex<Option<Sender>>>,
}

impl Queue for PoolQueue {
    fn dispatch(&self, job: Box<dyn Job>) -> sheetpump::Result<()> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| Error::Queue("pool sender lock poisoned".to_string()))?;
        let sender = guard.as_ref().ok_or_else(|| Error::Queue(WorkerError::ShutDown.to_string()))?;

        tracing::debug!(job = %job.name(), "dispatching job to pool");
        sender
            .send(job)
            .map_err(|_| Error::Queue("every worker has stopped".to_string()))
    }
}

async fn work(id: usize, receiver: Arc<tokio::sync::Mutex<Receiver>>) -> PoolReport {
    let mut report = PoolReport::default();

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let job: Arc<dyn Job> = Arc::from(job);
        match run(job.clone()).await {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                tracing::error!(worker = id, job = %job.name(), error = %err, "job gave up");
                report.failed += 1;
            }
        }
    }

    tracing::debug!(worker = id, "worker stopped");
    report
}

/// Run one job on the blocking pool, retrying up to its allowed tries
async fn run(job: Arc<dyn Job>) -> sheetpump::Result<()> {
    let tries = job.tries().max(1);
    let mut attempt = 1;

    loop {
        let handle = job.clone();
        let outcome = match tokio::task::spawn_blocking(move || handle.handle()).await {
            Ok(outcome) => outcome,
            Err(join) => Err(Error::Processor(anyhow::anyhow!("job panicked: {}", join))),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(err) if attempt < tries => {
                tracing::warn!(job = %job.name(), attempt, error = %err, "job failed, retrying");
                attempt += 1;
            }
            Err(err) => {
                let failed = job.clone();
                return match tokio::task::spawn_blocking(move || {
                    failed.failed(&err);
                    err
                })
                .await
                {
                    Ok(err) => Err(err),
                    Err(join) => Err(Error::Queue(format!("failure hook panicked: {}", join))),
                };
            }
        }
    }
}
