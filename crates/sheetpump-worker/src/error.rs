use thiserror::Error;

/// Worker pool error type
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] sheetpump::Error),
}
