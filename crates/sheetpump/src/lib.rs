pub mod chunk;
pub mod concerns;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod files;
pub mod heading;
pub mod jobs;
pub mod mapped;
pub mod persistence;
pub mod row;
pub mod session;
pub mod transaction;

pub use chunk::{plan, ChunkReadFilter, ChunkSpec};
pub use concerns::{
    Concern, ConcernSet, Concerns, Processor, ProcessorResult, Record, SheetSelector, POPULATE_ORDER,
};
pub use config::{Config, HeadingFormatter, TransactionHandlerKind};
pub use context::Context;
pub use engine::{Engine, QueuedImport};
pub use error::{Error, Result};
pub use events::{listener, Event, EventBus, EventKind, Listener};
pub use files::{Disk, Filesystem, LocalCopy, LocalDisk, TemporaryFile, TemporaryFileFactory};
pub use heading::{HeadingResolver, ResolvedRange, RowBounds};
pub use jobs::{run_with_retries, ChunkOutcome, ChunkTask, Job, Queue, ReadChunk, StoreQueuedExport, SyncQueue};
pub use mapped::MappedReader;
pub use persistence::{MemoryStore, ModelImporter, Persistence, TransactionalStore};
pub use row::{HeadingRowState, Row};
pub use session::{expand_rows, SheetSession};
pub use transaction::{within, NullTransactionHandler, StoreTransactionHandler, TransactionHandler};
