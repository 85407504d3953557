use std::fmt;
use std::sync::Arc;

use sheetpump_core::{HtmlTableLoader, ViewLoader};

use crate::config::{Config, TransactionHandlerKind};
use crate::error::Result;
use crate::events::EventBus;
use crate::files::{Filesystem, TemporaryFileFactory};
use crate::heading::HeadingResolver;
use crate::persistence::{MemoryStore, Persistence};
use crate::transaction::{NullTransactionHandler, StoreTransactionHandler, TransactionHandler};

/// Collaborators shared by every operation and every chunk job.
///
/// Cloning is cheap; everything inside is reference counted or small.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub events: EventBus,
    pub persistence: Arc<dyn Persistence>,
    pub transactions: Arc<dyn TransactionHandler>,
    pub filesystem: Filesystem,
    pub view_loader: Arc<dyn ViewLoader>,
    pub temporary_files: TemporaryFileFactory,
}

impl Context {
    /// Default collaborators for `config`, persisting into `store`
    pub fn with_store(config: Config, store: Arc<MemoryStore>) -> Result<Self> {
        let transactions: Arc<dyn TransactionHandler> = match config.transactions.handler {
            TransactionHandlerKind::Null => Arc::new(NullTransactionHandler),
            TransactionHandlerKind::Store => Arc::new(StoreTransactionHandler::new(store.clone())),
        };

        Ok(Self {
            filesystem: Filesystem::from_config(&config.filesystem),
            temporary_files: TemporaryFileFactory::from_config(&config.temporary_files),
            config: Arc::new(config),
            events: EventBus::new(),
            persistence: store,
            transactions,
            view_loader: Arc::new(HtmlTableLoader::new()?),
        })
    }

    pub fn new(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn heading_resolver(&self) -> HeadingResolver {
        HeadingResolver::new(self.config.imports.heading_row.formatter)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("filesystem", &self.filesystem)
            .field("temporary_files", &self.temporary_files)
            .finish_non_exhaustive()
    }
}
