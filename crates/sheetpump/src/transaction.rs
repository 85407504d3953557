use std::sync::Arc;

use crate::error::{Error, Result};
use crate::persistence::TransactionalStore;

/// Wraps one unit of work so its effects apply together or not at all
pub trait TransactionHandler: Send + Sync {
    /// Run `work`, returning its failure unchanged
    fn run(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Run `work` through `handler` and hand back its output
pub fn within<T, F>(handler: &dyn TransactionHandler, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let mut work = Some(work);
    let mut output = None;

    handler.run(&mut || {
        let work = work
            .take()
            .ok_or_else(|| Error::Transaction("unit of work invoked twice".to_string()))?;
        output = Some(work()?);
        Ok(())
    })?;

    output.ok_or_else(|| Error::Transaction("unit of work did not run".to_string()))
}

/// Pass-through: no atomicity
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransactionHandler;

impl TransactionHandler for NullTransactionHandler {
    fn run(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        work()
    }
}

/// Begins, commits or rolls back a transaction on a store
#[derive(Clone)]
pub struct StoreTransactionHandler {
    store: Arc<dyn TransactionalStore>,
}

impl StoreTransactionHandler {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }
}

impl TransactionHandler for StoreTransactionHandler {
    fn run(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.store.begin()?;

        match work() {
            Ok(()) => self.store.commit(),
            Err(err) => {
                tracing::warn!(error = %err, "rolling back transaction");
                if let Err(rollback) = self.store.rollback() {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
