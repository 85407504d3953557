use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::concerns::{Record, ToModel};
use crate::error::{Error, Result};

/// Durable sink for records produced by `ToModel` processors
pub trait Persistence: Send + Sync {
    fn save(&self, record: Record) -> Result<()>;

    fn save_many(&self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.save(record)?;
        }
        Ok(())
    }
}

/// A persistence sink that can group writes into transactions
pub trait TransactionalStore: Persistence {
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreState {
    committed: Vec<Record>,
    // Open transactions, one per thread
    pending: HashMap<ThreadId, Vec<Record>>,
}

/// In-memory transactional store.
///
/// Transactions are scoped to the calling thread, so chunks running on
/// different workers never see each other's uncommitted records.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| Error::Persistence("store lock poisoned".to_string()))
    }

    /// Committed records, in commit order
    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self.lock()?.committed.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.committed.len())
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.lock()?.pending.contains_key(&thread::current().id()))
    }
}

impl Persistence for MemoryStore {
    fn save(&self, record: Record) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        match state.pending.get_mut(&thread::current().id()) {
            Some(pending) => pending.push(record),
            None => state.committed.push(record),
        }
        Ok(())
    }

    fn save_many(&self, records: Vec<Record>) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        match state.pending.get_mut(&thread::current().id()) {
            Some(pending) => pending.extend(records),
            None => state.committed.extend(records),
        }
        Ok(())
    }
}

impl TransactionalStore for MemoryStore {
    fn begin(&self) -> Result<()> {
        let mut state = self.lock()?;
        let id = thread::current().id();
        if state.pending.contains_key(&id) {
            return Err(Error::Transaction("transaction already open on this thread".to_string()));
        }
        state.pending.insert(id, Vec::new());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.lock()?;
        let records = state
            .pending
            .remove(&thread::current().id())
            .ok_or_else(|| Error::Transaction("no open transaction to commit".to_string()))?;
        state.committed.extend(records);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.lock()?;
        state
            .pending
            .remove(&thread::current().id())
            .ok_or_else(|| Error::Transaction("no open transaction to roll back".to_string()))?;
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let committed = self.len().unwrap_or_default();
        f.debug_struct("MemoryStore")
            .field("committed", &committed)
            .finish()
    }
}

/// Feeds rows through a `ToModel` processor and persists what it returns
pub struct ModelImporter<'a> {
    sink: &'a dyn ToModel,
    persistence: &'a dyn Persistence,
    batch_size: usize,
    pending: Vec<Record>,
    saved: usize,
}

impl<'a> ModelImporter<'a> {
    pub fn new(sink: &'a dyn ToModel, persistence: &'a dyn Persistence, batch_size: usize) -> Self {
        Self {
            sink,
            persistence,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            saved: 0,
        }
    }

    pub fn push(&mut self, row: u32, record: &Record) -> Result<()> {
        let Some(model) = self.sink.model(record).map_err(|e| Error::row(row, e))? else {
            return Ok(());
        };

        if self.batch_size == 1 {
            self.persistence.save(model)?;
            self.saved += 1;
            return Ok(());
        }

        self.pending.push(model);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.saved += batch.len();
        tracing::trace!(records = batch.len(), "inserting batch");
        self.persistence.save_many(batch)
    }

    /// Records handed to persistence so far
    pub fn saved(&self) -> usize {
        self.saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concerns::ProcessorResult;
    use serde_json::json;

    struct SkipOdd;

    impl ToModel for SkipOdd {
        fn model(&self, row: &Record) -> ProcessorResult<Option<Record>> {
            let n = row["n"].as_i64().unwrap_or_default();
            Ok((n % 2 == 0).then(|| json!({ "even": n })))
        }
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let store = MemoryStore::new();
        store.save(json!(1)).unwrap();

        store.begin().unwrap();
        assert!(store.in_transaction().unwrap());
        store.save(json!(2)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        store.rollback().unwrap();
        assert_eq!(store.records().unwrap(), vec![json!(1)]);

        store.begin().unwrap();
        store.save_many(vec![json!(3), json!(4)]).unwrap();
        store.commit().unwrap();
        assert_eq!(store.records().unwrap(), vec![json!(1), json!(3), json!(4)]);

        assert!(store.commit().is_err());
    }

    #[test]
    fn test_transactions_are_per_thread() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.begin().unwrap();
        store.save(json!("main")).unwrap();

        let other = store.clone();
        std::thread::spawn(move || other.save(json!("worker")).unwrap())
            .join()
            .unwrap();

        assert_eq!(store.records().unwrap(), vec![json!("worker")]);
        store.commit().unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_model_importer_batches() {
        let store = MemoryStore::new();
        let mut importer = ModelImporter::new(&SkipOdd, &store, 2);

        for n in 0..5 {
            importer.push(n + 1, &json!({ "n": n })).unwrap();
        }
        assert_eq!(store.len().unwrap(), 2);
        importer.flush().unwrap();

        assert_eq!(importer.saved(), 3);
        assert_eq!(
            store.records().unwrap(),
            vec![json!({"even": 0}), json!({"even": 2}), json!({"even": 4})]
        );
    }
}
