//! In-memory record store.

use crate::batch::{WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::store::RecordStore;
use recbase_model::Record;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Keeps rows per collection in insertion order.
///
/// Collections spring into existence on first insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds rows without going through a batch.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write().unwrap_or_else(|e| e.into_inner());
            for mut record in records {
                record.mark_persisted();
                tables
                    .entry(record.collection().to_string())
                    .or_default()
                    .push(record.detached());
            }
        }
        store
    }

    /// Number of stored rows across all collections.
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply_op(rows: &mut Vec<Record>, op: &WriteOp) -> StorageResult<()> {
    let pos = rows.iter().position(|r| r.id() == op.id());
    let missing = || StorageError::NotFound {
        collection: op.collection().to_string(),
        id: op.id().to_string(),
    };
    match op {
        WriteOp::Insert(record) => {
            if pos.is_some() {
                return Err(StorageError::Conflict {
                    collection: op.collection().to_string(),
                    id: op.id().to_string(),
                });
            }
            let mut stored = record.detached();
            stored.mark_persisted();
            rows.push(stored);
        }
        WriteOp::Update(record) => {
            let i = pos.ok_or_else(missing)?;
            let mut stored = record.detached();
            stored.mark_persisted();
            rows[i] = stored;
        }
        WriteOp::Delete { .. } => {
            let i = pos.ok_or_else(missing)?;
            rows.remove(i);
        }
    }
    Ok(())
}

impl RecordStore for MemoryStore {
    fn find(&self, collection: &str, id: &str) -> StorageResult<Option<Record>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .get(collection)
            .and_then(|rows| rows.iter().find(|r| r.id().as_str() == id))
            .cloned())
    }

    fn list(&self, collection: &str) -> StorageResult<Vec<Record>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.get(collection).cloned().unwrap_or_default())
    }

    fn apply(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());

        // Work on copies of the touched tables so a failing op leaves no trace.
        let mut scratch: HashMap<String, Vec<Record>> = HashMap::new();
        for op in batch.ops() {
            let rows = scratch
                .entry(op.collection().to_string())
                .or_insert_with(|| tables.get(op.collection()).cloned().unwrap_or_default());
            apply_op(rows, op)?;
        }

        debug!(ops = batch.len(), tables = scratch.len(), "applied write batch");
        tables.extend(scratch);
        Ok(())
    }
}
