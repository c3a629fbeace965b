//! Write batches: the unit of atomic commit.

use recbase_model::Record;
use recbase_types::RecordId;

/// One pending write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Creates a record; fails if the id is taken.
    Insert(Record),
    /// Replaces a stored record; fails if it does not exist.
    Update(Record),
    /// Removes a stored record; fails if it does not exist.
    Delete { collection: String, id: RecordId },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            Self::Insert(r) | Self::Update(r) => r.collection(),
            Self::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &RecordId {
        match self {
            Self::Insert(r) | Self::Update(r) => r.id(),
            Self::Delete { id, .. } => id,
        }
    }
}

/// Ordered writes applied all-or-nothing by [`crate::RecordStore::apply`].
///
/// Reads made while a batch is open should go through [`WriteBatch::find`]
/// and [`WriteBatch::overlay`] so that they observe the batch's own writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) {
        self.ops.push(WriteOp::Insert(record.detached()));
    }

    pub fn update(&mut self, record: Record) {
        self.ops.push(WriteOp::Update(record.detached()));
    }

    pub fn delete(&mut self, collection: &str, id: RecordId) {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id,
        });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Appends another batch's writes after this one's.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    /// Drops every write after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.ops.truncate(len);
    }

    /// The batch's view of one record: `Some(Some(_))` if written,
    /// `Some(None)` if deleted, `None` if untouched.
    pub fn find(&self, collection: &str, id: &str) -> Option<Option<&Record>> {
        self.ops
            .iter()
            .rev()
            .find(|op| op.collection() == collection && op.id().as_str() == id)
            .map(|op| match op {
                WriteOp::Insert(r) | WriteOp::Update(r) => Some(r),
                WriteOp::Delete { .. } => None,
            })
    }

    /// Applies the batch's writes on top of `stored` rows of `collection`.
    pub fn overlay(&self, collection: &str, mut stored: Vec<Record>) -> Vec<Record> {
        for op in self.ops.iter().filter(|op| op.collection() == collection) {
            let pos = stored.iter().position(|r| r.id() == op.id());
            match (op, pos) {
                (WriteOp::Insert(r) | WriteOp::Update(r), Some(i)) => stored[i] = r.clone(),
                (WriteOp::Insert(r) | WriteOp::Update(r), None) => stored.push(r.clone()),
                (WriteOp::Delete { .. }, Some(i)) => {
                    stored.remove(i);
                }
                (WriteOp::Delete { .. }, None) => {}
            }
        }
        stored
    }
}
