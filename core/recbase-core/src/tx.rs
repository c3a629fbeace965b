//! Pending writes shared by one outer mutation and everything nested in it.

use crate::abort::AbortSignal;
use crate::error::ApiError;
use crate::events::{RecordAction, RecordEvent};
use recbase_model::Record;
use recbase_storage::WriteBatch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Position to roll back to when a nested mutation halts or fails.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Savepoint {
    writes: usize,
    deferred: usize,
}

/// The transaction of a top-level mutation.
///
/// Writes accumulate in a batch that is applied once, by the outermost
/// chain. Post hooks of nested mutations wait here until that apply has
/// either succeeded or failed.
pub(crate) struct Transaction {
    batch: Mutex<WriteBatch>,
    deferred: Mutex<Vec<RecordEvent>>,
    failure: Mutex<Option<ApiError>>,
    committed: AtomicBool,
    abort: AbortSignal,
}

impl Transaction {
    pub fn new(abort: AbortSignal) -> Self {
        Self {
            batch: Mutex::new(WriteBatch::new()),
            deferred: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            committed: AtomicBool::new(false),
            abort,
        }
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            writes: self.batch.lock().unwrap_or_else(|e| e.into_inner()).len(),
            deferred: self.deferred.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }

    /// Undoes every write since `savepoint` and hands back the nested
    /// events whose writes were undone.
    pub fn rollback_to(&self, savepoint: Savepoint) -> Vec<RecordEvent> {
        self.batch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .truncate(savepoint.writes);
        let mut deferred = self.deferred.lock().unwrap_or_else(|e| e.into_inner());
        if deferred.len() > savepoint.deferred {
            deferred.split_off(savepoint.deferred)
        } else {
            Vec::new()
        }
    }

    pub fn write(&self, action: RecordAction, record: &Record) {
        let mut batch = self.batch.lock().unwrap_or_else(|e| e.into_inner());
        match action {
            RecordAction::Create => batch.insert(record.clone()),
            RecordAction::Update => batch.update(record.clone()),
            RecordAction::Delete => batch.delete(record.collection(), record.id().clone()),
        }
    }

    pub fn snapshot(&self) -> WriteBatch {
        self.batch.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// `Some(Some(_))` if written here, `Some(None)` if deleted here.
    pub fn find(&self, collection: &str, id: &str) -> Option<Option<Record>> {
        self.batch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .find(collection, id)
            .map(|found| found.cloned())
    }

    pub fn overlay(&self, collection: &str, stored: Vec<Record>) -> Vec<Record> {
        self.batch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .overlay(collection, stored)
    }

    pub fn defer(&self, event: RecordEvent) {
        self.deferred.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }

    pub fn take_deferred(&self) -> Vec<RecordEvent> {
        std::mem::take(&mut *self.deferred.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn mark_committed(&self) {
        self.committed.store(true, Ordering::Release);
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Remembers why the commit failed, in case a handler swallows the error.
    pub fn fail(&self, err: ApiError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    pub fn failure(&self) -> Option<ApiError> {
        self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
