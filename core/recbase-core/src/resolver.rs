//! Record lookups for the rule evaluator, backed by the record store.

use crate::error::ApiResult;
use crate::tx::Transaction;
use recbase_model::{Catalog, Collection, Record};
use recbase_rules::{RecordResolver, SchemaLookup};
use recbase_storage::RecordStore;
use std::sync::Arc;
use tracing::warn;

/// Reads records from storage, seeing the pending writes of a transaction
/// when bound to one.
#[derive(Clone)]
pub struct StoreResolver {
    catalog: Arc<Catalog>,
    store: Arc<dyn RecordStore>,
    tx: Option<Arc<Transaction>>,
}

impl StoreResolver {
    pub(crate) fn new(catalog: Arc<Catalog>, store: Arc<dyn RecordStore>, tx: Option<Arc<Transaction>>) -> Self {
        Self { catalog, store, tx }
    }

    pub fn find(&self, collection: &str, id: &str) -> ApiResult<Option<Record>> {
        if let Some(pending) = self.tx.as_ref().and_then(|tx| tx.find(collection, id)) {
            return Ok(pending);
        }
        Ok(self.store.find(collection, id)?)
    }

    pub fn list(&self, collection: &str) -> ApiResult<Vec<Record>> {
        let stored = self.store.list(collection)?;
        Ok(match &self.tx {
            Some(tx) => tx.overlay(collection, stored),
            None => stored,
        })
    }
}

impl SchemaLookup for StoreResolver {
    fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.catalog.get(name).cloned()
    }
}

impl RecordResolver for StoreResolver {
    fn find_record(&self, collection: &str, id: &str) -> Option<Record> {
        self.find(collection, id).unwrap_or_else(|e| {
            warn!(collection, id, error = %e, "record lookup failed during rule evaluation");
            None
        })
    }

    fn list_records(&self, collection: &str) -> Vec<Record> {
        self.list(collection).unwrap_or_else(|e| {
            warn!(collection, error = %e, "collection scan failed during rule evaluation");
            Vec::new()
        })
    }
}
