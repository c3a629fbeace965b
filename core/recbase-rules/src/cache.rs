//! Compiled-filter cache keyed by (collection, expression).

use crate::compile::Filter;
use crate::error::RuleResult;
use crate::resolve::SchemaLookup;
use recbase_model::Collection;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Lazily populated cache of compiled filters.
///
/// Compilation happens outside the lock. Two callers racing on the same key
/// may both compile; the second insert wins and both results are equivalent.
/// Failed compilations are not cached.
#[derive(Debug, Default)]
pub struct RuleCache {
    entries: RwLock<HashMap<(String, String), Arc<Filter>>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        source: &str,
        collection: &Collection,
        schema: &dyn SchemaLookup,
    ) -> RuleResult<Arc<Filter>> {
        let key = (collection.name.clone(), source.to_string());
        if let Some(hit) = self.entries.read().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(Arc::clone(hit));
        }

        let filter = Arc::new(Filter::compile(source, collection, schema)?);
        debug!(collection = %collection.name, rule = source, "compiled rule");
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::clone(&filter));
        Ok(filter)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry, e.g. after the schema changed.
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
