//! Lookups the evaluator needs from the storage and schema layers.

use recbase_model::{Catalog, Collection, Record};
use std::sync::Arc;

/// Schema lookup by collection name.
pub trait SchemaLookup: Send + Sync {
    fn collection(&self, name: &str) -> Option<Arc<Collection>>;
}

impl SchemaLookup for Catalog {
    fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.get(name).cloned()
    }
}

/// Record lookups used for relation traversal and `@collection` joins.
///
/// Implementations must not fail loudly: a record that cannot be read is
/// reported as absent, which makes the comparison that needed it false.
pub trait RecordResolver: SchemaLookup {
    fn find_record(&self, collection: &str, id: &str) -> Option<Record>;

    fn list_records(&self, collection: &str) -> Vec<Record>;
}
