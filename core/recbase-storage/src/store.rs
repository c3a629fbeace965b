//! The storage collaborator interface.

use crate::batch::WriteBatch;
use crate::error::StorageResult;
use recbase_model::Record;
use recbase_rules::SqlFilter;

/// Record persistence used by the mutation orchestrator.
///
/// Implementations are synchronous; callers on the async runtime keep
/// critical sections short and never hold a lock across an await.
pub trait RecordStore: Send + Sync {
    fn find(&self, collection: &str, id: &str) -> StorageResult<Option<Record>>;

    /// All rows of a collection in insertion order.
    fn list(&self, collection: &str) -> StorageResult<Vec<Record>>;

    /// Applies every write of `batch` or none of them.
    fn apply(&self, batch: &WriteBatch) -> StorageResult<()>;

    /// Rows matching a rendered rule filter. `Ok(None)` means the store
    /// cannot execute SQL and the caller must filter rows itself.
    fn list_where(&self, collection: &str, filter: &SqlFilter) -> StorageResult<Option<Vec<Record>>> {
        let _ = (collection, filter);
        Ok(None)
    }
}
