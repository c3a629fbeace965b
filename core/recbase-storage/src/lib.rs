//! Record storage for recbase.
//!
//! The mutation orchestrator only needs three things from storage: point
//! lookups, full collection scans and an atomic apply of a [`WriteBatch`].
//! [`MemoryStore`] keeps everything in process; [`SqliteStore`] persists to
//! SQLite and can evaluate rendered rule filters in the database.

mod batch;
mod error;
mod memory;
mod sqlite;
mod store;

pub use batch::{WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::RecordStore;
