//! Record and collection model for recbase.
//!
//! Defines the types every other subsystem depends on:
//! - [`Record`]: a typed field map with id, timestamps and an original snapshot
//! - [`Collection`]: a named schema of [`Field`]s plus five [`Rule`]s
//! - [`Catalog`]: schema lookup by collection name
//!
//! Schema validation and request body application live here as well so that
//! both hook-driven and direct mutations run exactly the same checks.

mod catalog;
mod collection;
mod error;
mod record;
mod rule;
mod validate;

pub use catalog::Catalog;
pub use collection::{Collection, CollectionKind, Field, FieldType, SYSTEM_FIELDS};
pub use error::{ModelError, ModelResult};
pub use record::Record;
pub use rule::{AccessOp, AccessRules, Rule};
