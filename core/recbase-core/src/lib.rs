//! Orchestration layer of recbase.
//!
//! [`App`] ties the pieces together:
//! - request operations (`list_records`, `view_record`, `create_record`,
//!   `update_record`, `delete_record`) apply access rules and request hooks
//! - every record write goes through a [`Dao`] and its model hook chain,
//!   committing nested writes atomically with the outer one
//! - committed writes fan out to realtime subscribers, re-checked against
//!   each subscriber's rules
//! - records are serialized through the enrichment hook
//!
//! Hooks are bound on the [`AppBuilder`] and frozen by `build()`.

mod abort;
mod app;
mod config;
mod dao;
mod enrich;
mod error;
mod events;
mod realtime;
mod registry;
mod request;
mod resolver;
mod tx;

pub use app::{App, AppBuilder};
pub use config::{AppConfig, HookSettings, RealtimeSettings, StorageSettings};
pub use dao::{Dao, Mutation, MutationMode};
pub use error::{ApiError, ApiResult};
pub use events::{
    RealtimeMessageEvent, RecordAction, RecordEnrichEvent, RecordEvent, RecordRequestEvent, RecordsListRequestEvent,
};
pub use realtime::{Broker, ClientId, RealtimeMessage, Subscription, Topic};
pub use registry::{HookRegistry, HookRegistryBuilder};
pub use resolver::StoreResolver;
