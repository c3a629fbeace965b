//! Events passed down the hook chains.

use crate::app::App;
use crate::dao::Dao;
use crate::error::ApiError;
use crate::realtime::{ClientId, RealtimeMessage};
use recbase_hooks::{HookEvent, Phase};
use recbase_model::{AccessOp, Collection, Record};
use recbase_rules::RequestContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// The kind of record mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Create,
    Update,
    Delete,
}

impl RecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// The access rule guarding this action.
    pub fn access_op(&self) -> AccessOp {
        match self {
            Self::Create => AccessOp::Create,
            Self::Update => AccessOp::Update,
            Self::Delete => AccessOp::Delete,
        }
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn advance(current: &mut Phase, to: Phase, collection: &str) {
    if *current == to {
        return;
    }
    if !current.can_advance_to(to) {
        warn!(collection, from = %current, to = %to, "unexpected phase transition");
    }
    trace!(collection, from = %current, to = %to, "phase");
    *current = to;
}

/// Model-level event: one record moving through its mutation chain.
///
/// `dao()` is bound to the chain's transaction while the write is pending;
/// mutations made through it commit or roll back together with this one.
/// Post-commit hooks get an unbound handle instead.
pub struct RecordEvent {
    pub record: Record,
    pub collection: Arc<Collection>,
    pub action: RecordAction,
    pub phase: Phase,
    /// Set before the post-error hook runs.
    pub error: Option<ApiError>,
    pub(crate) written: bool,
    dao: Dao,
}

impl RecordEvent {
    pub(crate) fn new(action: RecordAction, record: Record, collection: Arc<Collection>, dao: Dao) -> Self {
        Self {
            record,
            collection,
            action,
            phase: Phase::RequestPre,
            error: None,
            written: false,
            dao,
        }
    }

    pub fn dao(&self) -> &Dao {
        &self.dao
    }

    pub fn app(&self) -> &App {
        self.dao.app()
    }

    pub(crate) fn set_dao(&mut self, dao: Dao) {
        self.dao = dao;
    }

    pub(crate) fn advance(&mut self, to: Phase) {
        advance(&mut self.phase, to, &self.collection.name);
    }
}

impl HookEvent for RecordEvent {
    type Error = ApiError;

    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection.name)
    }
}

/// Request-level event for view, create, update and delete operations.
///
/// `response` holds the payload the caller receives. A handler that halts
/// the chain may fill it itself; when it stays empty the operation answers
/// without a body.
pub struct RecordRequestEvent {
    pub record: Record,
    pub collection: Arc<Collection>,
    pub ctx: RequestContext,
    pub phase: Phase,
    pub response: Option<Json>,
    app: App,
}

impl RecordRequestEvent {
    pub(crate) fn new(app: &App, record: Record, collection: Arc<Collection>, ctx: &RequestContext) -> Self {
        Self {
            record,
            collection,
            ctx: ctx.clone(),
            phase: Phase::RequestPre,
            response: None,
            app: app.clone(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub(crate) fn advance(&mut self, to: Phase) {
        advance(&mut self.phase, to, &self.collection.name);
    }
}

impl HookEvent for RecordRequestEvent {
    type Error = ApiError;

    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection.name)
    }
}

/// Request-level event for list operations. `records` are already filtered
/// by the list rule.
pub struct RecordsListRequestEvent {
    pub records: Vec<Record>,
    pub collection: Arc<Collection>,
    pub ctx: RequestContext,
    pub response: Option<Vec<Json>>,
    app: App,
}

impl RecordsListRequestEvent {
    pub(crate) fn new(app: &App, records: Vec<Record>, collection: Arc<Collection>, ctx: &RequestContext) -> Self {
        Self {
            records,
            collection,
            ctx: ctx.clone(),
            response: None,
            app: app.clone(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }
}

impl HookEvent for RecordsListRequestEvent {
    type Error = ApiError;

    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection.name)
    }
}

/// Runs before a record is serialized for a client.
///
/// `record` is an output copy; changing it never touches storage. Hidden
/// fields start out hidden for everyone but superusers.
pub struct RecordEnrichEvent {
    pub record: Record,
    pub collection: Arc<Collection>,
    pub ctx: Option<RequestContext>,
    hidden: BTreeSet<String>,
    computed: Map<String, Json>,
    app: App,
}

impl RecordEnrichEvent {
    pub(crate) fn new(app: &App, record: Record, collection: Arc<Collection>, ctx: Option<&RequestContext>) -> Self {
        let superuser = ctx.is_some_and(RequestContext::is_superuser);
        let hidden = if superuser {
            BTreeSet::new()
        } else {
            collection.hidden_fields().map(str::to_string).collect()
        };
        Self {
            record,
            collection,
            ctx: ctx.cloned(),
            hidden,
            computed: Map::new(),
            app: app.clone(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Omits `field` from the output.
    pub fn hide(&mut self, field: &str) {
        self.hidden.insert(field.to_string());
    }

    /// Includes a field that would otherwise be hidden.
    pub fn unhide(&mut self, field: &str) {
        self.hidden.remove(field);
    }

    pub fn is_hidden(&self, field: &str) -> bool {
        self.hidden.contains(field)
    }

    /// Adds a value that is not part of the schema to the output.
    pub fn set_computed(&mut self, name: &str, value: impl Into<Json>) {
        self.computed.insert(name.to_string(), value.into());
    }

    /// The payload sent to the client.
    pub fn output(&self) -> Json {
        let mut out = self.record.to_json();
        out.retain(|key, _| !self.hidden.contains(key));
        for (key, value) in &self.computed {
            out.insert(key.clone(), value.clone());
        }
        Json::Object(out)
    }
}

impl HookEvent for RecordEnrichEvent {
    type Error = ApiError;

    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection.name)
    }
}

/// One realtime message about to be delivered to one subscriber. Halting
/// the chain drops the message; handlers may also rewrite it.
pub struct RealtimeMessageEvent {
    pub client: ClientId,
    pub ctx: RequestContext,
    pub message: RealtimeMessage,
    app: App,
}

impl RealtimeMessageEvent {
    pub(crate) fn new(app: &App, client: ClientId, ctx: RequestContext, message: RealtimeMessage) -> Self {
        Self {
            client,
            ctx,
            message,
            app: app.clone(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }
}

impl HookEvent for RealtimeMessageEvent {
    type Error = ApiError;

    fn collection_name(&self) -> Option<&str> {
        Some(&self.message.collection)
    }
}
