//! Realtime fan-out of committed record changes.
//!
//! Subscribers connect with their request context and subscribe to topics:
//! `posts/*` follows every record of `posts` and is guarded by the list
//! rule, `posts/<id>` follows one record and is guarded by the view rule.
//! Each committed write is re-checked against the rule of every matching
//! subscription, as the subscriber, before anything is sent. A record the
//! subscriber can no longer see produces no message at all.
//!
//! A client may attach a filter expression to a subscription. It is parsed
//! so syntax errors are reported, but never consulted when deciding what to
//! deliver.

use crate::app::App;
use crate::error::{ApiError, ApiResult};
use crate::events::{RealtimeMessageEvent, RecordAction, RecordEvent};
use crate::registry::HookRegistryBuilder;
use async_trait::async_trait;
use recbase_hooks::{Binding, Handler, Next, Terminal};
use recbase_model::{AccessOp, Record};
use recbase_rules::{Access, RequestContext, RequestKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one connected subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a subscription follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `collection/*` (or the bare collection name).
    Collection(String),
    /// `collection/id`
    Record { collection: String, id: String },
}

impl Topic {
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let raw = raw.trim();
        let (collection, rest) = match raw.split_once('/') {
            Some((collection, rest)) => (collection, Some(rest)),
            None => (raw, None),
        };
        if collection.is_empty() {
            return Err(ApiError::rejected(format!("invalid topic '{raw}'")));
        }
        match rest {
            None | Some("*") => Ok(Self::Collection(collection.to_string())),
            Some(id) if !id.is_empty() && !id.contains('/') => Ok(Self::Record {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Some(_) => Err(ApiError::rejected(format!("invalid topic '{raw}'"))),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Collection(collection) | Self::Record { collection, .. } => collection,
        }
    }

    /// The rule that guards delivery on this topic.
    pub fn access_op(&self) -> AccessOp {
        match self {
            Self::Collection(_) => AccessOp::List,
            Self::Record { .. } => AccessOp::View,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Collection(collection) => collection == record.collection(),
            Self::Record { collection, id } => collection == record.collection() && id == record.id().as_str(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(collection) => write!(f, "{collection}/*"),
            Self::Record { collection, id } => write!(f, "{collection}/{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: Topic,
    /// Client supplied; kept for introspection only.
    pub client_filter: Option<String>,
}

/// A message delivered to one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub action: RecordAction,
    pub collection: String,
    pub record: Json,
}

struct Client {
    ctx: RequestContext,
    subscriptions: Vec<Subscription>,
    sender: mpsc::Sender<RealtimeMessage>,
}

/// Snapshot of one client taken before a broadcast, so no lock is held
/// while rules and hooks run.
struct Recipient {
    id: ClientId,
    ctx: RequestContext,
    topics: Vec<Topic>,
    sender: mpsc::Sender<RealtimeMessage>,
}

/// Connected subscribers and their subscriptions.
pub struct Broker {
    clients: RwLock<HashMap<ClientId, Client>>,
    capacity: usize,
}

impl Broker {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Registers a subscriber acting as `ctx`.
    pub fn connect(&self, ctx: RequestContext) -> (ClientId, mpsc::Receiver<RealtimeMessage>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = ClientId::new();
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        clients.insert(
            id,
            Client {
                ctx,
                subscriptions: Vec::new(),
                sender,
            },
        );
        debug!(client = %id, "realtime client connected");
        (id, receiver)
    }

    pub fn disconnect(&self, client: ClientId) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        if clients.remove(&client).is_some() {
            debug!(client = %client, "realtime client disconnected");
        }
    }

    /// Replaces the identity a client's deliveries are checked against.
    pub fn set_context(&self, client: ClientId, ctx: RequestContext) -> ApiResult<()> {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let entry = clients.get_mut(&client).ok_or(ApiError::NotFound)?;
        entry.ctx = ctx;
        Ok(())
    }

    /// Adds a subscription. A `filter` with a syntax error is rejected as
    /// an invalid rule.
    pub fn subscribe(&self, client: ClientId, topic: &str, filter: Option<&str>) -> ApiResult<()> {
        let topic = Topic::parse(topic)?;
        let client_filter = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(source) => {
                recbase_rules::parse(source)?;
                Some(source.to_string())
            }
            None => None,
        };

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let entry = clients.get_mut(&client).ok_or(ApiError::NotFound)?;
        entry.subscriptions.retain(|s| s.topic != topic);
        debug!(client = %client, topic = %topic, "realtime subscription added");
        entry.subscriptions.push(Subscription { topic, client_filter });
        Ok(())
    }

    pub fn unsubscribe(&self, client: ClientId, topic: &str) -> ApiResult<()> {
        let topic = Topic::parse(topic)?;
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let entry = clients.get_mut(&client).ok_or(ApiError::NotFound)?;
        entry.subscriptions.retain(|s| s.topic != topic);
        Ok(())
    }

    pub fn subscriptions(&self, client: ClientId) -> Vec<Subscription> {
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
        clients
            .get(&client)
            .map(|c| c.subscriptions.clone())
            .unwrap_or_default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn recipients(&self, record: &Record) -> Vec<Recipient> {
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
        clients
            .iter()
            .filter_map(|(id, client)| {
                let topics: Vec<Topic> = client
                    .subscriptions
                    .iter()
                    .filter(|s| s.topic.matches(record))
                    .map(|s| s.topic.clone())
                    .collect();
                (!topics.is_empty()).then(|| Recipient {
                    id: *id,
                    ctx: client.ctx.clone(),
                    topics,
                    sender: client.sender.clone(),
                })
            })
            .collect()
    }

    /// Sends `record` to every subscriber whose rule still lets them see it.
    pub async fn broadcast(&self, app: &App, action: RecordAction, record: &Record) {
        let recipients = self.recipients(record);
        if recipients.is_empty() {
            return;
        }
        let Ok(collection) = app.collection(record.collection()) else {
            return;
        };
        let resolver = app.resolver();

        for recipient in recipients {
            if recipient.sender.is_closed() {
                self.disconnect(recipient.id);
                continue;
            }
            let ctx = recipient.ctx.with_kind(RequestKind::Realtime);
            for topic in &recipient.topics {
                match app.rules().check(&collection, topic.access_op(), record, &ctx, &resolver) {
                    Ok(Access::Granted) => {}
                    Ok(access) => {
                        debug!(client = %recipient.id, topic = %topic, ?access, "realtime delivery skipped");
                        continue;
                    }
                    Err(err) => {
                        warn!(client = %recipient.id, topic = %topic, error = %err, "realtime rule check failed");
                        continue;
                    }
                }

                let payload = match app.enrich(record, Some(&ctx)).await {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(client = %recipient.id, error = %err, "realtime enrichment failed");
                        continue;
                    }
                };
                let message = RealtimeMessage {
                    topic: topic.to_string(),
                    action,
                    collection: collection.name.clone(),
                    record: payload,
                };
                let mut event = RealtimeMessageEvent::new(app, recipient.id, ctx.clone(), message);
                let deliver = Deliver {
                    broker: self,
                    sender: &recipient.sender,
                };
                if let Err(err) = app.hooks().realtime_message_send.trigger(&mut event, &deliver).await {
                    warn!(client = %recipient.id, error = %err, "realtime send hook failed");
                }
            }
        }
    }
}

/// Sends a message; a client whose receiver is gone is dropped.
struct Deliver<'a> {
    broker: &'a Broker,
    sender: &'a mpsc::Sender<RealtimeMessage>,
}

#[async_trait]
impl Terminal<RealtimeMessageEvent> for Deliver<'_> {
    async fn finish(&self, event: &mut RealtimeMessageEvent) -> ApiResult<()> {
        match self.sender.try_send(event.message.clone()) {
            Ok(()) => debug!(client = %event.client, topic = %event.message.topic, "realtime message sent"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(client = %event.client, "realtime channel full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(client = %event.client, "realtime channel closed");
                self.broker.disconnect(event.client);
            }
        }
        Ok(())
    }
}

/// Forwards committed writes to the broker.
struct Relay {
    action: RecordAction,
}

#[async_trait]
impl Handler<RecordEvent> for Relay {
    async fn handle(&self, event: &mut RecordEvent, next: Next<'_, RecordEvent>) -> ApiResult<()> {
        let result = next.run(event).await;
        let app = event.app().clone();
        app.realtime().broadcast(&app, self.action, &event.record).await;
        result
    }
}

/// Binds the broker to the post-success hook of every action.
pub(crate) fn install(hooks: &mut HookRegistryBuilder) {
    for action in [RecordAction::Create, RecordAction::Update, RecordAction::Delete] {
        hooks
            .after_success(action)
            .bind(Binding::new(Relay { action }).id("realtime").priority(-100));
    }
}
