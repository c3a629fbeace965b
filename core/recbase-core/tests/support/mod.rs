//! Shared fixture: users, posts, tasks and a few helper collections.

#![allow(dead_code)]

use recbase_core::{App, AppConfig, ApiError, HookRegistryBuilder, RecordEvent};
use recbase_hooks::Binding;
use recbase_model::{Catalog, Collection, Field, Record, Rule};
use recbase_rules::{AuthIdentity, RequestContext};
use recbase_storage::{MemoryStore, RecordStore, StorageError, StorageResult, WriteBatch};
use recbase_types::RecordId;
use serde_json::{Map, Value as Json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn rec(collection: &str, id: &str) -> Record {
    Record::new(collection).with_id(RecordId::parse(id).unwrap())
}

pub fn collections() -> Vec<Collection> {
    vec![
        Collection::auth("users")
            .with_field(Field::text("name"))
            .with_list_rule(Rule::Open)
            .with_view_rule(Rule::Open),
        Collection::auth("_superusers"),
        Collection::base("posts")
            .with_field(Field::text("title").required())
            .with_field(Field::text("status"))
            .with_field(Field::relation("author", "users"))
            .with_field(Field::text("secret").hidden())
            .with_list_rule(Rule::filter("status = 'published' || @request.auth.id = author"))
            .with_view_rule(Rule::filter("status = 'published' || @request.auth.id = author"))
            .with_create_rule(Rule::filter("@request.auth.id != ''"))
            .with_update_rule(Rule::filter("@request.auth.id = author"))
            .with_delete_rule(Rule::filter("@request.auth.id = author")),
        Collection::base("tasks")
            .with_field(Field::text("title").required())
            .with_field(Field::bool("done"))
            .with_field(Field::text("note"))
            .with_all_rules(Rule::Open),
        Collection::base("other")
            .with_field(Field::text("label"))
            .with_field(Field::number("counter"))
            .with_all_rules(Rule::Open),
        Collection::base("audits")
            .with_field(Field::text("entry").required())
            .with_all_rules(Rule::Open),
        Collection::base("private")
            .with_field(Field::text("body"))
            .with_all_rules(Rule::filter("@request.auth.id != ''")),
        Collection::base("locked_notes").with_field(Field::text("body")),
        Collection::base("feed")
            .with_field(Field::text("body"))
            .with_list_rule(Rule::filter("@request.context = 'realtime'"))
            .with_create_rule(Rule::Open),
        Collection::view("stats")
            .with_field(Field::number("total"))
            .with_list_rule(Rule::Open),
    ]
}

pub fn catalog() -> Catalog {
    Catalog::from_collections(collections()).unwrap()
}

pub fn seed() -> Vec<Record> {
    vec![
        rec("users", "u1").with("name", "alice"),
        rec("users", "u2").with("name", "bob"),
        rec("posts", "pub1")
            .with("title", "Hello")
            .with("status", "published")
            .with("author", "u1")
            .with("secret", "s1"),
        rec("posts", "pub2")
            .with("title", "World")
            .with("status", "published")
            .with("author", "u2"),
        rec("posts", "d1").with("title", "Draft 1").with("status", "draft").with("author", "u1"),
        rec("posts", "d2").with("title", "Draft 2").with("status", "draft").with("author", "u2"),
        rec("tasks", "t1").with("title", "Write tests").with("done", false),
        rec("other", "o1").with("label", "mirror").with("counter", 0.0),
        rec("private", "p1").with("body", "members only"),
        rec("locked_notes", "n1").with("body", "root only"),
        rec("stats", "s1").with("total", 4.0),
    ]
}

pub fn config() -> AppConfig {
    AppConfig::default()
}

/// App over a seeded in-memory store.
pub fn app(bind: impl FnOnce(&mut HookRegistryBuilder)) -> App {
    app_with(Arc::new(MemoryStore::with_records(seed())), config(), bind)
}

pub fn app_with(store: Arc<dyn RecordStore>, config: AppConfig, bind: impl FnOnce(&mut HookRegistryBuilder)) -> App {
    App::builder()
        .config(config)
        .catalog(catalog())
        .store(store)
        .hooks(bind)
        .build()
        .unwrap()
}

pub fn anonymous() -> RequestContext {
    RequestContext::anonymous()
}

pub fn as_user(id: &str) -> RequestContext {
    RequestContext::authenticated(AuthIdentity::new(rec("users", id)))
}

pub fn as_superuser() -> RequestContext {
    RequestContext::authenticated(AuthIdentity::new(rec("_superusers", "root")))
}

/// `ctx` with a JSON object as submitted body.
pub fn with_body(ctx: Option<RequestContext>, body: Json) -> RequestContext {
    let body: Map<String, Json> = match body {
        Json::Object(map) => map,
        other => panic!("body must be an object, got {other}"),
    };
    RequestContext::builder()
        .maybe_auth(ctx.and_then(|c| c.auth().cloned()))
        .body(body)
        .method("POST")
        .build()
}

pub fn ids(payload: &[Json]) -> Vec<String> {
    payload
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub fn stored(app: &App, collection: &str, id: &str) -> Option<Record> {
    app.store().find(collection, id).unwrap()
}

/// Ordered log shared between handlers and the test body.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }
}

/// Logs `label` and continues.
pub fn note(journal: &Journal, label: &'static str) -> Binding<RecordEvent> {
    let journal = journal.clone();
    Binding::<RecordEvent>::func(move |e, next| {
        let journal = journal.clone();
        Box::pin(async move {
            journal.push(label);
            next.run(e).await
        })
    })
}

/// Logs `label:<error kind>` from a post-error hook.
pub fn note_error(journal: &Journal, label: &'static str) -> Binding<RecordEvent> {
    let journal = journal.clone();
    Binding::<RecordEvent>::func(move |e, next| {
        let journal = journal.clone();
        Box::pin(async move {
            let kind = match &e.error {
                Some(ApiError::Aborted) => "aborted",
                Some(ApiError::StorageFailure(_)) => "storage",
                Some(ApiError::InputRejected(_)) => "rejected",
                Some(ApiError::HookAborted(_)) => "hook",
                Some(_) => "other",
                None => "none",
            };
            journal.push(format!("{label}:{kind}"));
            next.run(e).await
        })
    })
}

/// A memory store whose batches can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn seeded() -> Self {
        Self {
            inner: MemoryStore::with_records(seed()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl RecordStore for FlakyStore {
    fn find(&self, collection: &str, id: &str) -> StorageResult<Option<Record>> {
        self.inner.find(collection, id)
    }

    fn list(&self, collection: &str) -> StorageResult<Vec<Record>> {
        self.inner.list(collection)
    }

    fn apply(&self, batch: &WriteBatch) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidData("disk full".into()));
        }
        self.inner.apply(batch)
    }
}
