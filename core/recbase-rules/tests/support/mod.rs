//! Shared fixture: a small catalog with users, teams, posts and settings.

#![allow(dead_code)]

use recbase_model::{Catalog, Collection, Field, Record, Rule};
use recbase_rules::{AuthIdentity, RecordResolver, RequestContext, SchemaLookup};
use recbase_types::{RecordId, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Fixture {
    pub catalog: Catalog,
    records: HashMap<String, Vec<Record>>,
}

impl SchemaLookup for Fixture {
    fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.catalog.get(name).cloned()
    }
}

impl RecordResolver for Fixture {
    fn find_record(&self, collection: &str, id: &str) -> Option<Record> {
        self.records
            .get(collection)?
            .iter()
            .find(|r| r.id().as_str() == id)
            .cloned()
    }

    fn list_records(&self, collection: &str) -> Vec<Record> {
        self.records.get(collection).cloned().unwrap_or_default()
    }
}

impl Fixture {
    pub fn coll(&self, name: &str) -> Arc<Collection> {
        self.catalog.get(name).cloned().unwrap()
    }

    pub fn record(&self, collection: &str, id: &str) -> Record {
        self.find_record(collection, id).unwrap()
    }

    pub fn add(&mut self, record: Record) {
        self.records
            .entry(record.collection().to_string())
            .or_default()
            .push(record);
    }

    pub fn clear(&mut self, collection: &str) {
        self.records.remove(collection);
    }
}

pub fn rec(collection: &str, id: &str) -> Record {
    Record::new(collection).with_id(RecordId::parse(id).unwrap())
}

pub fn collections() -> Vec<Collection> {
    vec![
        Collection::auth("users")
            .with_field(Field::text("name"))
            .with_field(Field::text("role"))
            .with_field(Field::relation("team", "teams")),
        Collection::base("teams")
            .with_field(Field::text("name"))
            .with_field(Field::relations("members", "users", 10)),
        Collection::base("posts")
            .with_field(Field::text("title"))
            .with_field(Field::text("status"))
            .with_field(Field::bool("public"))
            .with_field(Field::number("views"))
            .with_field(Field::tags("tags"))
            .with_field(Field::relation("author", "users"))
            .with_field(Field::relations("editors", "users", 3))
            .with_field(Field::file("cover", 1))
            .with_field(Field::file("gallery", 5))
            .with_list_rule(Rule::filter("public = true || author = @request.auth.id"))
            .with_view_rule(Rule::filter("public = true || author = @request.auth.id"))
            .with_create_rule(Rule::filter(
                "@request.auth.id != \"\" && @request.body.author = @request.auth.id",
            ))
            .with_update_rule(Rule::filter("author = @request.auth.id"))
            .with_delete_rule(Rule::Locked),
        Collection::base("articles")
            .with_field(Field::text("title"))
            .with_field(Field::text("status"))
            .with_field(Field::relation("author", "users"))
            .with_list_rule(Rule::filter("status = 'published' || @request.auth.id = author"))
            .with_view_rule(Rule::filter("status = 'published' || @request.auth.id = author"))
            .with_create_rule(Rule::filter("@request.auth.id != ''")),
        Collection::base("settings")
            .with_field(Field::text("key"))
            .with_field(Field::text("value")),
        Collection::base("_superusers"),
    ]
}

pub fn fixture() -> Fixture {
    let mut f = Fixture {
        catalog: Catalog::from_collections(collections()).unwrap(),
        records: HashMap::new(),
    };
    f.add(rec("users", "u1").with("name", "alice").with("role", "admin"));
    f.add(rec("users", "u2").with("name", "bob").with("role", "member").with("team", "t1"));
    f.add(rec("teams", "t1").with("name", "core").with("members", Value::list(["u1", "u2"])));
    f.add(
        rec("posts", "p1")
            .with("title", "Hello World")
            .with("public", false)
            .with("views", 10.0)
            .with("author", "u1")
            .with("tags", Value::list(["rust", "db"])),
    );
    f.add(
        rec("posts", "p2")
            .with("title", "Second")
            .with("public", true)
            .with("author", "u2")
            .with("editors", Value::list(["u1", "u2"]))
            .with("tags", Value::list(["rust"])),
    );
    f.add(rec("posts", "p3").with("title", "Orphan").with("public", false).with("author", "ghost"));
    f.add(rec("posts", "p4").with("title", "Nobody").with("public", false));
    for (id, status, author) in [
        ("a1", "published", "u1"),
        ("a2", "draft", "u1"),
        ("a3", "draft", "u2"),
        ("a4", "published", "u2"),
    ] {
        f.add(rec("articles", id).with("status", status).with("author", author));
    }
    f.add(rec("settings", "s1").with("key", "mode").with("value", "open"));
    f.add(rec("settings", "s2").with("key", "signup").with("value", "closed"));
    f
}

pub fn as_user(f: &Fixture, id: &str) -> RequestContext {
    RequestContext::authenticated(AuthIdentity::new(f.record("users", id)))
}

pub fn as_superuser() -> RequestContext {
    RequestContext::authenticated(AuthIdentity::new(rec("_superusers", "root")))
}
