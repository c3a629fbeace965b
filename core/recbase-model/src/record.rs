use recbase_types::{RecordId, Timestamp, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A record stored in a collection.
///
/// `fields` only holds schema fields; the system fields (`id`,
/// `collectionName`, `created`, `updated`) are struct members but are also
/// reachable through [`Record::get`] so rules can reference them uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    collection: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    created: Timestamp,
    updated: Timestamp,
    /// Frozen copy captured at chain entry.
    #[serde(skip)]
    original: Option<Arc<Record>>,
    #[serde(skip)]
    is_new: bool,
}

impl Record {
    /// Creates a fresh, not yet persisted record.
    pub fn new(collection: &str) -> Self {
        let now = Timestamp::now();
        Self {
            id: RecordId::new(),
            collection: collection.to_string(),
            fields: BTreeMap::new(),
            created: now,
            updated: now,
            original: None,
            is_new: true,
        }
    }

    /// Rebuilds a persisted record from its stored system fields.
    pub fn restore(collection: &str, id: RecordId, created: Timestamp, updated: Timestamp) -> Self {
        Self {
            id,
            collection: collection.to_string(),
            fields: BTreeMap::new(),
            created,
            updated,
            original: None,
            is_new: false,
        }
    }

    /// Builder-style field set, used heavily in tests and fixtures.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style id override.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn updated(&self) -> Timestamp {
        self.updated
    }

    /// Sets the `updated` timestamp to now.
    pub fn touch(&mut self) {
        self.updated = Timestamp::now();
    }

    /// True until the record has been persisted once.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Marks the record as loaded from (or written to) storage.
    pub fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    /// Reads a field, including system fields. Unknown names yield `Null`.
    pub fn get(&self, name: &str) -> Value {
        match name {
            "id" => Value::Text(self.id.to_string()),
            "collectionName" => Value::Text(self.collection.clone()),
            "created" => Value::Date(self.created),
            "updated" => Value::Date(self.updated),
            _ => self.fields.get(name).cloned().unwrap_or_default(),
        }
    }

    /// Borrowing variant of [`Record::get`] for schema fields only.
    pub fn get_ref(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Writes a schema field. System fields are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if matches!(name, "id" | "collectionName" | "created" | "updated") {
            return;
        }
        self.fields.insert(name.to_string(), value.into());
    }

    /// Removes a schema field, returning its previous value.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Iterates schema fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Captures the current state as the original snapshot.
    ///
    /// Called once when a hook chain is entered; later calls replace the
    /// snapshot.
    pub fn freeze_original(&mut self) {
        let mut snapshot = self.clone();
        snapshot.original = None;
        self.original = Some(Arc::new(snapshot));
    }

    /// Uses `original` (typically the stored version) as the snapshot.
    pub fn set_original(&mut self, original: &Record) {
        self.original = Some(Arc::new(original.detached()));
    }

    /// The frozen snapshot, if one was captured.
    pub fn original(&self) -> Option<&Record> {
        self.original.as_deref()
    }

    /// Names of schema fields whose value differs from the original snapshot.
    /// Without a snapshot every set field counts as changed.
    pub fn changed_fields(&self) -> Vec<&str> {
        let Some(original) = self.original() else {
            return self.fields.keys().map(String::as_str).collect();
        };
        let mut changed: Vec<&str> = self
            .fields
            .iter()
            .filter(|(k, v)| original.fields.get(*k) != Some(*v))
            .map(|(k, _)| k.as_str())
            .collect();
        for key in original.fields.keys() {
            if !self.fields.contains_key(key) {
                changed.push(key.as_str());
            }
        }
        changed.sort_unstable();
        changed
    }

    /// Copy without the original snapshot, suitable for persisting.
    pub fn detached(&self) -> Record {
        let mut copy = self.clone();
        copy.original = None;
        copy
    }

    /// Renders the record as a flat JSON object (system fields first).
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        out.insert("id".into(), self.id.to_string().into());
        out.insert("collectionName".into(), self.collection.clone().into());
        out.insert("created".into(), self.created.to_string().into());
        out.insert("updated".into(), self.updated.to_string().into());
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.to_json());
        }
        out
    }
}

impl PartialEq for Record {
    /// Records compare by persisted state; the snapshot and `is_new` flag
    /// are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.collection == other.collection
            && self.fields == other.fields
            && self.created == other.created
            && self.updated == other.updated
    }
}
