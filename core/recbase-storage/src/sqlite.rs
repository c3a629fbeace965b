//! SQLite-backed record store.
//!
//! One table per collection with one column per field. Set-valued fields
//! are stored as JSON arrays so that rule filters rendered by
//! [`recbase_rules::Predicate::to_sql`] can run against them directly.

use crate::batch::{WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::store::RecordStore;
use recbase_model::{Catalog, Collection, FieldType, Record};
use recbase_rules::SqlFilter;
use recbase_types::{RecordId, Timestamp, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value as Json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A column of a collection table.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    field_type: FieldType,
    multiple: bool,
}

fn columns(collection: &Collection) -> Vec<Column> {
    let mut out = Vec::new();
    if collection.is_auth() {
        out.push(Column {
            name: "email".into(),
            field_type: FieldType::Text,
            multiple: false,
        });
        out.push(Column {
            name: "verified".into(),
            field_type: FieldType::Bool,
            multiple: false,
        });
    }
    out.extend(collection.fields.iter().map(|f| Column {
        name: f.name.clone(),
        field_type: f.field_type,
        multiple: f.is_multiple(),
    }));
    out
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_type(column: &Column) -> &'static str {
    match column.field_type {
        _ if column.multiple => "TEXT",
        FieldType::Number => "REAL",
        FieldType::Bool => "INTEGER",
        _ => "TEXT",
    }
}

/// Persistent store backed by a single SQLite database.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    catalog: Arc<Catalog>,
}

impl SqliteStore {
    /// Opens (or creates) a database at `path` with a table per collection.
    pub fn open(path: impl AsRef<Path>, catalog: Arc<Catalog>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened record database at {:?}", path.as_ref());
        Self::with_connection(conn, catalog)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory(catalog: Arc<Catalog>) -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, catalog)
    }

    fn with_connection(conn: Connection, catalog: Arc<Catalog>) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            catalog,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        for name in self.catalog.names() {
            let collection = self.collection(name)?;
            let mut ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} (\"id\" TEXT PRIMARY KEY NOT NULL, \"created\" TEXT NOT NULL, \"updated\" TEXT NOT NULL",
                quote(name)
            );
            for column in columns(&collection) {
                ddl.push_str(&format!(", {} {}", quote(&column.name), sql_type(&column)));
            }
            ddl.push(')');
            conn.execute_batch(&ddl)?;
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> StorageResult<Arc<Collection>> {
        self.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownCollection(name.to_string()))
    }

    fn select_clause(collection: &Collection) -> String {
        let mut cols = vec!["\"id\"".to_string(), "\"created\"".into(), "\"updated\"".into()];
        cols.extend(columns(collection).iter().map(|c| quote(&c.name)));
        format!("SELECT {} FROM {}", cols.join(", "), quote(&collection.name))
    }

    fn query(&self, collection: &Collection, clause: &str, params: Vec<SqlValue>) -> StorageResult<Vec<Record>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!("{} {clause}", Self::select_clause(collection));
        let mut stmt = conn.prepare(&sql)?;
        let cols = columns(collection);
        let rows = stmt.query_map(params_from_iter(params), |row| Ok(read_row(row, collection, &cols)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }
}

fn read_row(row: &Row<'_>, collection: &Collection, cols: &[Column]) -> StorageResult<Record> {
    let id: String = row.get(0)?;
    let created: String = row.get(1)?;
    let updated: String = row.get(2)?;
    let id = RecordId::parse(&id).map_err(|e| StorageError::InvalidData(e.to_string()))?;
    let created = Timestamp::parse(&created).map_err(|e| StorageError::InvalidData(e.to_string()))?;
    let updated = Timestamp::parse(&updated).map_err(|e| StorageError::InvalidData(e.to_string()))?;

    let mut record = Record::restore(&collection.name, id, created, updated);
    for (i, column) in cols.iter().enumerate() {
        if let Some(value) = decode(row.get_ref(i + 3)?, column)? {
            record.set(&column.name, value);
        }
    }
    Ok(record)
}

fn decode(raw: ValueRef<'_>, column: &Column) -> StorageResult<Option<Value>> {
    let text = |raw: ValueRef<'_>| -> StorageResult<String> {
        Ok(raw
            .as_str()
            .map_err(|e| StorageError::InvalidData(format!("{}: {e}", column.name)))?
            .to_string())
    };
    Ok(Some(match raw {
        ValueRef::Null => return Ok(None),
        _ if column.multiple => {
            let json: Json = serde_json::from_str(&text(raw)?)?;
            Value::from_json(&json)
        }
        ValueRef::Integer(n) if column.field_type == FieldType::Bool => Value::Bool(n != 0),
        ValueRef::Integer(n) => Value::Number(n as f64),
        ValueRef::Real(n) => Value::Number(n),
        _ if column.field_type == FieldType::Date => {
            let raw = text(raw)?;
            if raw.is_empty() {
                Value::text("")
            } else {
                Value::Date(Timestamp::parse(&raw).map_err(|e| StorageError::InvalidData(e.to_string()))?)
            }
        }
        _ => Value::Text(text(raw)?),
    }))
}

fn encode(value: Option<&Value>, column: &Column) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(v) if column.multiple => SqlValue::Text(Json::Array(v.ids().into_iter().map(Json::from).collect()).to_string()),
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => SqlValue::Real(*n),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

fn json_param(value: &Json) -> SqlValue {
    match value {
        Json::Null => SqlValue::Null,
        Json::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

impl RecordStore for SqliteStore {
    fn find(&self, collection: &str, id: &str) -> StorageResult<Option<Record>> {
        let coll = self.collection(collection)?;
        let rows = self.query(&coll, "WHERE \"id\" = ?1", vec![SqlValue::Text(id.to_string())])?;
        Ok(rows.into_iter().next())
    }

    fn list(&self, collection: &str) -> StorageResult<Vec<Record>> {
        let coll = self.collection(collection)?;
        self.query(&coll, "ORDER BY rowid", Vec::new())
    }

    fn apply(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        for op in batch.ops() {
            let coll = self.collection(op.collection())?;
            let table = quote(&coll.name);
            let id = op.id().to_string();
            match op {
                WriteOp::Insert(record) => {
                    let exists = tx
                        .query_row(&format!("SELECT 1 FROM {table} WHERE \"id\" = ?1"), [&id], |_| Ok(()))
                        .optional()?;
                    if exists.is_some() {
                        return Err(StorageError::Conflict {
                            collection: coll.name.clone(),
                            id,
                        });
                    }
                    let cols = columns(&coll);
                    let mut names = vec!["\"id\"".to_string(), "\"created\"".into(), "\"updated\"".into()];
                    names.extend(cols.iter().map(|c| quote(&c.name)));
                    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
                    let mut values = vec![
                        SqlValue::Text(id.clone()),
                        SqlValue::Text(record.created().to_string()),
                        SqlValue::Text(record.updated().to_string()),
                    ];
                    values.extend(cols.iter().map(|c| encode(record.get_ref(&c.name), c)));
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} ({}) VALUES ({})",
                            names.join(", "),
                            placeholders.join(", ")
                        ),
                        params_from_iter(values),
                    )?;
                }
                WriteOp::Update(record) => {
                    let cols = columns(&coll);
                    let mut sets = vec!["\"created\" = ?1".to_string(), "\"updated\" = ?2".into()];
                    sets.extend(cols.iter().enumerate().map(|(i, c)| format!("{} = ?{}", quote(&c.name), i + 3)));
                    let mut values = vec![
                        SqlValue::Text(record.created().to_string()),
                        SqlValue::Text(record.updated().to_string()),
                    ];
                    values.extend(cols.iter().map(|c| encode(record.get_ref(&c.name), c)));
                    values.push(SqlValue::Text(id.clone()));
                    let changed = tx.execute(
                        &format!("UPDATE {table} SET {} WHERE \"id\" = ?{}", sets.join(", "), values.len()),
                        params_from_iter(values),
                    )?;
                    if changed == 0 {
                        return Err(StorageError::NotFound {
                            collection: coll.name.clone(),
                            id,
                        });
                    }
                }
                WriteOp::Delete { .. } => {
                    let changed = tx.execute(&format!("DELETE FROM {table} WHERE \"id\" = ?1"), [&id])?;
                    if changed == 0 {
                        return Err(StorageError::NotFound {
                            collection: coll.name.clone(),
                            id,
                        });
                    }
                }
            }
        }
        tx.commit()?;
        debug!(ops = batch.len(), "committed write batch");
        Ok(())
    }

    fn list_where(&self, collection: &str, filter: &SqlFilter) -> StorageResult<Option<Vec<Record>>> {
        let coll = self.collection(collection)?;
        let params = filter.params.iter().map(json_param).collect();
        let rows = self.query(&coll, &format!("WHERE {} ORDER BY rowid", filter.sql), params)?;
        Ok(Some(rows))
    }
}
