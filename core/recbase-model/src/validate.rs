//! Schema validation and request body application.

use crate::collection::{Collection, Field, FieldType};
use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use recbase_types::{Timestamp, Value};
use serde_json::{Map, Value as Json};

impl Collection {
    /// Checks a record against the schema: known fields, value types,
    /// item limits and required fields.
    pub fn validate_record(&self, record: &Record) -> ModelResult<()> {
        if record.collection() != self.name {
            return Err(ModelError::InvalidSchema(format!(
                "record belongs to '{}', not '{}'",
                record.collection(),
                self.name
            )));
        }

        for (name, value) in record.fields() {
            match self.field(name) {
                Some(field) => check_value(field, value)?,
                None if self.is_auth() && name == "email" => {
                    expect(name, matches!(value, Value::Text(_) | Value::Null), "a string")?
                }
                None if self.is_auth() && name == "verified" => {
                    expect(name, matches!(value, Value::Bool(_) | Value::Null), "a boolean")?
                }
                None => {
                    return Err(ModelError::UnknownField {
                        collection: self.name.clone(),
                        field: name.to_string(),
                    });
                }
            }
        }

        for field in self.fields.iter().filter(|f| f.required) {
            if record.get_ref(&field.name).is_none_or(Value::is_empty) {
                return Err(ModelError::Required(field.name.clone()));
            }
        }
        Ok(())
    }

    /// Applies submitted body data onto a record.
    ///
    /// Keys are field names; `name+` appends to and `name-` removes from a
    /// multi-valued field. System fields are ignored here (the caller decides
    /// whether a client supplied `id` is honoured) and so are keys that match
    /// no field.
    pub fn apply_body(&self, record: &mut Record, body: &Map<String, Json>) -> ModelResult<()> {
        for (key, json) in body {
            if let Some(name) = key.strip_suffix('+') {
                if let Some(field) = self.field(name).filter(|f| f.is_multiple()) {
                    let mut items = list_items(record.get_ref(name));
                    for item in as_string_items(field, json)? {
                        if field.field_type == FieldType::Tags || !items.contains(&item) {
                            items.push(item);
                        }
                    }
                    record.set(name, Value::List(items));
                }
                continue;
            }
            if let Some(name) = key.strip_suffix('-') {
                if let Some(field) = self.field(name).filter(|f| f.is_multiple()) {
                    let remove = as_string_items(field, json)?;
                    let items: Vec<String> = list_items(record.get_ref(name))
                        .into_iter()
                        .filter(|item| !remove.contains(item))
                        .collect();
                    record.set(name, Value::List(items));
                }
                continue;
            }
            if self.is_system_field(key) {
                if self.is_auth() && key == "email" {
                    record.set(key, coerce(&Field::text(key), json)?);
                } else if self.is_auth() && key == "verified" {
                    record.set(key, coerce(&Field::bool(key), json)?);
                }
                continue;
            }
            if let Some(field) = self.field(key) {
                record.set(key, coerce(field, json)?);
            }
        }
        Ok(())
    }
}

fn expect(field: &str, ok: bool, expected: &'static str) -> ModelResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ModelError::TypeMismatch {
            field: field.to_string(),
            expected,
        })
    }
}

fn check_value(field: &Field, value: &Value) -> ModelResult<()> {
    let name = field.name.as_str();
    if matches!(value, Value::Null) {
        return Ok(());
    }
    match field.field_type {
        FieldType::Text => expect(name, matches!(value, Value::Text(_)), "a string"),
        FieldType::Number => expect(name, matches!(value, Value::Number(n) if n.is_finite()), "a finite number"),
        FieldType::Bool => expect(name, matches!(value, Value::Bool(_)), "a boolean"),
        FieldType::Date => expect(name, matches!(value, Value::Date(_)), "a date"),
        FieldType::Tags => expect(name, matches!(value, Value::List(_)), "a list of strings"),
        FieldType::Relation | FieldType::File if field.is_multiple() => {
            expect(name, matches!(value, Value::List(_)), "a list of ids")?;
            let max = field.max_select.unwrap_or(1);
            if value.cardinality() > max {
                return Err(ModelError::TooManyItems {
                    field: name.to_string(),
                    max,
                });
            }
            Ok(())
        }
        FieldType::Relation | FieldType::File => expect(name, matches!(value, Value::Text(_)), "a single id"),
    }
}

fn list_items(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items.clone(),
        Some(Value::Text(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn as_string_items(field: &Field, json: &Json) -> ModelResult<Vec<String>> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::String(s) if s.is_empty() => Ok(Vec::new()),
        Json::String(s) => Ok(vec![s.clone()]),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(s) => Ok(s.clone()),
                Json::Number(n) if field.field_type == FieldType::Tags => Ok(n.to_string()),
                _ => Err(ModelError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "a list of strings",
                }),
            })
            .collect(),
        _ => Err(ModelError::TypeMismatch {
            field: field.name.clone(),
            expected: "a string or a list of strings",
        }),
    }
}

/// Converts submitted JSON into the value type the field stores.
fn coerce(field: &Field, json: &Json) -> ModelResult<Value> {
    let mismatch = |expected| ModelError::TypeMismatch {
        field: field.name.clone(),
        expected,
    };
    match field.field_type {
        FieldType::Text => match json {
            Json::Null => Ok(Value::text("")),
            Json::String(s) => Ok(Value::text(s.as_str())),
            Json::Number(n) => Ok(Value::text(n.to_string())),
            Json::Bool(b) => Ok(Value::text(b.to_string())),
            _ => Err(mismatch("a string")),
        },
        FieldType::Number => match json {
            Json::Null => Ok(Value::Null),
            Json::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| mismatch("a number")),
            Json::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Json::String(s) => s.trim().parse::<f64>().map(Value::Number).map_err(|_| mismatch("a number")),
            _ => Err(mismatch("a number")),
        },
        FieldType::Bool => match json {
            Json::Null => Ok(Value::Bool(false)),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" | "" => Ok(Value::Bool(false)),
                _ => Err(mismatch("a boolean")),
            },
            Json::Number(n) => Ok(Value::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
            _ => Err(mismatch("a boolean")),
        },
        FieldType::Date => match json {
            Json::Null => Ok(Value::Null),
            Json::String(s) if s.is_empty() => Ok(Value::Null),
            Json::String(s) => Timestamp::parse(s).map(Value::Date).map_err(|_| mismatch("a date")),
            _ => Err(mismatch("a date")),
        },
        FieldType::Tags => Ok(Value::List(as_string_items(field, json)?)),
        FieldType::Relation | FieldType::File => {
            let items = as_string_items(field, json)?;
            if field.is_multiple() {
                Ok(Value::List(items))
            } else if items.len() > 1 {
                Err(ModelError::TooManyItems {
                    field: field.name.clone(),
                    max: 1,
                })
            } else {
                Ok(Value::Text(items.into_iter().next().unwrap_or_default()))
            }
        }
    }
}
