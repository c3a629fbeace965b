//! Schema lookup by collection name.

use crate::collection::{Collection, FieldType};
use crate::error::{ModelError, ModelResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable set of collections known to the process.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: HashMap<String, Arc<Collection>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog and checks cross-collection references.
    pub fn from_collections(collections: impl IntoIterator<Item = Collection>) -> ModelResult<Self> {
        let mut catalog = Self::new();
        for collection in collections {
            catalog.insert(collection)?;
        }
        catalog.check_relations()?;
        Ok(catalog)
    }

    /// Adds a collection. Duplicate names and duplicate field names are
    /// rejected.
    pub fn insert(&mut self, collection: Collection) -> ModelResult<()> {
        if collection.name.is_empty() {
            return Err(ModelError::InvalidSchema("collection name must not be empty".into()));
        }
        if self.collections.contains_key(&collection.name) {
            return Err(ModelError::InvalidSchema(format!(
                "duplicate collection '{}'",
                collection.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &collection.fields {
            if collection.is_system_field(&field.name) {
                return Err(ModelError::InvalidSchema(format!(
                    "field '{}' shadows a system field",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ModelError::InvalidSchema(format!(
                    "duplicate field '{}' in '{}'",
                    field.name, collection.name
                )));
            }
            if field.field_type == FieldType::Relation && field.collection.is_none() {
                return Err(ModelError::InvalidSchema(format!(
                    "relation field '{}' has no target collection",
                    field.name
                )));
            }
        }
        self.collections.insert(collection.name.clone(), Arc::new(collection));
        Ok(())
    }

    /// Verifies that every relation field targets a known collection.
    pub fn check_relations(&self) -> ModelResult<()> {
        for collection in self.collections.values() {
            for field in &collection.fields {
                if let Some(target) = &field.collection {
                    if !self.collections.contains_key(target) {
                        return Err(ModelError::InvalidSchema(format!(
                            "field '{}.{}' targets unknown collection '{}'",
                            collection.name, field.name, target
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Collection>> {
        self.collections.get(name)
    }

    /// Like [`Catalog::get`] but returns an error for unknown names.
    pub fn require(&self, name: &str) -> ModelResult<&Arc<Collection>> {
        self.collections
            .get(name)
            .ok_or_else(|| ModelError::UnknownCollection(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
