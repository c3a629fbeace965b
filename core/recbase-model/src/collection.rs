use crate::rule::{AccessRules, Rule};
use serde::{Deserialize, Serialize};

/// Fields every record carries regardless of schema.
pub const SYSTEM_FIELDS: [&str; 4] = ["id", "collectionName", "created", "updated"];

/// Fields implicitly present on auth collections.
const AUTH_FIELDS: [&str; 2] = ["email", "verified"];

/// What records of a collection represent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    #[default]
    Base,
    /// Records are identities that can authenticate.
    Auth,
    /// Read-only projection; create/update/delete are rejected.
    View,
}

/// Describes a collection: its fields and its five access rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub kind: CollectionKind,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(flatten)]
    pub rules: AccessRules,
}

impl Collection {
    /// Creates a base collection with every rule locked.
    pub fn base(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: CollectionKind::Base,
            fields: Vec::new(),
            rules: AccessRules::default(),
        }
    }

    /// Creates an auth collection with every rule locked.
    pub fn auth(name: &str) -> Self {
        Self {
            kind: CollectionKind::Auth,
            ..Self::base(name)
        }
    }

    /// Creates a view collection with every rule locked.
    pub fn view(name: &str) -> Self {
        Self {
            kind: CollectionKind::View,
            ..Self::base(name)
        }
    }

    /// Builder-style field append.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_list_rule(mut self, rule: Rule) -> Self {
        self.rules.list = rule;
        self
    }

    pub fn with_view_rule(mut self, rule: Rule) -> Self {
        self.rules.view = rule;
        self
    }

    pub fn with_create_rule(mut self, rule: Rule) -> Self {
        self.rules.create = rule;
        self
    }

    pub fn with_update_rule(mut self, rule: Rule) -> Self {
        self.rules.update = rule;
        self
    }

    pub fn with_delete_rule(mut self, rule: Rule) -> Self {
        self.rules.delete = rule;
        self
    }

    /// Sets all five rules at once.
    pub fn with_all_rules(mut self, rule: Rule) -> Self {
        self.rules = AccessRules::uniform(rule);
        self
    }

    pub fn is_auth(&self) -> bool {
        self.kind == CollectionKind::Auth
    }

    pub fn is_view(&self) -> bool {
        self.kind == CollectionKind::View
    }

    /// Looks up a schema field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the type a field path segment resolves to, including system
    /// and implicit auth fields. `None` means the name is unknown.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        if let Some(field) = self.field(name) {
            return Some(field.field_type);
        }
        match name {
            "id" | "collectionName" => Some(FieldType::Text),
            "created" | "updated" => Some(FieldType::Date),
            "email" if self.is_auth() => Some(FieldType::Text),
            "verified" if self.is_auth() => Some(FieldType::Bool),
            _ => None,
        }
    }

    /// True if the name is a system or implicit auth field.
    pub fn is_system_field(&self, name: &str) -> bool {
        SYSTEM_FIELDS.contains(&name) || (self.is_auth() && AUTH_FIELDS.contains(&name))
    }

    /// Names of fields hidden from non-superuser output.
    pub fn hidden_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.hidden).map(|f| f.name.as_str())
    }
}

/// A schema field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Hidden fields are stripped from API output for non-superusers.
    #[serde(default)]
    pub hidden: bool,
    /// Target collection. Only meaningful when the type is `Relation`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Maximum number of items. `None` or `1` means single-valued for
    /// relation and file fields; string sets are always multi-valued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_select: Option<usize>,
}

impl Field {
    fn simple(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            hidden: false,
            collection: None,
            max_select: None,
        }
    }

    /// Shorthand for a text field.
    pub fn text(name: &str) -> Self {
        Self::simple(name, FieldType::Text)
    }

    /// Shorthand for a numeric field.
    pub fn number(name: &str) -> Self {
        Self::simple(name, FieldType::Number)
    }

    /// Shorthand for a boolean field.
    pub fn bool(name: &str) -> Self {
        Self::simple(name, FieldType::Bool)
    }

    /// Shorthand for a date field.
    pub fn date(name: &str) -> Self {
        Self::simple(name, FieldType::Date)
    }

    /// Shorthand for a string-set field.
    pub fn tags(name: &str) -> Self {
        Self::simple(name, FieldType::Tags)
    }

    /// Shorthand for a single relation to `collection`.
    pub fn relation(name: &str, collection: &str) -> Self {
        Self {
            collection: Some(collection.into()),
            max_select: Some(1),
            ..Self::simple(name, FieldType::Relation)
        }
    }

    /// Shorthand for a multi relation to `collection`.
    pub fn relations(name: &str, collection: &str, max_select: usize) -> Self {
        Self {
            collection: Some(collection.into()),
            max_select: Some(max_select),
            ..Self::simple(name, FieldType::Relation)
        }
    }

    /// Shorthand for a file field holding up to `max_select` file names.
    pub fn file(name: &str, max_select: usize) -> Self {
        Self {
            max_select: Some(max_select),
            ..Self::simple(name, FieldType::File)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// True if the field stores a `List` value.
    pub fn is_multiple(&self) -> bool {
        match self.field_type {
            FieldType::Tags => true,
            FieldType::Relation | FieldType::File => self.max_select.unwrap_or(1) > 1,
            _ => false,
        }
    }
}

/// The data type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    Date,
    /// Set of strings.
    Tags,
    Relation,
    File,
}
