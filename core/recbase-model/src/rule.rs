//! Per-collection access rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single access rule.
///
/// Serialized as an optional string: `null` (or absent) is [`Rule::Locked`],
/// the empty string is [`Rule::Open`], anything else is a filter expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Rule {
    /// Superusers only.
    #[default]
    Locked,
    /// Unconditional pass.
    Open,
    /// Conditional pass; doubles as a row filter.
    Filter(String),
}

impl Rule {
    /// Shorthand for a filter rule.
    pub fn filter(expr: impl Into<String>) -> Self {
        Self::Filter(expr.into())
    }
}

impl From<Option<String>> for Rule {
    fn from(raw: Option<String>) -> Self {
        match raw {
            None => Self::Locked,
            Some(s) if s.trim().is_empty() => Self::Open,
            Some(s) => Self::Filter(s),
        }
    }
}

impl From<Rule> for Option<String> {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::Locked => None,
            Rule::Open => Some(String::new()),
            Rule::Filter(s) => Some(s),
        }
    }
}

/// The operation a rule guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOp {
    List,
    View,
    Create,
    Update,
    Delete,
}

impl AccessOp {
    pub const ALL: [AccessOp; 5] = [Self::List, Self::View, Self::Create, Self::Update, Self::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five rules of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRules {
    #[serde(default, rename = "list_rule")]
    pub list: Rule,
    #[serde(default, rename = "view_rule")]
    pub view: Rule,
    #[serde(default, rename = "create_rule")]
    pub create: Rule,
    #[serde(default, rename = "update_rule")]
    pub update: Rule,
    #[serde(default, rename = "delete_rule")]
    pub delete: Rule,
}

impl AccessRules {
    /// All five rules set to the same value.
    pub fn uniform(rule: Rule) -> Self {
        Self {
            list: rule.clone(),
            view: rule.clone(),
            create: rule.clone(),
            update: rule.clone(),
            delete: rule,
        }
    }

    /// Returns the rule guarding `op`.
    pub fn get(&self, op: AccessOp) -> &Rule {
        match op {
            AccessOp::List => &self.list,
            AccessOp::View => &self.view,
            AccessOp::Create => &self.create,
            AccessOp::Update => &self.update,
            AccessOp::Delete => &self.delete,
        }
    }
}
