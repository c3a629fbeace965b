//! Rule enforcement: maps a collection's access rules to decisions.

use crate::cache::RuleCache;
use crate::compile::Filter;
use crate::context::RequestContext;
use crate::error::RuleResult;
use crate::predicate::Predicate;
use crate::resolve::{RecordResolver, SchemaLookup};
use recbase_model::{AccessOp, Collection, Record, Rule};
use std::sync::Arc;
use tracing::debug;

/// Outcome of checking one record against one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// The rule evaluated to false.
    Denied,
    /// The rule is locked and the caller is not a superuser.
    Locked,
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// How a list operation may read a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ListAccess {
    /// Every row is visible.
    All,
    /// Only rows matching the predicate are visible.
    Filtered(Predicate),
    Locked,
}

/// Evaluates collection access rules with a shared compile cache.
#[derive(Debug, Default)]
pub struct RuleEngine {
    cache: RuleCache,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    pub fn compile(&self, source: &str, collection: &Collection, schema: &dyn SchemaLookup) -> RuleResult<Arc<Filter>> {
        self.cache.get_or_compile(source, collection, schema)
    }

    /// Checks `op` on `record`. Superusers bypass every rule.
    pub fn check(
        &self,
        collection: &Collection,
        op: AccessOp,
        record: &Record,
        ctx: &RequestContext,
        resolver: &dyn RecordResolver,
    ) -> RuleResult<Access> {
        let access = self.check_rule(collection.rules.get(op), collection, record, ctx, resolver)?;
        if access != Access::Granted {
            debug!(
                collection = %collection.name,
                op = %op,
                record = %record.id(),
                ?access,
                "rule check did not pass"
            );
        }
        Ok(access)
    }

    /// Checks an arbitrary rule against `record`.
    pub fn check_rule(
        &self,
        rule: &Rule,
        collection: &Collection,
        record: &Record,
        ctx: &RequestContext,
        resolver: &dyn RecordResolver,
    ) -> RuleResult<Access> {
        if ctx.is_superuser() {
            return Ok(Access::Granted);
        }
        match rule {
            Rule::Locked => Ok(Access::Locked),
            Rule::Open => Ok(Access::Granted),
            Rule::Filter(source) => {
                let filter = self.compile(source, collection, resolver)?;
                Ok(if filter.matches(record, ctx, resolver) {
                    Access::Granted
                } else {
                    Access::Denied
                })
            }
        }
    }

    /// Resolves the list rule into a row predicate for `ctx`.
    pub fn list_access(
        &self,
        collection: &Collection,
        ctx: &RequestContext,
        resolver: &dyn RecordResolver,
    ) -> RuleResult<ListAccess> {
        if ctx.is_superuser() {
            return Ok(ListAccess::All);
        }
        match &collection.rules.list {
            Rule::Locked => Ok(ListAccess::Locked),
            Rule::Open => Ok(ListAccess::All),
            Rule::Filter(source) => {
                let predicate = self.compile(source, collection, resolver)?.predicate(ctx, resolver);
                Ok(match predicate.as_const() {
                    Some(true) => ListAccess::All,
                    _ => ListAccess::Filtered(predicate),
                })
            }
        }
    }

    /// Compiles every filter rule of `collection`, reporting the first error.
    pub fn validate_rules(&self, collection: &Collection, schema: &dyn SchemaLookup) -> RuleResult<()> {
        for op in AccessOp::ALL {
            if let Rule::Filter(source) = collection.rules.get(op) {
                self.compile(source, collection, schema)?;
            }
        }
        Ok(())
    }
}
