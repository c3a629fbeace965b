//! Schema-checked filters.

use crate::ast::{Expr, Modifier, Operand, Source};
use crate::context::RequestContext;
use crate::error::{RuleError, RuleResult};
use crate::eval;
use crate::parser::parse;
use crate::predicate::Predicate;
use crate::resolve::{RecordResolver, SchemaLookup};
use recbase_model::{Collection, FieldType, Record};
use std::sync::Arc;

/// A filter expression parsed and checked against its collection's schema.
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    collection: String,
    expr: Expr,
}

impl Filter {
    /// Parses `source` and resolves every field path it references.
    pub fn compile(source: &str, collection: &Collection, schema: &dyn SchemaLookup) -> RuleResult<Self> {
        let expr = parse(source)?;
        for cmp in expr.comparisons() {
            check_operand(&cmp.left, collection, schema)?;
            check_operand(&cmp.right, collection, schema)?;
        }
        Ok(Self {
            source: source.to_string(),
            collection: collection.name.clone(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates the filter against a concrete record.
    pub fn matches(&self, record: &Record, ctx: &RequestContext, resolver: &dyn RecordResolver) -> bool {
        let collection = resolver.collection(&self.collection);
        eval::evaluate(&self.expr, Some(record), collection.as_deref(), ctx, resolver)
    }

    /// Partially evaluates the filter for `ctx`, leaving only the parts that
    /// depend on the row.
    pub fn predicate(&self, ctx: &RequestContext, resolver: &dyn RecordResolver) -> Predicate {
        Predicate::fold(&self.collection, &self.expr, ctx, resolver)
    }
}

/// Information about the field a path ends on.
struct FieldInfo {
    name: String,
    field_type: FieldType,
    multiple: bool,
}

fn check_operand(operand: &Operand, collection: &Collection, schema: &dyn SchemaLookup) -> RuleResult<()> {
    let Operand::Path {
        source,
        segments,
        modifier,
    } = operand
    else {
        return Ok(());
    };
    let path = segments.join(".");

    match source {
        Source::Record => {
            let info = resolve_segments(collection, segments, schema)?;
            check_modifier(*modifier, Some(&info), &path, false)
        }
        Source::Collection(name) => {
            let target = schema
                .collection(name)
                .ok_or_else(|| RuleError::UnknownCollection(name.clone()))?;
            let info = resolve_segments(&target, segments, schema)?;
            check_modifier(*modifier, Some(&info), &path, false)
        }
        Source::Body => {
            let info = if segments.len() > 1 {
                Some(resolve_segments(collection, segments, schema)?)
            } else {
                collection.field(&segments[0]).map(|f| FieldInfo {
                    name: f.name.clone(),
                    field_type: f.field_type,
                    multiple: f.is_multiple(),
                })
            };
            if *modifier == Some(Modifier::IsSet) && segments.len() > 1 {
                return Err(RuleError::InvalidModifier {
                    modifier: "isset",
                    path,
                    reason: "only top-level body fields can be checked",
                });
            }
            check_modifier(*modifier, info.as_ref(), &path, true)
        }
        Source::Auth => check_modifier(*modifier, None, &path, false),
    }
}

/// Walks a field path through relation fields, returning the final field.
fn resolve_segments(collection: &Collection, segments: &[String], schema: &dyn SchemaLookup) -> RuleResult<FieldInfo> {
    let mut current: Option<Arc<Collection>> = None;
    for (i, segment) in segments.iter().enumerate() {
        let coll: &Collection = current.as_deref().unwrap_or(collection);
        let field_type = coll.field_type(segment).ok_or_else(|| RuleError::UnknownField {
            collection: coll.name.clone(),
            field: segment.clone(),
        })?;
        let field = coll.field(segment);

        if i + 1 == segments.len() {
            return Ok(FieldInfo {
                name: segment.clone(),
                field_type,
                multiple: field.is_some_and(|f| f.is_multiple()),
            });
        }

        let target = field
            .filter(|f| f.field_type == FieldType::Relation)
            .and_then(|f| f.collection.clone())
            .ok_or_else(|| RuleError::NotARelation {
                field: segment.clone(),
            })?;
        let next = schema
            .collection(&target)
            .ok_or_else(|| RuleError::UnknownCollection(target.clone()))?;
        current = Some(next);
    }
    Err(RuleError::syntax(0, "empty field path"))
}

fn check_modifier(modifier: Option<Modifier>, info: Option<&FieldInfo>, path: &str, body: bool) -> RuleResult<()> {
    let Some(modifier) = modifier else {
        return Ok(());
    };
    match modifier {
        Modifier::IsSet | Modifier::Length => {
            if let Some(info) = info.filter(|i| i.field_type == FieldType::File) {
                return Err(RuleError::UnsupportedModifier {
                    modifier: modifier.as_str(),
                    field: info.name.clone(),
                });
            }
        }
        Modifier::Lower => {}
    }
    match modifier {
        Modifier::IsSet if !body => Err(RuleError::InvalidModifier {
            modifier: "isset",
            path: path.to_string(),
            reason: "only @request.body fields can be checked for presence",
        }),
        Modifier::Length if info.is_some_and(|i| !i.multiple) => Err(RuleError::InvalidModifier {
            modifier: "length",
            path: path.to_string(),
            reason: "field is not multi-valued",
        }),
        _ => Ok(()),
    }
}
