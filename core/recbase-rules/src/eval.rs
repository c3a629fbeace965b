//! Evaluation of a syntax tree against a record and a request context.
//!
//! Evaluation never fails: missing values compare as the zero value of the
//! other side and broken relation traversals make the comparison false.

use crate::ast::{Comparison, Expr, Modifier, OpKind, Operand, Operator, Resolved, Source};
use crate::context::RequestContext;
use crate::resolve::RecordResolver;
use recbase_model::{Collection, Field, FieldType, Record};
use recbase_types::{Timestamp, Value};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Rows of every `@collection` source an expression names.
pub(crate) struct JoinedRows {
    names: Vec<String>,
    rows: Vec<Vec<Option<Record>>>,
}

impl JoinedRows {
    /// Lists each joined collection once; an empty one binds a single
    /// missing row.
    pub fn fetch(expr: &Expr, resolver: &dyn RecordResolver) -> Self {
        let names = expr.joined_collections();
        let rows = names
            .iter()
            .map(|name| {
                let records = resolver.list_records(name);
                if records.is_empty() {
                    vec![None]
                } else {
                    records.into_iter().map(Some).collect()
                }
            })
            .collect();
        Self { names, rows }
    }
}

/// Evaluates `expr`, binding every `@collection` source to each combination
/// of its rows; the expression holds if any combination satisfies it.
pub(crate) fn evaluate(
    expr: &Expr,
    record: Option<&Record>,
    collection: Option<&Collection>,
    ctx: &RequestContext,
    resolver: &dyn RecordResolver,
) -> bool {
    let joined = JoinedRows::fetch(expr, resolver);
    evaluate_with(expr, &joined, record, collection, ctx, resolver)
}

/// [`evaluate`] with the joined rows already fetched.
pub(crate) fn evaluate_with(
    expr: &Expr,
    joined: &JoinedRows,
    record: Option<&Record>,
    collection: Option<&Collection>,
    ctx: &RequestContext,
    resolver: &dyn RecordResolver,
) -> bool {
    let mut bound = HashMap::new();
    evaluate_joined(expr, &joined.names, &joined.rows, 0, &mut bound, record, collection, ctx, resolver)
}

#[allow(clippy::too_many_arguments)]
fn evaluate_joined(
    expr: &Expr,
    names: &[String],
    rows: &[Vec<Option<Record>>],
    depth: usize,
    bound: &mut HashMap<String, Option<Record>>,
    record: Option<&Record>,
    collection: Option<&Collection>,
    ctx: &RequestContext,
    resolver: &dyn RecordResolver,
) -> bool {
    if depth == names.len() {
        let evaluator = Evaluator {
            record,
            collection,
            ctx,
            resolver,
            joins: bound,
        };
        return evaluator.eval(expr);
    }
    for row in &rows[depth] {
        bound.insert(names[depth].clone(), row.clone());
        if evaluate_joined(expr, names, rows, depth + 1, bound, record, collection, ctx, resolver) {
            return true;
        }
    }
    false
}

pub(crate) struct Evaluator<'a> {
    pub record: Option<&'a Record>,
    pub collection: Option<&'a Collection>,
    pub ctx: &'a RequestContext,
    pub resolver: &'a dyn RecordResolver,
    pub joins: &'a HashMap<String, Option<Record>>,
}

impl Evaluator<'_> {
    pub fn eval(&self, expr: &Expr) -> bool {
        match expr {
            Expr::And(a, b) => self.eval(a) && self.eval(b),
            Expr::Or(a, b) => self.eval(a) || self.eval(b),
            Expr::Cmp(cmp) => self.compare(cmp),
            Expr::Const(b) => *b,
        }
    }

    fn compare(&self, cmp: &Comparison) -> bool {
        let left = self.resolve(&cmp.left);
        let right = self.resolve(&cmp.right);
        compare_resolved(&left, cmp.op, &right)
    }

    pub fn resolve(&self, operand: &Operand) -> Resolved {
        match operand {
            Operand::Literal(v) => Resolved::Single(v.clone()),
            Operand::Bound(r) => r.clone(),
            Operand::Now => Resolved::Single(Value::Date(Timestamp::now())),
            Operand::Method => Resolved::Single(Value::text(self.ctx.method())),
            Operand::Context => Resolved::Single(Value::text(self.ctx.kind().as_str())),
            Operand::Query(name) => Resolved::Single(self.ctx.query(name).map(Value::text).unwrap_or_default()),
            Operand::Header(name) => Resolved::Single(self.ctx.header(name).map(Value::text).unwrap_or_default()),
            Operand::Path {
                source,
                segments,
                modifier,
            } => {
                if *modifier == Some(Modifier::IsSet) {
                    return Resolved::Single(Value::Bool(self.ctx.body().contains_key(&segments[0])));
                }
                let resolved = match source {
                    Source::Record => match self.record {
                        Some(record) => self.resolve_record_path(record, self.collection, segments),
                        None => Resolved::Unresolved,
                    },
                    Source::Auth => self.resolve_auth(segments),
                    Source::Body => self.resolve_body(segments),
                    Source::Collection(name) => match self.joins.get(name) {
                        Some(Some(row)) => {
                            let coll = self.resolver.collection(name);
                            self.resolve_record_path(row, coll.as_deref(), segments)
                        }
                        Some(None) if segments.len() == 1 => Resolved::Single(Value::Null),
                        _ => Resolved::Unresolved,
                    },
                };
                apply_modifier(resolved, *modifier)
            }
        }
    }

    fn resolve_auth(&self, segments: &[String]) -> Resolved {
        match self.ctx.auth() {
            None if segments.len() == 1 => Resolved::Single(Value::Null),
            None => Resolved::Unresolved,
            Some(identity) => {
                let coll = self.resolver.collection(identity.collection());
                self.resolve_record_path(identity.record(), coll.as_deref(), segments)
            }
        }
    }

    fn resolve_body(&self, segments: &[String]) -> Resolved {
        let json = self.ctx.body().get(&segments[0]);
        if segments.len() == 1 {
            return match json {
                None => Resolved::Single(Value::Null),
                Some(Json::Array(items)) => Resolved::Many(items.iter().map(Value::from_json).collect()),
                Some(other) => Resolved::Single(Value::from_json(other)),
            };
        }
        let Some(field) = self.collection.and_then(|c| c.field(&segments[0])) else {
            return Resolved::Unresolved;
        };
        let Some(target) = field.collection.as_deref() else {
            return Resolved::Unresolved;
        };
        let ids = json.map(Value::from_json).unwrap_or_default();
        self.resolve_related(target, &ids.ids(), &segments[1..], field.is_multiple())
    }

    fn resolve_record_path(&self, record: &Record, collection: Option<&Collection>, segments: &[String]) -> Resolved {
        let name = &segments[0];
        let value = record.get(name);
        let field = collection.and_then(|c| c.field(name));
        if segments.len() == 1 {
            return match value {
                Value::List(items) => Resolved::Many(items.into_iter().map(Value::Text).collect()),
                Value::Null if field.is_some_and(Field::is_multiple) => Resolved::Many(Vec::new()),
                Value::Null => Resolved::Single(collection.and_then(|c| c.field_type(name)).map_or(Value::Null, zero_of_field)),
                other => Resolved::Single(other),
            };
        }
        let Some(field) = field else {
            return Resolved::Unresolved;
        };
        let Some(target) = field.collection.as_deref() else {
            return Resolved::Unresolved;
        };
        self.resolve_related(target, &value.ids(), &segments[1..], field.is_multiple())
    }

    fn resolve_related(&self, target: &str, ids: &[&str], rest: &[String], multiple: bool) -> Resolved {
        if ids.is_empty() {
            return Resolved::Unresolved;
        }
        let coll = self.resolver.collection(target);
        let mut results: Vec<Resolved> = ids
            .iter()
            .filter_map(|id| self.resolver.find_record(target, id))
            .map(|related| self.resolve_record_path(&related, coll.as_deref(), rest))
            .filter(|r| *r != Resolved::Unresolved)
            .collect();

        if results.is_empty() {
            return Resolved::Unresolved;
        }
        if !multiple && results.len() == 1 {
            return results.remove(0);
        }
        let mut flat = Vec::new();
        for r in results {
            match r {
                Resolved::Single(v) => flat.push(v),
                Resolved::Many(vs) => flat.extend(vs),
                Resolved::Unresolved => {}
            }
        }
        Resolved::Many(flat)
    }
}

fn apply_modifier(resolved: Resolved, modifier: Option<Modifier>) -> Resolved {
    match (modifier, resolved) {
        (Some(Modifier::Length), Resolved::Single(v)) => Resolved::Single(Value::Number(v.cardinality() as f64)),
        (Some(Modifier::Length), Resolved::Many(vs)) => Resolved::Single(Value::Number(vs.len() as f64)),
        (Some(Modifier::Lower), Resolved::Single(v)) => Resolved::Single(lower(v)),
        (Some(Modifier::Lower), Resolved::Many(vs)) => Resolved::Many(vs.into_iter().map(lower).collect()),
        (_, resolved) => resolved,
    }
}

fn lower(v: Value) -> Value {
    match v {
        Value::Text(s) => Value::Text(s.to_ascii_lowercase()),
        other => other,
    }
}

/// Applies an operator to two resolved operands.
///
/// Existential operators hold if any pair of elements matches; plain
/// operators on set-valued operands require every element to match, with an
/// empty set standing in as a single null.
pub(crate) fn compare_resolved(left: &Resolved, op: Operator, right: &Resolved) -> bool {
    let (Some(lv), Some(rv)) = (elements(left), elements(right)) else {
        return false;
    };
    if op.any {
        return lv.iter().any(|a| rv.iter().any(|b| compare_scalar(a, op.kind, b)));
    }
    let null = [Value::Null];
    let lv: &[Value] = if lv.is_empty() { &null } else { lv };
    let rv: &[Value] = if rv.is_empty() { &null } else { rv };
    lv.iter().all(|a| rv.iter().all(|b| compare_scalar(a, op.kind, b)))
}

fn elements(r: &Resolved) -> Option<&[Value]> {
    match r {
        Resolved::Single(v) => Some(std::slice::from_ref(v)),
        Resolved::Many(vs) => Some(vs),
        Resolved::Unresolved => None,
    }
}

pub(crate) fn compare_scalar(a: &Value, kind: OpKind, b: &Value) -> bool {
    match kind {
        OpKind::Eq => order(a, b) == Some(Ordering::Equal),
        OpKind::Neq => order(a, b) != Some(Ordering::Equal),
        OpKind::Gt => order(a, b) == Some(Ordering::Greater),
        OpKind::Gte => matches!(order(a, b), Some(Ordering::Greater | Ordering::Equal)),
        OpKind::Lt => order(a, b) == Some(Ordering::Less),
        OpKind::Lte => matches!(order(a, b), Some(Ordering::Less | Ordering::Equal)),
        OpKind::Like => like(a, b),
        OpKind::NotLike => !like(a, b),
    }
}

/// Zero value of a type, used when the other side of a comparison is null.
fn zero_of(v: &Value) -> Option<Value> {
    match v {
        Value::Null => Some(Value::Null),
        Value::Bool(_) => Some(Value::Bool(false)),
        Value::Number(_) => Some(Value::Number(0.0)),
        Value::Text(_) | Value::List(_) => Some(Value::text("")),
        Value::Date(_) => None,
    }
}

/// What an unset column holds as far as comparisons go; matches the
/// `COALESCE` defaults of the SQL rendering.
fn zero_of_field(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Number => Value::Number(0.0),
        FieldType::Bool => Value::Bool(false),
        FieldType::Date => Value::text(""),
        _ => Value::Null,
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "1" => Some(true),
        "false" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Blank text reads as zero; infinities and NaN do not parse.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Total-ish ordering with the coercions of the filter language.
/// `None` means the values are incomparable.
pub(crate) fn order(a: &Value, b: &Value) -> Option<Ordering> {
    use Value::*;
    match (a, b) {
        (Null, Null) => Some(Ordering::Equal),
        (Null, other) => order(&zero_of(other)?, other),
        (other, Null) => order(other, &zero_of(other)?),
        (Number(x), Number(y)) => x.partial_cmp(y),
        (Text(x), Text(y)) => Some(x.cmp(y)),
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        (Date(x), Date(y)) => Some(x.cmp(y)),
        (Date(d), Text(t)) => match Timestamp::parse(t) {
            Ok(parsed) => Some(d.cmp(&parsed)),
            Err(_) => Some(d.to_string().as_str().cmp(t.as_str())),
        },
        // Numbers and booleans sort before text that does not convert.
        (Number(n), Text(t)) => match parse_number(t) {
            Some(m) => n.partial_cmp(&m),
            None => Some(Ordering::Less),
        },
        (Bool(x), Text(t)) => match parse_bool(t) {
            Some(y) => Some(x.cmp(&y)),
            None => Some(Ordering::Less),
        },
        (Bool(x), Number(n)) => (if *x { 1.0 } else { 0.0 }).partial_cmp(n),
        (Date(d), Number(n)) => (d.as_millis() as f64).partial_cmp(n),
        (Date(_), Bool(_)) | (Bool(_), Date(_)) => None,
        (List(_), _) | (_, List(_)) => Some(a.to_string().cmp(&b.to_string())),
        (Text(_), Date(_) | Number(_) | Bool(_)) | (Number(_), Bool(_) | Date(_)) => {
            order(b, a).map(Ordering::reverse)
        }
    }
}

/// ASCII case-insensitive containment; `%` in the pattern is a wildcard
/// and anchors the match at both ends.
fn like(value: &Value, pattern: &Value) -> bool {
    let haystack = value.to_string().to_ascii_lowercase();
    let pattern = pattern.to_string().to_ascii_lowercase();
    if pattern.contains('%') {
        like_match(&haystack.chars().collect::<Vec<_>>(), &pattern.chars().collect::<Vec<_>>())
    } else {
        haystack.contains(&pattern)
    }
}

fn like_match(s: &[char], p: &[char]) -> bool {
    // dp[j] = pattern[..j] matches the current prefix of s
    let mut dp = vec![false; p.len() + 1];
    dp[0] = true;
    for j in 1..=p.len() {
        dp[j] = dp[j - 1] && p[j - 1] == '%';
    }
    for &c in s {
        let mut prev_diag = dp[0];
        dp[0] = false;
        for j in 1..=p.len() {
            let above = dp[j];
            dp[j] = if p[j - 1] == '%' {
                dp[j - 1] || above
            } else {
                prev_diag && p[j - 1] == c
            };
            prev_diag = above;
        }
    }
    dp[p.len()]
}
