//! Row predicates: filters partially evaluated for one request.
//!
//! Folding binds every operand that does not depend on the row (auth, body,
//! query, headers, literals, `@now`) and collapses comparisons whose sides
//! are both bound. What remains can be checked per row or rendered as a
//! parameterized SQL `WHERE` fragment.

use crate::ast::{Comparison, Expr, Modifier, OpKind, Operand, Resolved, Source};
use crate::context::RequestContext;
use crate::error::{RuleError, RuleResult};
use crate::eval::{compare_resolved, evaluate, evaluate_with, parse_bool, parse_number, Evaluator, JoinedRows};
use crate::resolve::{RecordResolver, SchemaLookup};
use recbase_model::{Collection, Field, FieldType, Record};
use recbase_types::{Timestamp, Value};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

/// A filter with all request-side operands resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    collection: String,
    expr: Expr,
}

/// A `WHERE` fragment with `?N` placeholders and their values.
///
/// Columns are qualified by the quoted collection name, so the fragment
/// expects the collection's table to be referenced under its own name.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub sql: String,
    pub params: Vec<Json>,
}

impl Predicate {
    pub(crate) fn fold(collection: &str, expr: &Expr, ctx: &RequestContext, resolver: &dyn RecordResolver) -> Self {
        let joins = HashMap::new();
        let coll = resolver.collection(collection);
        let evaluator = Evaluator {
            record: None,
            collection: coll.as_deref(),
            ctx,
            resolver,
            joins: &joins,
        };
        Self {
            collection: collection.to_string(),
            expr: fold_expr(expr, &evaluator),
        }
    }

    /// A predicate that accepts or rejects every row.
    pub fn constant(collection: &str, value: bool) -> Self {
        Self {
            collection: collection.to_string(),
            expr: Expr::Const(value),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// `Some` when the predicate no longer depends on the row.
    pub fn as_const(&self) -> Option<bool> {
        match self.expr {
            Expr::Const(b) => Some(b),
            _ => None,
        }
    }

    pub fn matches(&self, record: &Record, resolver: &dyn RecordResolver) -> bool {
        if let Some(b) = self.as_const() {
            return b;
        }
        let collection = resolver.collection(&self.collection);
        evaluate(
            &self.expr,
            Some(record),
            collection.as_deref(),
            &RequestContext::anonymous(),
            resolver,
        )
    }

    /// Keeps the records the predicate accepts. `@collection` sources are
    /// listed once for the whole batch rather than once per record.
    pub fn filter_records(&self, records: Vec<Record>, resolver: &dyn RecordResolver) -> Vec<Record> {
        match self.as_const() {
            Some(true) => return records,
            Some(false) => return Vec::new(),
            None => {}
        }
        let collection = resolver.collection(&self.collection);
        let joined = JoinedRows::fetch(&self.expr, resolver);
        let ctx = RequestContext::anonymous();
        records
            .into_iter()
            .filter(|record| evaluate_with(&self.expr, &joined, Some(record), collection.as_deref(), &ctx, resolver))
            .collect()
    }

    /// Renders the predicate for an SQLite-style engine with JSON1.
    pub fn to_sql(&self, schema: &dyn SchemaLookup) -> RuleResult<SqlFilter> {
        let root = schema
            .collection(&self.collection)
            .ok_or_else(|| RuleError::UnknownCollection(self.collection.clone()))?;
        let mut writer = SqlWriter {
            schema,
            root,
            params: Vec::new(),
            aliases: 0,
        };
        let mut sql = writer.expr(&self.expr)?;
        for name in self.expr.joined_collections().iter().rev() {
            sql = format!(
                "EXISTS (SELECT 1 FROM (SELECT 1) AS \"__dual\" LEFT JOIN {} AS {} ON 1 = 1 WHERE {sql})",
                quote(name),
                join_alias(name)
            );
        }
        Ok(SqlFilter {
            sql,
            params: writer.params,
        })
    }
}

fn fold_expr(expr: &Expr, ev: &Evaluator<'_>) -> Expr {
    match expr {
        Expr::And(a, b) => match (fold_expr(a, ev), fold_expr(b, ev)) {
            (Expr::Const(false), _) | (_, Expr::Const(false)) => Expr::Const(false),
            (Expr::Const(true), other) | (other, Expr::Const(true)) => other,
            (a, b) => Expr::And(Box::new(a), Box::new(b)),
        },
        Expr::Or(a, b) => match (fold_expr(a, ev), fold_expr(b, ev)) {
            (Expr::Const(true), _) | (_, Expr::Const(true)) => Expr::Const(true),
            (Expr::Const(false), other) | (other, Expr::Const(false)) => other,
            (a, b) => Expr::Or(Box::new(a), Box::new(b)),
        },
        Expr::Cmp(cmp) => fold_comparison(cmp, ev),
        Expr::Const(b) => Expr::Const(*b),
    }
}

fn fold_comparison(cmp: &Comparison, ev: &Evaluator<'_>) -> Expr {
    if !cmp.left.depends_on_record() && !cmp.right.depends_on_record() {
        let left = ev.resolve(&cmp.left);
        let right = ev.resolve(&cmp.right);
        return Expr::Const(compare_resolved(&left, cmp.op, &right));
    }
    let bind = |operand: &Operand| {
        if operand.depends_on_record() {
            operand.clone()
        } else {
            Operand::Bound(ev.resolve(operand))
        }
    };
    let left = bind(&cmp.left);
    let right = bind(&cmp.right);
    if [&left, &right]
        .iter()
        .any(|o| matches!(o, Operand::Bound(Resolved::Unresolved)))
    {
        return Expr::Const(false);
    }
    Expr::Cmp(Comparison {
        left,
        op: cmp.op,
        right,
    })
}

// ── SQL rendering ────────────────────────────────────────────────

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn join_alias(collection: &str) -> String {
    quote(&format!("__c_{collection}"))
}

fn zero_sql(field_type: Option<FieldType>) -> &'static str {
    match field_type {
        Some(FieldType::Number | FieldType::Bool) => "0",
        _ => "''",
    }
}

fn op_sql(kind: OpKind) -> &'static str {
    match kind {
        OpKind::Eq => "=",
        OpKind::Neq => "!=",
        OpKind::Gt => ">",
        OpKind::Gte => ">=",
        OpKind::Lt => "<",
        OpKind::Lte => "<=",
        OpKind::Like => "LIKE",
        OpKind::NotLike => "NOT LIKE",
    }
}

/// How one side of a comparison is written out.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bind {
    /// Compared against a column of the given type, if the other side is one.
    Compare(Option<FieldType>),
    /// Left side of `~`/`!~`: the text searched.
    Haystack,
    /// Right side of `~`/`!~`: the text searched for.
    Pattern,
}

impl Bind {
    fn is_like(self) -> bool {
        matches!(self, Self::Haystack | Self::Pattern)
    }

    /// The value a missing operand stands in for.
    fn zero(self, field_type: Option<FieldType>) -> &'static str {
        match self {
            Self::Compare(_) => zero_sql(field_type),
            Self::Haystack => "''",
            Self::Pattern => "'%'",
        }
    }
}

enum SqlOperand {
    Scalar {
        sql: String,
        field_type: Option<FieldType>,
    },
    Joined {
        sources: Vec<String>,
        conditions: Vec<String>,
        value: String,
        field_type: Option<FieldType>,
        traversal: bool,
    },
    /// Bound null; rendered as the zero value of the other side.
    Null,
    /// Can never match.
    Never,
}

impl SqlOperand {
    fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Scalar { field_type, .. } | Self::Joined { field_type, .. } => *field_type,
            Self::Null | Self::Never => None,
        }
    }
}

struct SqlWriter<'a> {
    schema: &'a dyn SchemaLookup,
    root: Arc<Collection>,
    params: Vec<Json>,
    aliases: usize,
}

impl SqlWriter<'_> {
    fn param(&mut self, value: Json) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn alias(&mut self, prefix: &str) -> String {
        self.aliases += 1;
        quote(&format!("{prefix}{}", self.aliases))
    }

    fn expr(&mut self, expr: &Expr) -> RuleResult<String> {
        Ok(match expr {
            Expr::And(a, b) => format!("({} AND {})", self.expr(a)?, self.expr(b)?),
            Expr::Or(a, b) => format!("({} OR {})", self.expr(a)?, self.expr(b)?),
            Expr::Const(true) => "1 = 1".to_string(),
            Expr::Const(false) => "1 = 0".to_string(),
            Expr::Cmp(cmp) => self.comparison(cmp)?,
        })
    }

    fn comparison(&mut self, cmp: &Comparison) -> RuleResult<String> {
        let binds = if matches!(cmp.op.kind, OpKind::Like | OpKind::NotLike) {
            [Bind::Haystack, Bind::Pattern]
        } else {
            [
                Bind::Compare(self.column_type(&cmp.right)),
                Bind::Compare(self.column_type(&cmp.left)),
            ]
        };
        let op = op_sql(cmp.op.kind);
        let render = |a: &str, b: &str| {
            if binds[1].is_like() {
                format!("{a} {op} {b} ESCAPE '\\'")
            } else {
                format!("{a} {op} {b}")
            }
        };

        let left = self.operand(&cmp.left, cmp.op.any, binds[0])?;
        let right = self.operand(&cmp.right, cmp.op.any, binds[1])?;
        let (left, right) = match (left, right) {
            (SqlOperand::Never, _) | (_, SqlOperand::Never) => return Ok("1 = 0".to_string()),
            (SqlOperand::Null, SqlOperand::Null) => return Ok(render(binds[0].zero(None), binds[1].zero(None))),
            (SqlOperand::Null, other) => (zero_operand(binds[0], other.field_type()), other),
            (other, SqlOperand::Null) => {
                let zero = zero_operand(binds[1], other.field_type());
                (other, zero)
            }
            pair => pair,
        };

        let mut sources = Vec::new();
        let mut conditions = Vec::new();
        let mut traversal = false;
        let mut values = Vec::with_capacity(2);
        let mut zeros = Vec::with_capacity(2);
        for (side, bind) in [left, right].into_iter().zip(binds) {
            match side {
                SqlOperand::Scalar { sql, .. } => {
                    zeros.push(sql.clone());
                    values.push(sql);
                }
                SqlOperand::Joined {
                    sources: s,
                    conditions: c,
                    value,
                    field_type,
                    traversal: t,
                } => {
                    sources.extend(s);
                    conditions.extend(c);
                    traversal |= t;
                    zeros.push(bind.zero(field_type).to_string());
                    values.push(value);
                }
                SqlOperand::Null | SqlOperand::Never => {}
            }
        }
        let test = render(&values[0], &values[1]);
        if sources.is_empty() {
            return Ok(test);
        }

        let from = sources.join(", ");
        let select = |extra: Option<&str>| {
            let mut conds: Vec<&str> = conditions.iter().map(String::as_str).collect();
            conds.extend(extra);
            if conds.is_empty() {
                format!("SELECT 1 FROM {from}")
            } else {
                format!("SELECT 1 FROM {from} WHERE {}", conds.join(" AND "))
            }
        };
        if cmp.op.any {
            return Ok(format!("EXISTS ({})", select(Some(test.as_str()))));
        }
        let negated = format!("NOT ({test})");
        let every = format!("NOT EXISTS ({})", select(Some(negated.as_str())));
        let some = format!("EXISTS ({})", select(None));
        if traversal {
            Ok(format!("({some} AND {every})"))
        } else {
            let fallback = render(&zeros[0], &zeros[1]);
            Ok(format!("CASE WHEN {some} THEN {every} ELSE {fallback} END"))
        }
    }

    /// Type of the column a path operand reads, or `None` for anything else.
    fn column_type(&self, operand: &Operand) -> Option<FieldType> {
        let Operand::Path {
            source,
            segments,
            modifier,
        } = operand
        else {
            return None;
        };
        let mut coll = match source {
            Source::Record => self.root.clone(),
            Source::Collection(name) => self.schema.collection(name)?,
            _ => return None,
        };
        let (leaf, relations) = segments.split_last()?;
        for segment in relations {
            let target = coll.field(segment)?.collection.clone()?;
            coll = self.schema.collection(&target)?;
        }
        let multiple = coll.field(leaf).is_some_and(Field::is_multiple);
        match modifier {
            Some(Modifier::Length) if multiple => Some(FieldType::Number),
            _ if multiple || leaf == "collectionName" => Some(FieldType::Text),
            _ => coll.field_type(leaf),
        }
    }

    fn operand(&mut self, operand: &Operand, any: bool, bind: Bind) -> RuleResult<SqlOperand> {
        match operand {
            Operand::Bound(resolved) => Ok(self.bound(resolved, any, bind)),
            Operand::Literal(value) => Ok(self.bound(&Resolved::Single(value.clone()), any, bind)),
            Operand::Path {
                source: Source::Record,
                segments,
                modifier,
            } => {
                let root = self.root.clone();
                let alias = quote(&root.name);
                self.path(alias, root, segments, *modifier, bind)
            }
            Operand::Path {
                source: Source::Collection(name),
                segments,
                modifier,
            } => {
                let coll = self
                    .schema
                    .collection(name)
                    .ok_or_else(|| RuleError::UnknownCollection(name.clone()))?;
                self.path(join_alias(name), coll, segments, *modifier, bind)
            }
            _ => Ok(SqlOperand::Never),
        }
    }

    fn bound(&mut self, resolved: &Resolved, any: bool, bind: Bind) -> SqlOperand {
        match resolved {
            Resolved::Unresolved => SqlOperand::Never,
            Resolved::Single(Value::Null) => SqlOperand::Null,
            Resolved::Single(value) => SqlOperand::Scalar {
                sql: self.param(param_value(value, bind)),
                field_type: value_type(value),
            },
            Resolved::Many(values) if values.is_empty() => {
                if any {
                    SqlOperand::Never
                } else {
                    SqlOperand::Null
                }
            }
            Resolved::Many(values) => {
                let array = Json::Array(values.iter().map(|v| param_value(v, bind)).collect());
                let param = self.param(array);
                let each = self.alias("__j");
                SqlOperand::Joined {
                    sources: vec![format!("json_each({param}) AS {each}")],
                    conditions: Vec::new(),
                    value: format!("{each}.value"),
                    field_type: values.first().and_then(value_type),
                    traversal: false,
                }
            }
        }
    }

    fn path(
        &mut self,
        mut alias: String,
        mut coll: Arc<Collection>,
        segments: &[String],
        modifier: Option<Modifier>,
        bind: Bind,
    ) -> RuleResult<SqlOperand> {
        let Some((leaf, relations)) = segments.split_last() else {
            return Ok(SqlOperand::Never);
        };
        let mut sources = Vec::new();
        let mut conditions = Vec::new();
        for segment in relations {
            let field = coll
                .field(segment)
                .filter(|f| f.field_type == FieldType::Relation)
                .ok_or_else(|| RuleError::NotARelation {
                    field: segment.clone(),
                })?;
            let target_name = field.collection.clone().ok_or_else(|| RuleError::NotARelation {
                field: segment.clone(),
            })?;
            let target = self
                .schema
                .collection(&target_name)
                .ok_or_else(|| RuleError::UnknownCollection(target_name.clone()))?;
            let column = format!("{alias}.{}", quote(segment));
            let next = self.alias("__r");
            if field.is_multiple() {
                let each = self.alias("__j");
                sources.push(format!("json_each(COALESCE({column}, '[]')) AS {each}"));
                sources.push(format!("{} AS {next}", quote(&target_name)));
                conditions.push(format!("{next}.\"id\" = {each}.value"));
            } else {
                sources.push(format!("{} AS {next}", quote(&target_name)));
                conditions.push(format!("{next}.\"id\" = {column}"));
            }
            alias = next;
            coll = target;
        }

        let field_type = coll.field_type(leaf).ok_or_else(|| RuleError::UnknownField {
            collection: coll.name.clone(),
            field: leaf.clone(),
        })?;
        let multiple = coll.field(leaf).is_some_and(Field::is_multiple);
        let column = format!("{alias}.{}", quote(leaf));
        let traversal = !relations.is_empty();

        let (mut value, value_type) = if leaf == "collectionName" {
            (self.param(Json::String(coll.name.clone())), Some(FieldType::Text))
        } else if multiple && modifier == Some(Modifier::Length) {
            (format!("json_array_length(COALESCE({column}, '[]'))"), Some(FieldType::Number))
        } else if multiple {
            let each = self.alias("__j");
            sources.push(format!("json_each(COALESCE({column}, '[]')) AS {each}"));
            (format!("{each}.value"), Some(FieldType::Text))
        } else if bind.is_like() {
            (text_sql(&column, field_type), Some(field_type))
        } else {
            let zero = zero_sql(Some(field_type));
            (format!("COALESCE({column}, {zero})"), Some(field_type))
        };
        if modifier == Some(Modifier::Lower) {
            value = format!("LOWER({value})");
        }
        if bind == Bind::Pattern {
            value = pattern_sql(&value);
        }

        if sources.is_empty() {
            Ok(SqlOperand::Scalar {
                sql: value,
                field_type: value_type,
            })
        } else {
            Ok(SqlOperand::Joined {
                sources,
                conditions,
                value,
                field_type: value_type,
                traversal,
            })
        }
    }
}

fn zero_operand(bind: Bind, field_type: Option<FieldType>) -> SqlOperand {
    SqlOperand::Scalar {
        sql: bind.zero(field_type).to_string(),
        field_type,
    }
}

/// A column rendered the way [`Value`]'s `Display` writes it, with null
/// standing in as the type's zero value.
fn text_sql(column: &str, field_type: FieldType) -> String {
    match field_type {
        FieldType::Bool => format!("CASE WHEN {column} = 1 THEN 'true' ELSE 'false' END"),
        FieldType::Number => format!(
            "COALESCE(CASE WHEN {column} = CAST({column} AS INTEGER) \
             THEN CAST(CAST({column} AS INTEGER) AS TEXT) ELSE CAST({column} AS TEXT) END, '0')"
        ),
        _ => format!("COALESCE({column}, '')"),
    }
}

/// Turns a text expression into a `LIKE ... ESCAPE '\'` pattern in which
/// `_` and `\` match themselves. Without a `%` it matches anywhere.
fn pattern_sql(value: &str) -> String {
    let escaped = format!("REPLACE(REPLACE({value}, '\\', '\\\\'), '_', '\\_')");
    format!("CASE WHEN INSTR({value}, '%') > 0 THEN {escaped} ELSE '%' || {escaped} || '%' END")
}

fn like_pattern(pattern: &str) -> String {
    let escaped = pattern.replace('\\', "\\\\").replace('_', "\\_");
    if pattern.contains('%') {
        escaped
    } else {
        format!("%{escaped}%")
    }
}

fn value_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::Number(_) => Some(FieldType::Number),
        Value::Bool(_) => Some(FieldType::Bool),
        Value::Date(_) => Some(FieldType::Date),
        Value::Text(_) | Value::List(_) => Some(FieldType::Text),
        Value::Null => None,
    }
}

fn param_value(value: &Value, bind: Bind) -> Json {
    match (bind, value) {
        (Bind::Pattern, v) => Json::String(like_pattern(&v.to_string())),
        (Bind::Haystack, v) => Json::String(v.to_string()),
        (Bind::Compare(target), Value::Text(s)) => coerce_text(s, target),
        (_, Value::Bool(b)) => Json::from(u8::from(*b)),
        (_, Value::List(_) | Value::Date(_)) => Json::String(value.to_string()),
        (_, other) => other.to_json(),
    }
}

/// Converts text compared against a typed column into the column's storage
/// form, so SQLite orders it the way row evaluation does. Text that does
/// not convert is left as is.
fn coerce_text(text: &str, target: Option<FieldType>) -> Json {
    match target {
        Some(FieldType::Date) => match Timestamp::parse(text) {
            Ok(ts) => Json::String(ts.to_string()),
            Err(_) => Json::String(text.to_string()),
        },
        Some(FieldType::Number) => match parse_number(text) {
            Some(n) => Json::from(n),
            None => Json::String(text.to_string()),
        },
        Some(FieldType::Bool) => match parse_bool(text) {
            Some(b) => Json::from(u8::from(b)),
            None => Json::String(text.to_string()),
        },
        _ => Json::String(text.to_string()),
    }
}
