//! Syntax tree of a filter expression.

use recbase_types::Value;
use std::fmt;

/// A boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(Comparison),
    /// Result of constant folding; never produced by the parser.
    Const(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Operand,
    pub op: Operator,
    pub right: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

/// A comparison operator; `any` marks the existential `?` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub kind: OpKind,
    pub any: bool,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any {
            f.write_str("?")?;
        }
        f.write_str(match self.kind {
            OpKind::Eq => "=",
            OpKind::Neq => "!=",
            OpKind::Gt => ">",
            OpKind::Gte => ">=",
            OpKind::Lt => "<",
            OpKind::Lte => "<=",
            OpKind::Like => "~",
            OpKind::NotLike => "!~",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    IsSet,
    Length,
    Lower,
}

impl Modifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsSet => "isset",
            Self::Length => "length",
            Self::Lower => "lower",
        }
    }
}

/// Where a field path starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The record under evaluation.
    Record,
    /// `@request.auth.*`
    Auth,
    /// `@request.body.*`
    Body,
    /// `@collection.<name>.*`
    Collection(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path {
        source: Source,
        segments: Vec<String>,
        modifier: Option<Modifier>,
    },
    /// `@request.query.<name>`
    Query(String),
    /// `@request.headers.<name>`
    Header(String),
    /// `@request.method`
    Method,
    /// `@request.context`
    Context,
    /// `@now`
    Now,
    /// A request-side operand already resolved during partial evaluation.
    Bound(Resolved),
}

impl Operand {
    /// True if the operand's value depends on the record being evaluated.
    pub fn depends_on_record(&self) -> bool {
        matches!(
            self,
            Self::Path {
                source: Source::Record | Source::Collection(_),
                ..
            }
        )
    }
}

/// An operand after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Single(Value),
    Many(Vec<Value>),
    /// A relation traversal that hit an unset relation or missing record.
    /// Every comparison involving it is false.
    Unresolved,
}

impl Expr {
    /// Visits every comparison in the tree.
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            Self::And(a, b) | Self::Or(a, b) => {
                a.collect(out);
                b.collect(out);
            }
            Self::Cmp(c) => out.push(c),
            Self::Const(_) => {}
        }
    }

    /// Names of `@collection.*` sources referenced anywhere in the tree,
    /// in first-appearance order.
    pub fn joined_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for cmp in self.comparisons() {
            for operand in [&cmp.left, &cmp.right] {
                if let Operand::Path {
                    source: Source::Collection(name),
                    ..
                } = operand
                {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }
}
