//! Access rules for recbase collections.
//!
//! A rule is written in a small filter language:
//!
//! ```text
//! @request.auth.id != "" && (author = @request.auth.id || public = true)
//! ```
//!
//! Filters are parsed and checked against the collection schema once
//! ([`Filter::compile`], cached by [`RuleCache`]), then evaluated against a
//! record and a [`RequestContext`]. Without a concrete record a filter is
//! partially evaluated into a [`Predicate`] that can be applied per row or
//! rendered as SQL.
//!
//! Evaluation is pure and never fails: missing values compare as the zero
//! value of the other side, and relation traversals that hit a missing
//! record make the comparison false.

pub mod ast;
mod cache;
mod compile;
mod context;
mod enforce;
mod error;
mod eval;
mod lexer;
mod parser;
mod predicate;
mod resolve;

pub use cache::RuleCache;
pub use compile::Filter;
pub use context::{AuthIdentity, RequestContext, RequestContextBuilder, RequestKind, SUPERUSERS};
pub use enforce::{Access, ListAccess, RuleEngine};
pub use error::{RuleError, RuleResult};
pub use parser::parse;
pub use predicate::{Predicate, SqlFilter};
pub use resolve::{RecordResolver, SchemaLookup};
