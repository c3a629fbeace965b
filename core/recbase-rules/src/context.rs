//! Per-request evaluation context.

use recbase_model::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the collection whose records are superusers.
pub const SUPERUSERS: &str = "_superusers";

/// How the current operation was initiated; exposed as `@request.context`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    #[default]
    Default,
    Oauth2,
    Otp,
    Password,
    Realtime,
    ProtectedFile,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Oauth2 => "oauth2",
            Self::Otp => "otp",
            Self::Password => "password",
            Self::Realtime => "realtime",
            Self::ProtectedFile => "protectedFile",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    record: Record,
    superuser: bool,
}

impl AuthIdentity {
    /// Wraps an auth record. Records of the `_superusers` collection are
    /// superusers.
    pub fn new(record: Record) -> Self {
        let superuser = record.collection() == SUPERUSERS;
        Self { record, superuser }
    }

    /// A superuser identity regardless of the record's collection.
    pub fn superuser(record: Record) -> Self {
        Self {
            record,
            superuser: true,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn id(&self) -> &str {
        self.record.id().as_str()
    }

    pub fn collection(&self) -> &str {
        self.record.collection()
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }
}

/// Everything a rule may reference besides the record itself.
///
/// Built once per inbound operation and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    auth: Option<AuthIdentity>,
    body: Map<String, Json>,
    kind: RequestKind,
    method: String,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl RequestContext {
    /// An unauthenticated context with an empty body.
    pub fn anonymous() -> Self {
        Self::builder().build()
    }

    /// A context authenticated as `identity` with an empty body.
    pub fn authenticated(identity: AuthIdentity) -> Self {
        Self::builder().auth(identity).build()
    }

    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder {
            ctx: Self {
                method: "GET".into(),
                ..Default::default()
            },
        }
    }

    pub fn auth(&self) -> Option<&AuthIdentity> {
        self.auth.as_ref()
    }

    pub fn is_superuser(&self) -> bool {
        self.auth.as_ref().is_some_and(AuthIdentity::is_superuser)
    }

    pub fn body(&self) -> &Map<String, Json> {
        &self.body
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Header lookup by normalized name; `X-Token` and `x_token` are the
    /// same header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&header_key(name)).map(String::as_str)
    }

    /// Copy of this context with a different kind, used by the realtime
    /// fan-out to re-evaluate rules on behalf of a subscriber.
    pub fn with_kind(&self, kind: RequestKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug)]
pub struct RequestContextBuilder {
    ctx: RequestContext,
}

impl RequestContextBuilder {
    pub fn auth(mut self, identity: AuthIdentity) -> Self {
        self.ctx.auth = Some(identity);
        self
    }

    pub fn maybe_auth(mut self, identity: Option<AuthIdentity>) -> Self {
        self.ctx.auth = identity;
        self
    }

    pub fn body(mut self, body: Map<String, Json>) -> Self {
        self.ctx.body = body;
        self
    }

    pub fn kind(mut self, kind: RequestKind) -> Self {
        self.ctx.kind = kind;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.ctx.method = method.into();
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.query.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.ctx.headers.insert(header_key(name), value.into());
        self
    }

    pub fn build(self) -> RequestContext {
        self.ctx
    }
}

/// Header names are lower-cased with `-` mapped to `_` so that they can be
/// written as `@request.headers.x_token`.
fn header_key(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}
