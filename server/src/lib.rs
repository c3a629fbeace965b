//! HTTP record API over a recbase [`App`].
//!
//! Routes:
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/api/collections/{collection}/records` | list |
//! | POST | `/api/collections/{collection}/records` | create |
//! | GET | `/api/collections/{collection}/records/{id}` | view |
//! | PATCH | `/api/collections/{collection}/records/{id}` | update |
//! | DELETE | `/api/collections/{collection}/records/{id}` | delete |
//!
//! Errors are answered with `{"status": <code>, "message": <text>}`.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use recbase_core::{ApiError, ApiResult, App};
use recbase_model::CollectionKind;
use recbase_rules::{AuthIdentity, RequestContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Header naming the auth collection of the caller.
pub const AUTH_COLLECTION_HEADER: &str = "x-auth-collection";
/// Header carrying the caller's record id.
pub const AUTH_ID_HEADER: &str = "x-auth-id";

/// Turns request headers into the identity a request acts as.
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` is an anonymous caller.
    fn resolve(&self, app: &App, headers: &HeaderMap) -> ApiResult<Option<AuthIdentity>>;
}

/// Trusts `x-auth-collection` / `x-auth-id` and loads the named auth record.
///
/// Meant for deployments behind a gateway that has already authenticated
/// the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderIdentity;

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, app: &App, headers: &HeaderMap) -> ApiResult<Option<AuthIdentity>> {
        let Some(id) = header_str(headers, AUTH_ID_HEADER) else {
            return Ok(None);
        };
        let collection = header_str(headers, AUTH_COLLECTION_HEADER).unwrap_or("users");
        let schema = app.collection(collection).map_err(|_| ApiError::Forbidden)?;
        if schema.kind != CollectionKind::Auth {
            return Err(ApiError::Forbidden);
        }
        match app.store().find(collection, id)? {
            Some(record) => Ok(Some(AuthIdentity::new(record))),
            None => {
                debug!(collection, id, "unknown identity in request headers");
                Err(ApiError::Forbidden)
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
struct ServerState {
    app: App,
    identity: Arc<dyn IdentityResolver>,
}

/// Error body returned for every failed request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

struct Failure(ApiError);

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            status: status.as_u16(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// `None` means no payload: a halted chain, or a delete nobody answered for.
fn respond(payload: Option<Value>) -> Response {
    match payload {
        Some(payload) => Json(payload).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

impl ServerState {
    fn context(
        &self,
        method: &Method,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        body: &Bytes,
    ) -> Result<RequestContext, Failure> {
        let auth = self.identity.resolve(&self.app, headers)?;
        let body = parse_body(body)?;

        let mut builder = RequestContext::builder()
            .maybe_auth(auth)
            .method(method.as_str())
            .body(body);
        for (name, value) in query {
            builder = builder.query(name, value);
        }
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                builder = builder.header(name.as_str(), value);
            }
        }
        Ok(builder.build())
    }
}

fn parse_body(body: &Bytes) -> ApiResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::rejected("request body must be a JSON object")),
        Err(e) => Err(ApiError::rejected(format!("invalid JSON body: {e}"))),
    }
}

async fn list_handler(
    State(state): State<ServerState>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, Failure> {
    let ctx = state.context(&method, &headers, query, &Bytes::new())?;
    let items = state.app.list_records(&collection, &ctx).await?;
    Ok(Json(serde_json::json!({ "items": items, "totalItems": items.len() })).into_response())
}

async fn create_handler(
    State(state): State<ServerState>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Failure> {
    let ctx = state.context(&method, &headers, query, &body)?;
    Ok(respond(state.app.create_record(&collection, &ctx).await?))
}

async fn view_handler(
    State(state): State<ServerState>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, Failure> {
    let ctx = state.context(&method, &headers, query, &Bytes::new())?;
    Ok(respond(state.app.view_record(&collection, &id, &ctx).await?))
}

async fn update_handler(
    State(state): State<ServerState>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Failure> {
    let ctx = state.context(&method, &headers, query, &body)?;
    Ok(respond(state.app.update_record(&collection, &id, &ctx).await?))
}

async fn delete_handler(
    State(state): State<ServerState>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, Failure> {
    let ctx = state.context(&method, &headers, query, &Bytes::new())?;
    Ok(respond(state.app.delete_record(&collection, &id, &ctx).await?))
}

/// Build the HTTP router with header-based identities.
pub fn build_router(app: App) -> Router {
    build_router_with(app, Arc::new(HeaderIdentity))
}

/// Build the HTTP router with a custom identity resolver.
pub fn build_router_with(app: App, identity: Arc<dyn IdentityResolver>) -> Router {
    Router::new()
        .route(
            "/api/collections/{collection}/records",
            get(list_handler).post(create_handler),
        )
        .route(
            "/api/collections/{collection}/records/{id}",
            get(view_handler).patch(update_handler).delete(delete_handler),
        )
        .with_state(ServerState { app, identity })
}
