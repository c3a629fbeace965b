//! Request-level orchestration: the five record API operations.
//!
//! Each operation applies its access rule, runs its request hook and, for
//! writes, hands the record to the model chain from inside that hook's
//! terminal. A rule that does not pass maps to an error the caller cannot
//! tell apart from a missing record, except for create (rejected input)
//! and list (an empty page).

use crate::app::App;
use crate::error::{ApiError, ApiResult};
use crate::events::{RecordAction, RecordRequestEvent, RecordsListRequestEvent};
use async_trait::async_trait;
use recbase_hooks::{Phase, Terminal};
use recbase_model::{AccessOp, Collection, ModelError, Record, Rule};
use recbase_rules::{Access, ListAccess, RequestContext};
use recbase_types::RecordId;
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::debug;

impl App {
    /// Records of `collection` visible to `ctx`, enriched.
    pub async fn list_records(&self, collection: &str, ctx: &RequestContext) -> ApiResult<Vec<Json>> {
        let collection = self.collection(collection)?;
        let records = self.visible_records(&collection, ctx)?;
        let mut event = RecordsListRequestEvent::new(self, records, collection, ctx);
        self.hooks().records_list_request.trigger(&mut event, &ListTerminal).await?;
        Ok(event.response.unwrap_or_default())
    }

    pub async fn view_record(&self, collection: &str, id: &str, ctx: &RequestContext) -> ApiResult<Option<Json>> {
        let collection = self.collection(collection)?;
        let record = self.fetch_authorized(&collection, AccessOp::View, id, ctx)?;
        let mut event = RecordRequestEvent::new(self, record, collection, ctx);
        self.hooks().record_view_request.trigger(&mut event, &ViewTerminal).await?;
        Ok(event.response)
    }

    /// Creates a record from the request body. A string `id` in the body
    /// becomes the record id.
    pub async fn create_record(&self, collection: &str, ctx: &RequestContext) -> ApiResult<Option<Json>> {
        let collection = self.collection(collection)?;
        ensure_writable(&collection)?;
        ensure_unlocked(&collection, AccessOp::Create, ctx)?;

        let mut record = Record::new(&collection.name);
        match ctx.body().get("id") {
            Some(Json::String(id)) if !id.is_empty() => {
                record.set_id(RecordId::parse(id).map_err(|e| ApiError::rejected(e.to_string()))?);
            }
            Some(Json::String(_)) | Some(Json::Null) | None => {}
            Some(_) => return Err(ApiError::rejected("id must be a string")),
        }
        collection.apply_body(&mut record, ctx.body())?;
        self.run_request(RecordAction::Create, record, collection, ctx).await
    }

    pub async fn update_record(&self, collection: &str, id: &str, ctx: &RequestContext) -> ApiResult<Option<Json>> {
        let collection = self.collection(collection)?;
        ensure_writable(&collection)?;
        let mut record = self.fetch_authorized(&collection, AccessOp::Update, id, ctx)?;
        collection.apply_body(&mut record, ctx.body())?;
        self.run_request(RecordAction::Update, record, collection, ctx).await
    }

    pub async fn delete_record(&self, collection: &str, id: &str, ctx: &RequestContext) -> ApiResult<Option<Json>> {
        let collection = self.collection(collection)?;
        ensure_writable(&collection)?;
        let record = self.fetch_authorized(&collection, AccessOp::Delete, id, ctx)?;
        self.run_request(RecordAction::Delete, record, collection, ctx).await
    }

    async fn run_request(
        &self,
        action: RecordAction,
        record: Record,
        collection: Arc<Collection>,
        ctx: &RequestContext,
    ) -> ApiResult<Option<Json>> {
        let mut event = RecordRequestEvent::new(self, record, collection, ctx);
        self.hooks()
            .request(action)
            .trigger(&mut event, &MutationTerminal { action })
            .await?;
        Ok(event.response)
    }

    fn visible_records(&self, collection: &Collection, ctx: &RequestContext) -> ApiResult<Vec<Record>> {
        let resolver = self.resolver();
        match self.rules().list_access(collection, ctx, &resolver)? {
            ListAccess::Locked => Err(ApiError::Forbidden),
            ListAccess::All => resolver.list(&collection.name),
            ListAccess::Filtered(predicate) => {
                if predicate.as_const() == Some(false) {
                    debug!(collection = %collection.name, "list rule excludes every row");
                    return Ok(Vec::new());
                }
                let filter = predicate.to_sql(&resolver)?;
                if let Some(rows) = self.store().list_where(&collection.name, &filter)? {
                    return Ok(rows);
                }
                let rows = resolver.list(&collection.name)?;
                Ok(predicate.filter_records(rows, &resolver))
            }
        }
    }

    /// Loads a record for view, update or delete. A record that exists but
    /// fails the rule is reported exactly like a missing one.
    fn fetch_authorized(&self, collection: &Collection, op: AccessOp, id: &str, ctx: &RequestContext) -> ApiResult<Record> {
        ensure_unlocked(collection, op, ctx)?;
        let record = self.dao().find(&collection.name, id)?.ok_or(ApiError::NotFound)?;
        self.authorize(collection, op, &record, ctx)?;
        Ok(record)
    }

    fn authorize(&self, collection: &Collection, op: AccessOp, record: &Record, ctx: &RequestContext) -> ApiResult<()> {
        match self.rules().check(collection, op, record, ctx, &self.resolver())? {
            Access::Granted => Ok(()),
            Access::Locked => Err(ApiError::Forbidden),
            Access::Denied if op == AccessOp::Create => {
                Err(ApiError::rejected("the submitted data does not satisfy the create rule"))
            }
            Access::Denied => Err(ApiError::NotFound),
        }
    }
}

fn ensure_unlocked(collection: &Collection, op: AccessOp, ctx: &RequestContext) -> ApiResult<()> {
    if !ctx.is_superuser() && *collection.rules.get(op) == Rule::Locked {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

fn ensure_writable(collection: &Collection) -> ApiResult<()> {
    if collection.is_view() {
        return Err(ModelError::ReadOnly(collection.name.clone()).into());
    }
    Ok(())
}

struct ListTerminal;

#[async_trait]
impl Terminal<RecordsListRequestEvent> for ListTerminal {
    async fn finish(&self, event: &mut RecordsListRequestEvent) -> ApiResult<()> {
        let app = event.app().clone();
        let payload = app.enrich_all(&event.records, Some(&event.ctx)).await?;
        event.response = Some(payload);
        Ok(())
    }
}

struct ViewTerminal;

#[async_trait]
impl Terminal<RecordRequestEvent> for ViewTerminal {
    async fn finish(&self, event: &mut RecordRequestEvent) -> ApiResult<()> {
        let app = event.app().clone();
        event.response = Some(app.enrich(&event.record, Some(&event.ctx)).await?);
        event.advance(Phase::RequestPost);
        Ok(())
    }
}

/// Hands the record to the model chain once every request handler
/// continued. The create rule is checked here so that it sees the record
/// as request handlers left it.
struct MutationTerminal {
    action: RecordAction,
}

#[async_trait]
impl Terminal<RecordRequestEvent> for MutationTerminal {
    async fn finish(&self, event: &mut RecordRequestEvent) -> ApiResult<()> {
        let app = event.app().clone();
        if self.action == RecordAction::Create {
            app.authorize(&event.collection, AccessOp::Create, &event.record, &event.ctx)?;
        }

        let mutation = app.dao().mutate(self.action, event.record.clone()).await?;
        if mutation.is_halted() {
            event.advance(Phase::Halted);
            return Ok(());
        }
        event.record = mutation.record;
        if self.action != RecordAction::Delete {
            event.response = Some(app.enrich(&event.record, Some(&event.ctx)).await?);
        }
        event.advance(Phase::RequestPost);
        Ok(())
    }
}
