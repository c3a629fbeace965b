//! Output enrichment: turns records into client payloads.

use crate::app::App;
use crate::error::ApiResult;
use crate::events::RecordEnrichEvent;
use recbase_hooks::Done;
use recbase_model::Record;
use recbase_rules::RequestContext;
use serde_json::Value as Json;

impl App {
    /// Serializes `record` for the client behind `ctx`.
    ///
    /// Runs the `record_enrich` hook on a copy; hidden fields are dropped
    /// unless `ctx` is a superuser or a handler unhides them. Without a
    /// context the output is treated as public.
    pub async fn enrich(&self, record: &Record, ctx: Option<&RequestContext>) -> ApiResult<Json> {
        let collection = self.collection(record.collection())?;
        let mut event = RecordEnrichEvent::new(self, record.detached(), collection, ctx);
        self.hooks().record_enrich.trigger(&mut event, &Done).await?;
        Ok(event.output())
    }

    pub async fn enrich_all(&self, records: &[Record], ctx: Option<&RequestContext>) -> ApiResult<Vec<Json>> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(self.enrich(record, ctx).await?);
        }
        Ok(out)
    }
}
