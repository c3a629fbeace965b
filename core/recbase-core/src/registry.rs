//! Every hook point of the application.

use crate::events::{
    RealtimeMessageEvent, RecordAction, RecordEnrichEvent, RecordEvent, RecordRequestEvent, RecordsListRequestEvent,
};
use recbase_hooks::{Hook, HookBuilder};

/// Collects bindings during startup.
///
/// ```ignore
/// let mut hooks = HookRegistryBuilder::default();
/// hooks.record_update.bind(
///     Binding::func(|e, next| Box::pin(async move { next.run(e).await })).for_collections(["tasks"]),
/// );
/// ```
pub struct HookRegistryBuilder {
    pub record_validate: HookBuilder<RecordEvent>,

    pub record_create: HookBuilder<RecordEvent>,
    pub record_create_execute: HookBuilder<RecordEvent>,
    pub record_after_create_success: HookBuilder<RecordEvent>,
    pub record_after_create_error: HookBuilder<RecordEvent>,

    pub record_update: HookBuilder<RecordEvent>,
    pub record_update_execute: HookBuilder<RecordEvent>,
    pub record_after_update_success: HookBuilder<RecordEvent>,
    pub record_after_update_error: HookBuilder<RecordEvent>,

    pub record_delete: HookBuilder<RecordEvent>,
    pub record_delete_execute: HookBuilder<RecordEvent>,
    pub record_after_delete_success: HookBuilder<RecordEvent>,
    pub record_after_delete_error: HookBuilder<RecordEvent>,

    pub records_list_request: HookBuilder<RecordsListRequestEvent>,
    pub record_view_request: HookBuilder<RecordRequestEvent>,
    pub record_create_request: HookBuilder<RecordRequestEvent>,
    pub record_update_request: HookBuilder<RecordRequestEvent>,
    pub record_delete_request: HookBuilder<RecordRequestEvent>,

    pub record_enrich: HookBuilder<RecordEnrichEvent>,

    pub realtime_message_send: HookBuilder<RealtimeMessageEvent>,
}

impl Default for HookRegistryBuilder {
    fn default() -> Self {
        Self {
            record_validate: HookBuilder::new("record_validate"),
            record_create: HookBuilder::new("record_create"),
            record_create_execute: HookBuilder::new("record_create_execute"),
            record_after_create_success: HookBuilder::new("record_after_create_success"),
            record_after_create_error: HookBuilder::new("record_after_create_error"),
            record_update: HookBuilder::new("record_update"),
            record_update_execute: HookBuilder::new("record_update_execute"),
            record_after_update_success: HookBuilder::new("record_after_update_success"),
            record_after_update_error: HookBuilder::new("record_after_update_error"),
            record_delete: HookBuilder::new("record_delete"),
            record_delete_execute: HookBuilder::new("record_delete_execute"),
            record_after_delete_success: HookBuilder::new("record_after_delete_success"),
            record_after_delete_error: HookBuilder::new("record_after_delete_error"),
            records_list_request: HookBuilder::new("records_list_request"),
            record_view_request: HookBuilder::new("record_view_request"),
            record_create_request: HookBuilder::new("record_create_request"),
            record_update_request: HookBuilder::new("record_update_request"),
            record_delete_request: HookBuilder::new("record_delete_request"),
            record_enrich: HookBuilder::new("record_enrich"),
            realtime_message_send: HookBuilder::new("realtime_message_send"),
        }
    }
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The post-success hook of `action`, for components that react to
    /// committed writes.
    pub fn after_success(&mut self, action: RecordAction) -> &mut HookBuilder<RecordEvent> {
        match action {
            RecordAction::Create => &mut self.record_after_create_success,
            RecordAction::Update => &mut self.record_after_update_success,
            RecordAction::Delete => &mut self.record_after_delete_success,
        }
    }

    /// Freezes the registry; no bindings can be added afterwards.
    pub fn build(self) -> HookRegistry {
        HookRegistry {
            record_validate: self.record_validate.build(),
            record_create: self.record_create.build(),
            record_create_execute: self.record_create_execute.build(),
            record_after_create_success: self.record_after_create_success.build(),
            record_after_create_error: self.record_after_create_error.build(),
            record_update: self.record_update.build(),
            record_update_execute: self.record_update_execute.build(),
            record_after_update_success: self.record_after_update_success.build(),
            record_after_update_error: self.record_after_update_error.build(),
            record_delete: self.record_delete.build(),
            record_delete_execute: self.record_delete_execute.build(),
            record_after_delete_success: self.record_after_delete_success.build(),
            record_after_delete_error: self.record_after_delete_error.build(),
            records_list_request: self.records_list_request.build(),
            record_view_request: self.record_view_request.build(),
            record_create_request: self.record_create_request.build(),
            record_update_request: self.record_update_request.build(),
            record_delete_request: self.record_delete_request.build(),
            record_enrich: self.record_enrich.build(),
            realtime_message_send: self.realtime_message_send.build(),
        }
    }
}

/// The immutable set of hooks shared by every request.
pub struct HookRegistry {
    pub record_validate: Hook<RecordEvent>,

    pub record_create: Hook<RecordEvent>,
    pub record_create_execute: Hook<RecordEvent>,
    pub record_after_create_success: Hook<RecordEvent>,
    pub record_after_create_error: Hook<RecordEvent>,

    pub record_update: Hook<RecordEvent>,
    pub record_update_execute: Hook<RecordEvent>,
    pub record_after_update_success: Hook<RecordEvent>,
    pub record_after_update_error: Hook<RecordEvent>,

    pub record_delete: Hook<RecordEvent>,
    pub record_delete_execute: Hook<RecordEvent>,
    pub record_after_delete_success: Hook<RecordEvent>,
    pub record_after_delete_error: Hook<RecordEvent>,

    pub records_list_request: Hook<RecordsListRequestEvent>,
    pub record_view_request: Hook<RecordRequestEvent>,
    pub record_create_request: Hook<RecordRequestEvent>,
    pub record_update_request: Hook<RecordRequestEvent>,
    pub record_delete_request: Hook<RecordRequestEvent>,

    pub record_enrich: Hook<RecordEnrichEvent>,

    pub realtime_message_send: Hook<RealtimeMessageEvent>,
}

/// The four model hooks of one action.
pub(crate) struct ModelHooks<'a> {
    pub pre: &'a Hook<RecordEvent>,
    pub execute: &'a Hook<RecordEvent>,
    pub success: &'a Hook<RecordEvent>,
    pub error: &'a Hook<RecordEvent>,
}

impl HookRegistry {
    pub(crate) fn model(&self, action: RecordAction) -> ModelHooks<'_> {
        match action {
            RecordAction::Create => ModelHooks {
                pre: &self.record_create,
                execute: &self.record_create_execute,
                success: &self.record_after_create_success,
                error: &self.record_after_create_error,
            },
            RecordAction::Update => ModelHooks {
                pre: &self.record_update,
                execute: &self.record_update_execute,
                success: &self.record_after_update_success,
                error: &self.record_after_update_error,
            },
            RecordAction::Delete => ModelHooks {
                pre: &self.record_delete,
                execute: &self.record_delete_execute,
                success: &self.record_after_delete_success,
                error: &self.record_after_delete_error,
            },
        }
    }

    /// The request hook guarding `action`.
    pub(crate) fn request(&self, action: RecordAction) -> &Hook<RecordRequestEvent> {
        match action {
            RecordAction::Create => &self.record_create_request,
            RecordAction::Update => &self.record_update_request,
            RecordAction::Delete => &self.record_delete_request,
        }
    }
}
