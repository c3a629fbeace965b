//! Model-level mutation orchestration.
//!
//! Every record write goes through a [`Dao`], whatever triggered it: an API
//! request, application code, or a handler reacting to another write. A
//! cascade mutation runs the full model chain:
//!
//! ```text
//! record_<action>            handlers, then:
//!   record_validate          handlers, then schema validation (not for delete)
//!   record_<action>_execute  handlers, then the write (and commit if outermost)
//! record_after_<action>_success | record_after_<action>_error
//! ```
//!
//! A top-level mutation owns a transaction. Mutations made through the
//! event's `dao()` join it: their writes are committed with the outer write
//! as one batch, and their post hooks run once that batch has been applied
//! or rolled back.

use crate::abort::AbortSignal;
use crate::app::App;
use crate::error::{ApiError, ApiResult};
use crate::events::{RecordAction, RecordEvent};
use crate::registry::ModelHooks;
use crate::resolver::StoreResolver;
use crate::tx::Transaction;
use async_trait::async_trait;
use futures::future::BoxFuture;
use recbase_hooks::{Done, Hook, Phase, Terminal};
use recbase_model::{Collection, ModelError, Record};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a mutation treats hooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationMode {
    /// Full hook chain of the target record.
    #[default]
    Cascade,
    /// No hooks at all. Schema validation still runs.
    Direct,
}

/// Result of a mutation that did not fail.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub record: Record,
    /// `PostSuccess` (or `Persisted` for direct writes) once committed,
    /// `Halted` when a handler stopped the chain, `Execute` for a nested
    /// write that commits with its enclosing mutation.
    pub phase: Phase,
}

impl Mutation {
    pub fn is_committed(&self) -> bool {
        self.phase.is_committed()
    }

    pub fn is_halted(&self) -> bool {
        self.phase == Phase::Halted
    }

    /// True for nested writes waiting on their enclosing transaction.
    pub fn is_pending(&self) -> bool {
        self.phase == Phase::Execute
    }
}

/// Data access handle.
///
/// `App::dao()` hands out an unbound handle: each mutation through it is a
/// top-level mutation. Handles obtained from a [`RecordEvent`] before the
/// commit are bound to that event's transaction.
#[derive(Clone)]
pub struct Dao {
    app: App,
    tx: Option<Arc<Transaction>>,
    mode: MutationMode,
}

impl Dao {
    pub(crate) fn new(app: App) -> Self {
        Self {
            app,
            tx: None,
            mode: MutationMode::Cascade,
        }
    }

    fn bound(app: App, tx: Arc<Transaction>) -> Self {
        Self {
            app,
            tx: Some(tx),
            mode: MutationMode::Cascade,
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn mode(&self) -> MutationMode {
        self.mode
    }

    /// Same handle, mutations bypass hooks.
    pub fn direct(&self) -> Self {
        Self {
            mode: MutationMode::Direct,
            ..self.clone()
        }
    }

    /// Same handle, mutations run the full hook chain.
    pub fn cascade(&self) -> Self {
        Self {
            mode: MutationMode::Cascade,
            ..self.clone()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Resolver that sees this handle's pending writes.
    pub fn resolver(&self) -> StoreResolver {
        StoreResolver::new(self.app.catalog().clone(), self.app.store().clone(), self.tx.clone())
    }

    pub fn find(&self, collection: &str, id: &str) -> ApiResult<Option<Record>> {
        self.resolver().find(collection, id)
    }

    pub fn list(&self, collection: &str) -> ApiResult<Vec<Record>> {
        self.resolver().list(collection)
    }

    pub async fn create(&self, record: Record) -> ApiResult<Mutation> {
        self.mutate(RecordAction::Create, record).await
    }

    pub async fn update(&self, record: Record) -> ApiResult<Mutation> {
        self.mutate(RecordAction::Update, record).await
    }

    pub async fn delete(&self, record: Record) -> ApiResult<Mutation> {
        self.mutate(RecordAction::Delete, record).await
    }

    /// Creates new records, updates persisted ones.
    pub async fn save(&self, record: Record) -> ApiResult<Mutation> {
        let action = if record.is_new() {
            RecordAction::Create
        } else {
            RecordAction::Update
        };
        self.mutate(action, record).await
    }

    /// Runs `action` on `record` through this handle.
    pub async fn mutate(&self, action: RecordAction, record: Record) -> ApiResult<Mutation> {
        match &self.tx {
            Some(tx) if !tx.is_committed() => self.run(tx.clone(), action, record, false).await,
            // after the commit a bound handle behaves like an unbound one
            _ => self.run_detached(action, record).await,
        }
    }

    /// Runs a top-level mutation on its own task.
    ///
    /// The waiting caller may give up (deadline or dropped future); the task
    /// then still runs to completion and the abort is observed at the commit
    /// checkpoint only.
    async fn run_detached(&self, action: RecordAction, record: Record) -> ApiResult<Mutation> {
        let abort = AbortSignal::new();
        let guard = abort.guard();
        let tx = Arc::new(Transaction::new(abort));
        let dao = Self {
            tx: None,
            ..self.clone()
        };
        let task = tokio::spawn(async move { dao.run(tx, action, record, true).await });

        let joined = match self.app.config().hooks.timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(action = %action, ?limit, "mutation deadline exceeded, aborting");
                    return Err(ApiError::Aborted);
                }
            },
            None => task.await,
        };
        guard.disarm();
        joined.map_err(|e| ApiError::hook(format!("mutation task failed: {e}")))?
    }

    fn run(
        &self,
        tx: Arc<Transaction>,
        action: RecordAction,
        record: Record,
        owner: bool,
    ) -> BoxFuture<'_, ApiResult<Mutation>> {
        Box::pin(async move {
            let collection = self.app.collection(record.collection())?;
            if collection.is_view() {
                return Err(ModelError::ReadOnly(collection.name.clone()).into());
            }

            let mut record = record;
            match action {
                RecordAction::Create => record.freeze_original(),
                RecordAction::Update | RecordAction::Delete => {
                    let bound = Self::bound(self.app.clone(), tx.clone());
                    let stored = bound
                        .find(&collection.name, record.id().as_str())?
                        .ok_or(ApiError::NotFound)?;
                    record.set_original(&stored);
                }
            }

            match self.mode {
                MutationMode::Direct => self.run_direct(&tx, action, record, &collection, owner).await,
                MutationMode::Cascade => self.run_cascade(tx, action, record, collection, owner).await,
            }
        })
    }

    async fn run_direct(
        &self,
        tx: &Transaction,
        action: RecordAction,
        mut record: Record,
        collection: &Collection,
        owner: bool,
    ) -> ApiResult<Mutation> {
        if action != RecordAction::Delete {
            collection.validate_record(&record)?;
        }
        if action == RecordAction::Update {
            record.touch();
        }
        let savepoint = tx.savepoint();
        tx.write(action, &record);
        if owner {
            if let Err(err) = self.commit(tx).await {
                tx.rollback_to(savepoint);
                return Err(err);
            }
        }
        record.mark_persisted();
        debug!(collection = %collection.name, record = %record.id(), action = %action, "direct write");
        Ok(Mutation {
            record,
            phase: if owner { Phase::Persisted } else { Phase::Execute },
        })
    }

    async fn run_cascade(
        &self,
        tx: Arc<Transaction>,
        action: RecordAction,
        record: Record,
        collection: Arc<Collection>,
        owner: bool,
    ) -> ApiResult<Mutation> {
        let hooks = self.app.hooks().model(action);
        let savepoint = tx.savepoint();
        let mut event = RecordEvent::new(action, record, collection, Self::bound(self.app.clone(), tx.clone()));
        event.advance(Phase::ModelPre);

        let terminal = ModelTerminal {
            app: &self.app,
            tx: &tx,
            action,
            owner,
        };
        let mut result = hooks.pre.trigger(&mut event, &terminal).await.map(|_| ());
        if result.is_ok() && !event.written {
            if let Some(err) = tx.failure() {
                result = Err(err);
            }
        }

        let committed = owner && tx.is_committed();
        match result {
            Err(err) if !committed => {
                let discarded = tx.rollback_to(savepoint);
                self.fail_all(discarded, &err).await;
                debug!(collection = %event.collection.name, action = %action, error = %err, "mutation failed");
                event.error = Some(err.clone());
                event.advance(Phase::PostError);
                event.set_dao(self.app.dao());
                run_post(hooks.error, &mut event).await;
                return Err(err);
            }
            Err(err) => {
                warn!(
                    collection = %event.collection.name,
                    action = %action,
                    error = %err,
                    "handler failed after the write committed, keeping the commit"
                );
            }
            Ok(()) => {}
        }

        if !event.written {
            let discarded = tx.rollback_to(savepoint);
            self.fail_all(discarded, &ApiError::hook("enclosing mutation was halted")).await;
            event.advance(Phase::Halted);
            debug!(collection = %event.collection.name, action = %action, "mutation halted");
            return Ok(Mutation {
                record: event.record,
                phase: Phase::Halted,
            });
        }

        if !owner {
            let record = event.record.clone();
            event.set_dao(self.app.dao());
            tx.defer(event);
            return Ok(Mutation {
                record,
                phase: Phase::Execute,
            });
        }

        for nested in tx.take_deferred() {
            self.succeed(nested).await;
        }
        event.set_dao(self.app.dao());
        event.advance(Phase::PostSuccess);
        run_post(hooks.success, &mut event).await;
        Ok(Mutation {
            record: event.record,
            phase: Phase::PostSuccess,
        })
    }

    /// Applies the transaction's batch. Called once, by the outermost chain.
    async fn commit(&self, tx: &Transaction) -> ApiResult<()> {
        if tx.abort_signal().is_aborted() {
            warn!("caller aborted before commit, rolling back");
            tx.fail(ApiError::Aborted);
            return Err(ApiError::Aborted);
        }
        let batch = tx.snapshot();
        let writes = batch.len();
        let store = self.app.store().clone();
        let applied = tokio::task::spawn_blocking(move || store.apply(&batch))
            .await
            .map_err(|e| ApiError::StorageFailure(format!("storage task failed: {e}")))
            .and_then(|applied| applied.map_err(ApiError::from));
        match applied {
            Ok(()) => {
                tx.mark_committed();
                debug!(writes, "transaction committed");
                Ok(())
            }
            Err(err) => {
                warn!(writes, error = %err, "transaction rolled back");
                tx.fail(err.clone());
                Err(err)
            }
        }
    }

    async fn succeed(&self, mut event: RecordEvent) {
        let hooks = self.app.hooks().model(event.action);
        event.advance(Phase::Persisted);
        event.advance(Phase::PostSuccess);
        run_post(hooks.success, &mut event).await;
    }

    async fn fail_all(&self, events: Vec<RecordEvent>, err: &ApiError) {
        for mut event in events {
            let hooks: ModelHooks<'_> = self.app.hooks().model(event.action);
            event.error = Some(err.clone());
            event.advance(Phase::PostError);
            run_post(hooks.error, &mut event).await;
        }
    }
}

/// Post hooks observe an outcome that is already final; their errors are
/// logged and dropped.
async fn run_post(hook: &Hook<RecordEvent>, event: &mut RecordEvent) {
    if let Err(err) = hook.trigger(event, &Done).await {
        warn!(
            hook = hook.name(),
            collection = %event.collection.name,
            record = %event.record.id(),
            error = %err,
            "post hook failed"
        );
    }
}

/// Runs after every `record_<action>` handler continued: validation, then
/// the execute chain.
struct ModelTerminal<'a> {
    app: &'a App,
    tx: &'a Arc<Transaction>,
    action: RecordAction,
    owner: bool,
}

#[async_trait]
impl Terminal<RecordEvent> for ModelTerminal<'_> {
    async fn finish(&self, event: &mut RecordEvent) -> ApiResult<()> {
        let hooks = self.app.hooks();
        if self.action != RecordAction::Delete {
            event.advance(Phase::Validate);
            if !hooks.record_validate.trigger(event, &SchemaCheck).await?.is_completed() {
                return Ok(());
            }
        }
        event.advance(Phase::Execute);
        let write = WriteTerminal {
            app: self.app,
            tx: self.tx,
            action: self.action,
            owner: self.owner,
        };
        hooks.model(self.action).execute.trigger(event, &write).await?;
        Ok(())
    }
}

struct SchemaCheck;

#[async_trait]
impl Terminal<RecordEvent> for SchemaCheck {
    async fn finish(&self, event: &mut RecordEvent) -> ApiResult<()> {
        event.collection.validate_record(&event.record)?;
        Ok(())
    }
}

/// Queues the write and, for the outermost chain, commits the batch.
struct WriteTerminal<'a> {
    app: &'a App,
    tx: &'a Arc<Transaction>,
    action: RecordAction,
    owner: bool,
}

#[async_trait]
impl Terminal<RecordEvent> for WriteTerminal<'_> {
    async fn finish(&self, event: &mut RecordEvent) -> ApiResult<()> {
        if self.action == RecordAction::Update {
            event.record.touch();
        }
        self.tx.write(self.action, &event.record);
        if self.owner {
            self.app.dao().commit(self.tx).await?;
            event.advance(Phase::Persisted);
        }
        event.written = true;
        event.record.mark_persisted();
        Ok(())
    }
}
