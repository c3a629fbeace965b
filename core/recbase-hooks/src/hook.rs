//! Hook points: a fixed, ordered set of handler bindings.

use crate::chain::{execute, ChainOutcome, Handler, HandlerFn, HookEvent, Next, Terminal};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A handler plus where and when it runs.
pub struct Binding<E: HookEvent> {
    id: Option<String>,
    handler: Arc<dyn Handler<E>>,
    collections: Vec<String>,
    priority: i32,
}

impl<E: HookEvent> Binding<E> {
    pub fn new(handler: impl Handler<E> + 'static) -> Self {
        Self {
            id: None,
            handler: Arc::new(handler),
            collections: Vec::new(),
            priority: 0,
        }
    }

    /// Binds a closure returning a boxed future:
    ///
    /// ```ignore
    /// Binding::func(|e, next| Box::pin(async move { next.run(e).await }))
    /// ```
    pub fn func<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut E, Next<'a, E>) -> BoxFuture<'a, Result<(), E::Error>> + Send + Sync + 'static,
    {
        Self::new(HandlerFn::new(f))
    }

    /// Identifier used by [`HookBuilder::unbind`].
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Restricts the handler to events of the named collections.
    pub fn for_collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections.extend(names.into_iter().map(Into::into));
        self
    }

    /// Lower runs first; equal priorities run in registration order.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

struct Entry<E: HookEvent> {
    id: Option<String>,
    handler: Arc<dyn Handler<E>>,
    collections: Vec<String>,
    priority: i32,
    seq: u64,
}

impl<E: HookEvent> Entry<E> {
    fn applies_to(&self, collection: Option<&str>) -> bool {
        self.collections.is_empty() || collection.is_some_and(|c| self.collections.iter().any(|n| n == c))
    }
}

/// Collects bindings for one hook point during startup.
pub struct HookBuilder<E: HookEvent> {
    name: &'static str,
    entries: Vec<Entry<E>>,
    seq: u64,
}

impl<E: HookEvent> HookBuilder<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
            seq: 0,
        }
    }

    pub fn bind(&mut self, binding: Binding<E>) -> &mut Self {
        self.entries.push(Entry {
            id: binding.id,
            handler: binding.handler,
            collections: binding.collections,
            priority: binding.priority,
            seq: self.seq,
        });
        self.seq += 1;
        self
    }

    /// Removes every binding registered under `id`.
    pub fn unbind(&mut self, id: &str) -> &mut Self {
        self.entries.retain(|e| e.id.as_deref() != Some(id));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the bindings in execution order.
    pub fn build(mut self) -> Hook<E> {
        self.entries.sort_by_key(|e| (e.priority, e.seq));
        Hook {
            name: self.name,
            entries: self.entries,
        }
    }
}

/// An immutable hook point.
pub struct Hook<E: HookEvent> {
    name: &'static str,
    entries: Vec<Entry<E>>,
}

impl<E: HookEvent> Hook<E> {
    /// A hook point with no handlers.
    pub fn empty(name: &'static str) -> Self {
        HookBuilder::new(name).build()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the handlers that apply to `event` and then `terminal`.
    ///
    /// An error from any handler or the terminal halts the chain and is
    /// returned as is.
    pub async fn trigger(&self, event: &mut E, terminal: &dyn Terminal<E>) -> Result<ChainOutcome, E::Error> {
        let collection = event.collection_name();
        let handlers: Vec<Arc<dyn Handler<E>>> = self
            .entries
            .iter()
            .filter(|e| e.applies_to(collection))
            .map(|e| Arc::clone(&e.handler))
            .collect();
        trace!(hook = self.name, handlers = handlers.len(), "triggering hook");

        let outcome = execute(&handlers, event, terminal).await?;
        if outcome == ChainOutcome::Halted {
            trace!(hook = self.name, "chain halted before its terminal");
        }
        Ok(outcome)
    }
}

impl<E: HookEvent> fmt::Debug for Hook<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("handlers", &self.entries.len())
            .finish()
    }
}
