//! Handlers, continuations and chain execution.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The mutable object passed down a chain.
pub trait HookEvent: Send + 'static {
    type Error: Send + 'static;

    /// Collection the event concerns; used to select collection-scoped
    /// handlers. Events without a collection only reach unscoped handlers.
    fn collection_name(&self) -> Option<&str> {
        None
    }
}

/// One link in a chain.
///
/// A handler continues the chain by calling [`Next::run`]; returning
/// without calling it halts the chain. Code before the call sees the
/// event as left by earlier handlers, code after it sees the effects of
/// everything later in the chain.
#[async_trait]
pub trait Handler<E: HookEvent>: Send + Sync {
    async fn handle(&self, event: &mut E, next: Next<'_, E>) -> Result<(), E::Error>;
}

/// The work a chain guards, run once every handler has continued.
#[async_trait]
pub trait Terminal<E: HookEvent>: Send + Sync {
    async fn finish(&self, event: &mut E) -> Result<(), E::Error>;
}

/// A terminal that does nothing; for chains that only observe.
#[derive(Debug, Clone, Copy, Default)]
pub struct Done;

#[async_trait]
impl<E: HookEvent> Terminal<E> for Done {
    async fn finish(&self, _event: &mut E) -> Result<(), E::Error> {
        Ok(())
    }
}

/// Whether the chain reached its terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed,
    /// A handler returned without continuing.
    Halted,
}

impl ChainOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Continuation handed to each handler. Consumed by [`Next::run`], so the
/// rest of the chain runs at most once.
pub struct Next<'a, E: HookEvent> {
    handlers: &'a [Arc<dyn Handler<E>>],
    terminal: &'a dyn Terminal<E>,
    reached: &'a AtomicBool,
}

impl<'a, E: HookEvent> Next<'a, E> {
    pub(crate) fn new(
        handlers: &'a [Arc<dyn Handler<E>>],
        terminal: &'a dyn Terminal<E>,
        reached: &'a AtomicBool,
    ) -> Self {
        Self {
            handlers,
            terminal,
            reached,
        }
    }

    /// Runs the remaining handlers and then the terminal.
    pub async fn run(self, event: &mut E) -> Result<(), E::Error> {
        match self.handlers.split_first() {
            Some((first, rest)) => {
                let next = Next::new(rest, self.terminal, self.reached);
                first.handle(event, next).await
            }
            None => {
                self.reached.store(true, Ordering::Release);
                self.terminal.finish(event).await
            }
        }
    }

    /// Handlers left after this point, excluding the terminal.
    pub fn remaining(&self) -> usize {
        self.handlers.len()
    }
}

/// Runs `handlers` then `terminal` over `event`.
pub(crate) async fn execute<E: HookEvent>(
    handlers: &[Arc<dyn Handler<E>>],
    event: &mut E,
    terminal: &dyn Terminal<E>,
) -> Result<ChainOutcome, E::Error> {
    let reached = AtomicBool::new(false);
    Next::new(handlers, terminal, &reached).run(event).await?;
    Ok(if reached.load(Ordering::Acquire) {
        ChainOutcome::Completed
    } else {
        ChainOutcome::Halted
    })
}

/// Adapter turning a closure into a [`Handler`].
pub struct HandlerFn<F>(F);

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<E, F> Handler<E> for HandlerFn<F>
where
    E: HookEvent,
    F: for<'a> Fn(&'a mut E, Next<'a, E>) -> BoxFuture<'a, Result<(), E::Error>> + Send + Sync,
{
    async fn handle(&self, event: &mut E, next: Next<'_, E>) -> Result<(), E::Error> {
        (self.0)(event, next).await
    }
}
