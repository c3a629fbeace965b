//! Hook chains for recbase.
//!
//! A [`Hook`] is one fixed point in the request or record lifecycle. It
//! holds handlers ordered by priority and then registration order. Running
//! it passes a mutable event down the chain; each handler decides whether
//! to continue by calling [`Next::run`]. The work the chain guards (a
//! storage write, a response) is the [`Terminal`] and only runs when every
//! handler continued.
//!
//! Hooks are assembled with a [`HookBuilder`] during startup and are
//! immutable afterwards, so a built hook can be shared freely between tasks.

mod chain;
mod hook;
mod phase;

pub use chain::{ChainOutcome, Done, Handler, HandlerFn, HookEvent, Next, Terminal};
pub use hook::{Binding, Hook, HookBuilder};
pub use phase::Phase;

/// Re-exported so handler closures can name their return type.
pub use futures::future::BoxFuture;
