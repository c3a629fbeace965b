//! Caller abort signalling for detached mutations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set once the caller stops waiting for a mutation. The mutation keeps
/// running and checks the flag only at its commit checkpoint.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// A guard that aborts on drop unless disarmed. Held by the waiting
    /// caller so that dropping its future counts as an abort.
    pub fn guard(&self) -> AbortGuard {
        AbortGuard {
            signal: Some(self.clone()),
        }
    }
}

pub struct AbortGuard {
    signal: Option<AbortSignal>,
}

impl AbortGuard {
    pub fn disarm(mut self) {
        self.signal = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.abort();
        }
    }
}
