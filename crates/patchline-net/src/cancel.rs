//! Cooperative cancellation token

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation token threaded through transport,
/// decompression, and the per-file download loop.
///
/// Clones share one flag. Cancelling is sticky until [`CancelToken::reset`]
/// is called; the orchestrator resets the token when it returns to the
/// outdated state after a user cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every operation holding a clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can be reused for the next attempt
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }
}
