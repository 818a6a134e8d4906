//! Shared cancellation flag observed by every stage of one execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide stop flag with a monotonic unset-to-set transition.
///
/// Every clone shares the same underlying flag. Operations poll it between
/// rows and stop pulling and yielding once it is set; the scheduler sets it
/// on the first recorded stage fault, and callers set it to request a
/// graceful stop. The flag never resets - one signal belongs to exactly one
/// process execution and is dropped with it.
///
/// Reads and writes use `SeqCst` so the set transition is observed by all
/// workers without missed-update races.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Creates a new, unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
