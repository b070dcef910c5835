// Cooperative Cancellation
// Flag shared between the queue and the runner, checked at stage and step boundaries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation request for one build.
///
/// Setting the flag never interrupts a running step; the runner observes it
/// at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    requested: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
