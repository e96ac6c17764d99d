//! Out-of-band stop signal for a running worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable flag asking a worker to stop before its next job.
///
/// The worker checks it between jobs only; a job that already started runs
/// to completion. The flag stays raised until [`StopHandle::reset`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}
