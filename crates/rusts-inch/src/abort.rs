//! Shared error counter and run-wide stop signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Why workers stopped, if they stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxErrorsExceeded,
    Interrupted,
}

/// Counts failed writes and latches an abort once `max_errors` is reached.
///
/// Workers hold a shared reference and consult [`AbortController::should_stop`] before
/// every batch. The latch never resets. External interruption arrives through the parent
/// cancellation token; both paths wake sleeping workers via [`AbortController::stopped`].
#[derive(Debug)]
pub struct AbortController {
    errors: AtomicU64,
    max_errors: u64,
    tripped: AtomicBool,
    interrupt: CancellationToken,
    stop: CancellationToken,
}

impl AbortController {
    /// `max_errors == 0` disables the error limit.
    pub fn new(max_errors: u64, interrupt: CancellationToken) -> Self {
        let stop = interrupt.child_token();
        Self {
            errors: AtomicU64::new(0),
            max_errors,
            tripped: AtomicBool::new(false),
            interrupt,
            stop,
        }
    }

    /// Records one failed write. Returns true if this call tripped the latch.
    pub fn record_error(&self) -> bool {
        let count = self.errors.fetch_add(1, Ordering::AcqRel) + 1;
        if self.max_errors == 0 || count < self.max_errors {
            return false;
        }

        let first = !self.tripped.swap(true, Ordering::AcqRel);
        self.stop.cancel();
        first
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// True once the error latch tripped or the run was interrupted.
    pub fn should_stop(&self) -> bool {
        self.is_aborted() || self.stop.is_cancelled()
    }

    /// Completes when workers should stop.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    /// Stop reason, `None` while the run may continue.
    pub fn reason(&self) -> Option<StopReason> {
        if self.is_aborted() {
            Some(StopReason::MaxErrorsExceeded)
        } else if self.interrupt.is_cancelled() {
            Some(StopReason::Interrupted)
        } else {
            None
        }
    }
}
