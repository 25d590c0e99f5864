//! Cancellable handles for delayed and repeating tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type CancelCallback = Box<dyn FnOnce() + Send>;

/// Cancellable, inspectable token for one scheduled unit of work.
///
/// Handles are cheap to clone; every clone observes the same task.
/// Cancellation is advisory: it prevents future firings from being handed
/// off, but never retracts a firing already in flight.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    cancelled: AtomicBool,
    repeating: bool,
    on_cancel: Mutex<Option<CancelCallback>>,
}

impl TaskHandle {
    pub(crate) fn new(repeating: bool) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                cancelled: AtomicBool::new(false),
                repeating,
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Cancel the task. Idempotent: only the first call transitions the
    /// handle, and a registered cancellation callback runs exactly once, on
    /// that call.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = match self.inner.on_cancel.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Whether the task has been marked for cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the task repeats at an interval.
    pub fn is_repeating(&self) -> bool {
        self.inner.repeating
    }

    /// Register a cleanup callback to run when the task is cancelled.
    ///
    /// Replaces any earlier registration. Registering on an already
    /// cancelled handle is a no-op: the callback is dropped without running.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        let Ok(mut slot) = self.inner.on_cancel.lock() else {
            return;
        };
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return;
        }
        *slot = Some(Box::new(callback));
    }

    /// Run `work` on the calling thread only if the task has not been
    /// cancelled. Useful for long-running async work that checks its own
    /// status between steps.
    pub fn if_active(&self, work: impl FnOnce()) {
        if !self.is_cancelled() {
            work();
        }
    }
}
