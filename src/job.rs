//! Internal unit of submitted work.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// A single submitted callback, tagged with a submission id so failures can
/// be traced back to the submission that produced them.
pub(crate) struct Job {
    id: u64,
    work: Box<dyn FnOnce() + Send>,
}

impl Job {
    pub(crate) fn new(id: u64, work: Box<dyn FnOnce() + Send>) -> Self {
        Self { id, work }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Run the callback. Panics are caught and logged so one failing task
    /// cannot take down the drain loop or its worker thread.
    pub(crate) fn run(self, context: &str) {
        let Job { id, work } = self;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || work())) {
            error!(
                "{context} task #{id} panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<opaque panic payload>"
    }
}
