//! Synchronous dispatch on the submitting thread.

use log::error;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{Job, JobDispatcher, extract_panic_message};

/// Runs every job immediately, before `submit` returns.
///
/// Events a job sends are already queued when control returns to the stage, so the
/// next `execute_requests` call observes them. Useful for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl JobDispatcher for InlineDispatcher {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn submit(&self, job: Job) {
        if let Err(panic_info) = catch_unwind(AssertUnwindSafe(job)) {
            error!("Inline job panicked: {}", extract_panic_message(panic_info));
        }
    }

    fn num_workers(&self) -> usize {
        1
    }
}
