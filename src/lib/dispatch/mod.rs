//! Job dispatch strategies for decompression work.
//!
//! The stage hands each decompression job to a [`JobDispatcher`] and never waits on
//! it; results come back through the stage's event channel. Which dispatcher runs the
//! jobs is chosen once, at construction, from a [`DispatchStrategy`].
//!
//! # Strategies
//!
//! - [`DispatchStrategy::Dedicated`]: a fixed set of named worker threads fed by a
//!   crossbeam channel ([`DedicatedPool`]).
//! - [`DispatchStrategy::WorkStealing`]: a private rayon thread pool
//!   ([`WorkStealingPool`]).
//! - [`DispatchStrategy::Inline`]: run each job on the submitting thread
//!   ([`InlineDispatcher`]); deterministic, used in tests.

mod inline;
mod rayon_pool;
mod thread_pool;

use clap::ValueEnum;
use std::fmt;
use std::sync::Arc;

use crate::errors::{Result, StreamError};

pub use inline::InlineDispatcher;
pub use rayon_pool::WorkStealingPool;
pub use thread_pool::DedicatedPool;

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs somewhere other than (or, for [`InlineDispatcher`], on) the caller.
pub trait JobDispatcher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Run `job` eventually. Must not block waiting for the job to finish.
    fn submit(&self, job: Job);

    /// Number of threads jobs run on.
    fn num_workers(&self) -> usize;
}

/// How decompression jobs are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DispatchStrategy {
    /// Dedicated worker threads fed by a channel.
    #[default]
    #[value(name = "dedicated")]
    Dedicated,

    /// A private rayon pool with work stealing.
    #[value(name = "work-stealing")]
    WorkStealing,

    /// Run jobs synchronously on the submitting thread.
    #[value(name = "inline")]
    Inline,
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchStrategy::Dedicated => "dedicated",
            DispatchStrategy::WorkStealing => "work-stealing",
            DispatchStrategy::Inline => "inline",
        };
        f.write_str(name)
    }
}

/// Build the dispatcher for `strategy` with `num_threads` workers.
///
/// `num_threads` is ignored by the inline strategy.
///
/// # Errors
///
/// Returns an error if `num_threads` is zero for a threaded strategy or the worker
/// threads cannot be spawned.
pub fn create_dispatcher(
    strategy: DispatchStrategy,
    num_threads: usize,
) -> Result<Arc<dyn JobDispatcher>> {
    if num_threads == 0 && strategy != DispatchStrategy::Inline {
        return Err(StreamError::InvalidParameter {
            parameter: "threads".to_string(),
            reason: format!("the {strategy} strategy needs at least one worker thread"),
        });
    }
    let dispatcher: Arc<dyn JobDispatcher> = match strategy {
        DispatchStrategy::Dedicated => Arc::new(DedicatedPool::new(num_threads)?),
        DispatchStrategy::WorkStealing => Arc::new(WorkStealingPool::new(num_threads)?),
        DispatchStrategy::Inline => Arc::new(InlineDispatcher),
    };
    Ok(dispatcher)
}

/// Extract a message from a panic payload.
#[must_use]
pub fn extract_panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
