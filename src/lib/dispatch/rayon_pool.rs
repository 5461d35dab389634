//! Work-stealing dispatch on a private rayon pool.

use log::error;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{Job, JobDispatcher, extract_panic_message};
use crate::errors::{Result, StreamError};

/// Runs jobs on a rayon pool owned by the stage, separate from the global pool.
pub struct WorkStealingPool {
    pool: ThreadPool,
}

impl WorkStealingPool {
    /// Build a pool with `num_threads` threads.
    ///
    /// # Errors
    ///
    /// Returns an error if rayon cannot build the pool.
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("pakstream-steal-{i}"))
            .build()
            .map_err(|e| StreamError::Internal(format!("failed to build rayon pool: {e}")))?;
        Ok(Self { pool })
    }
}

impl JobDispatcher for WorkStealingPool {
    fn name(&self) -> &'static str {
        "work-stealing"
    }

    fn submit(&self, job: Job) {
        // rayon aborts the process on a panicking spawned task
        self.pool.spawn(move || {
            if let Err(panic_info) = catch_unwind(AssertUnwindSafe(job)) {
                error!("Work-stealing job panicked: {}", extract_panic_message(panic_info));
            }
        });
    }

    fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}
