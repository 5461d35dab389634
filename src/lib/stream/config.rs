//! Configuration of a decompression stage.

use crate::dispatch::DispatchStrategy;
use crate::errors::{Result, StreamError};

/// Slot counts and worker settings for a [`DecompressionStage`](super::DecompressionStage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Maximum number of reads in flight at once (read slots).
    pub max_num_reads: usize,
    /// Maximum number of decompression jobs queued or running at once (job slots).
    pub max_num_jobs: usize,
    /// Worker threads used by the dispatcher.
    pub num_worker_threads: usize,
    /// How decompression jobs are executed.
    pub dispatch_strategy: DispatchStrategy,
    /// I/O threads used by a [`FileReader`](crate::reader::FileReader).
    pub num_io_threads: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

impl StageConfig {
    /// Create a configuration with the given slot counts and default workers.
    #[must_use]
    pub fn new(max_num_reads: usize, max_num_jobs: usize) -> Self {
        Self {
            max_num_reads,
            max_num_jobs,
            num_worker_threads: 2,
            dispatch_strategy: DispatchStrategy::default(),
            num_io_threads: 2,
        }
    }

    /// Set the number of read slots.
    #[must_use]
    pub fn with_max_reads(mut self, max_num_reads: usize) -> Self {
        self.max_num_reads = max_num_reads;
        self
    }

    /// Set the number of job slots.
    #[must_use]
    pub fn with_max_jobs(mut self, max_num_jobs: usize) -> Self {
        self.max_num_jobs = max_num_jobs;
        self
    }

    /// Set the number of dispatcher worker threads.
    #[must_use]
    pub fn with_worker_threads(mut self, num_threads: usize) -> Self {
        self.num_worker_threads = num_threads;
        self
    }

    /// Set the dispatch strategy.
    #[must_use]
    pub fn with_dispatch_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.dispatch_strategy = strategy;
        self
    }

    /// Set the number of reader I/O threads.
    #[must_use]
    pub fn with_io_threads(mut self, num_threads: usize) -> Self {
        self.num_io_threads = num_threads;
        self
    }

    /// Check that every count is usable.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidParameter`] for a zero slot or thread count.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("max-reads", self.max_num_reads),
            ("max-jobs", self.max_num_jobs),
            ("io-threads", self.num_io_threads),
        ];
        for (parameter, value) in checks {
            if value == 0 {
                return Err(StreamError::InvalidParameter {
                    parameter: parameter.to_string(),
                    reason: "must be >= 1".to_string(),
                });
            }
        }
        if self.num_worker_threads == 0 && self.dispatch_strategy != DispatchStrategy::Inline {
            return Err(StreamError::InvalidParameter {
                parameter: "threads".to_string(),
                reason: format!("must be >= 1 for the {} strategy", self.dispatch_strategy),
            });
        }
        Ok(())
    }
}
