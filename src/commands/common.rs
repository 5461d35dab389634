//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;

use clap::Args;

use pakstream_lib::dispatch::DispatchStrategy;
use pakstream_lib::stream::StageConfig;
use pakstream_lib::validation::{validate_files_exist, validate_positive};

/// Archive and manifest locations.
#[derive(Debug, Clone, Args)]
pub struct ArchiveOptions {
    /// Archive holding the entry payloads
    #[arg(short = 'a', long = "archive")]
    pub archive: PathBuf,

    /// TSV manifest describing the archive's entries
    #[arg(short = 'm', long = "manifest")]
    pub manifest: PathBuf,
}

impl ArchiveOptions {
    /// Validates that the archive and manifest exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either file does not exist.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_files_exist(&[(&self.archive, "Archive"), (&self.manifest, "Manifest")])?;
        Ok(())
    }
}

/// Slot counts and threading for the decompression stage.
#[derive(Debug, Clone, Args)]
pub struct StageOptions {
    /// Maximum number of concurrent reads
    #[arg(long = "max-reads", default_value = "2")]
    pub max_reads: usize,

    /// Maximum number of concurrent decompression jobs
    #[arg(long = "max-jobs", default_value = "2")]
    pub max_jobs: usize,

    /// Number of decompression worker threads
    #[arg(short = 't', long = "threads", default_value = "2")]
    pub threads: usize,

    /// Number of reader I/O threads
    #[arg(long = "io-threads", default_value = "2")]
    pub io_threads: usize,

    /// How decompression jobs are executed
    #[arg(long = "dispatch", value_enum, default_value_t = DispatchStrategy::Dedicated)]
    pub dispatch: DispatchStrategy,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            max_reads: 2,
            max_jobs: 2,
            threads: 2,
            io_threads: 2,
            dispatch: DispatchStrategy::Dedicated,
        }
    }
}

impl StageOptions {
    /// Validates the stage options.
    ///
    /// # Errors
    ///
    /// Returns an error if any count is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_positive(self.max_reads, "max-reads")?;
        validate_positive(self.max_jobs, "max-jobs")?;
        validate_positive(self.io_threads, "io-threads")?;
        if self.dispatch != DispatchStrategy::Inline {
            validate_positive(self.threads, "threads")?;
        }
        Ok(())
    }

    /// Builds the stage configuration.
    #[must_use]
    pub fn to_config(&self) -> StageConfig {
        StageConfig::new(self.max_reads, self.max_jobs)
            .with_worker_threads(self.threads)
            .with_io_threads(self.io_threads)
            .with_dispatch_strategy(self.dispatch)
    }
}

/// Options for writing statistics to a file.
#[derive(Debug, Clone, Default, Args)]
pub struct StatsOptions {
    /// Optional output file for stage statistics
    #[arg(short = 's', long = "stats")]
    pub stats: Option<PathBuf>,
}

impl StatsOptions {
    /// Returns true if stats output is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.stats.is_some()
    }
}
