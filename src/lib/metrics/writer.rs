//! Utilities for writing metrics files.
//!
//! This module provides convenience functions for writing metrics to TSV files
//! with consistent error handling.

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use serde::Serialize;
use std::path::Path;

use super::StatisticRow;
use crate::statistics::Statistic;

/// Write metrics to a TSV file with consistent error handling.
///
/// # Arguments
/// * `path` - Path to the output TSV file
/// * `metrics` - The metrics to write (must implement Serialize)
/// * `description` - Human-readable description of the metrics for error messages
///
/// # Errors
/// Returns an error if the file cannot be created or written to
pub fn write_metrics<P: AsRef<Path>, T: Serialize>(
    path: P,
    metrics: &[T],
    description: &str,
) -> Result<()> {
    let path_ref = path.as_ref();
    DelimFile::default()
        .write_tsv(&path_ref, metrics)
        .with_context(|| format!("Failed to write {} metrics: {}", description, path_ref.display()))
}

/// Write stage statistics to a TSV file, one row per statistic.
///
/// # Errors
/// Returns an error if the file cannot be created or written to
///
/// # Example
/// ```no_run
/// use pakstream_lib::metrics::writer::write_statistics;
/// use pakstream_lib::statistics::Statistic;
///
/// let stats = vec![Statistic::integer("Decompressor", "Buffer allocations", 2)];
/// write_statistics("stats.tsv", &stats).unwrap();
/// ```
pub fn write_statistics<P: AsRef<Path>>(path: P, statistics: &[Statistic]) -> Result<()> {
    let rows: Vec<StatisticRow> = statistics.iter().map(StatisticRow::from).collect();
    write_metrics(path, &rows, "stage statistics")
}
