//! Formatting and logging helpers for human-readable summaries.
//!
//! This module provides consistent formatting of counts, sizes, durations and
//! rates, plus helpers that log a stage's statistics and an operation's timing.

use std::time::{Duration, Instant};

use crate::statistics::Statistic;

/// Formats a percentage with specified decimal places.
///
/// # Examples
///
/// ```
/// use pakstream_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use pakstream_lib::logging::format_count;
///
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// assert_eq!(format_count(12), "12");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a byte count using binary units.
///
/// # Examples
///
/// ```
/// use pakstream_lib::logging::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KiB");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MiB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1} {unit}")
}

/// Formats a duration in human-readable form.
///
/// Durations under a second are shown in milliseconds.
///
/// # Examples
///
/// ```
/// use pakstream_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a data rate (bytes per second).
///
/// # Examples
///
/// ```
/// use pakstream_lib::logging::format_rate;
/// use std::time::Duration;
///
/// assert_eq!(format_rate(2 * 1024 * 1024, Duration::from_secs(1)), "2.0 MiB/s");
/// assert_eq!(format_rate(600, Duration::from_secs(60)), "10 B/s");
/// ```
#[must_use]
pub fn format_rate(bytes: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{}/s", format_bytes(bytes));
    }
    format!("{}/s", format_bytes((bytes as f64 / secs) as u64))
}

/// Logs every statistic, grouped under its owner.
///
/// # Examples
///
/// ```no_run
/// use pakstream_lib::logging::log_statistics;
/// use pakstream_lib::statistics::Statistic;
///
/// log_statistics(&[Statistic::integer("Decompressor", "Buffer allocations", 2)]);
/// ```
pub fn log_statistics(statistics: &[Statistic]) {
    let mut owner: Option<&str> = None;
    for stat in statistics {
        if owner != Some(stat.owner.as_str()) {
            log::info!("{} statistics:", stat.owner);
            owner = Some(stat.owner.as_str());
        }
        log::info!("  {}: {}", stat.name, stat.value);
    }
}

/// Operation timing and summary helper.
///
/// # Examples
///
/// ```no_run
/// use pakstream_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Streaming archive");
///
/// // ... do work ...
///
/// timer.log_completion(42, 10 * 1024 * 1024);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Time since the timer was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the completion with a request count, data volume and rate.
    pub fn log_completion(&self, requests: u64, bytes: u64) {
        let duration = self.elapsed();
        log::info!(
            "{} completed: {} requests, {} in {} ({})",
            self.operation,
            format_count(requests),
            format_bytes(bytes),
            format_duration(duration),
            format_rate(bytes, duration)
        );
    }
}
