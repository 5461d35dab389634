//! Progress tracking utilities
//!
//! A thread-safe tracker that counts finished requests and delivered bytes and
//! logs a progress line each time the request count crosses an interval boundary.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::logging::{format_bytes, format_count};

/// Thread-safe progress tracker for logging at regular request intervals.
///
/// # Example
/// ```
/// use pakstream_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Streamed").with_interval(100);
///
/// for _ in 0..250 {
///     tracker.record(1, 4096); // Logs at 100 and 200 requests
/// }
/// tracker.log_final(); // Logs "Streamed 250 requests (1000.0 KiB) (complete)"
/// assert_eq!(tracker.count(), 250);
/// ```
pub struct ProgressTracker {
    /// Progress is logged when the request count crosses multiples of this.
    interval: u64,
    /// Message prefix for log output.
    message: String,
    requests: AtomicU64,
    bytes: AtomicU64,
}

impl ProgressTracker {
    /// Create a tracker with a default interval of 1,000 requests.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: 1_000,
            message: message.into(),
            requests: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Set the logging interval (clamped to at least 1).
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add `requests` finished requests delivering `bytes` bytes, logging once for
    /// each interval boundary crossed.
    ///
    /// Returns `true` if the request count now sits exactly on an interval boundary.
    pub fn record(&self, requests: u64, bytes: u64) -> bool {
        let total_bytes = self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if requests == 0 {
            let count = self.count();
            return count > 0 && count.is_multiple_of(self.interval);
        }

        let prev = self.requests.fetch_add(requests, Ordering::Relaxed);
        let new_count = prev + requests;
        for i in (prev / self.interval + 1)..=(new_count / self.interval) {
            info!(
                "{} {} requests ({})",
                self.message,
                format_count(i * self.interval),
                format_bytes(total_bytes)
            );
        }
        new_count.is_multiple_of(self.interval)
    }

    /// Log the final totals unless the last `record` call already did.
    pub fn log_final(&self) {
        if !self.record(0, 0) {
            let count = self.count();
            if count > 0 {
                info!(
                    "{} {} requests ({}) (complete)",
                    self.message,
                    format_count(count),
                    format_bytes(self.bytes())
                );
            }
        }
    }

    /// Requests recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Bytes recorded so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
