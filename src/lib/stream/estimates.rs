//! Timing history and the completion-estimate model.
//!
//! The stage records one sample per finished read and per finished decompression
//! job. Estimates are built from those averages by replaying the current queues
//! against a clock per slot: each piece of work takes the slot that frees up
//! first, starts no earlier than its input is ready, and holds the slot for its
//! expected duration.

use std::time::{Duration, Instant};

use crate::statistics::{AverageWindow, DEFAULT_WINDOW_SIZE};

type Window = AverageWindow<DEFAULT_WINDOW_SIZE>;

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn from_micros(us: f64) -> Duration {
    if us.is_finite() && us > 0.0 { Duration::from_secs_f64(us / 1_000_000.0) } else { Duration::ZERO }
}

/// Rolling windows of the stage's recent timings.
#[derive(Debug, Clone, Default)]
pub(crate) struct TimingWindows {
    queue_delay_us: Window,
    duration_us: Window,
    bytes_per_job: Window,
    read_us: Window,
    #[cfg(feature = "profiling")]
    decompression_bound: Window,
    #[cfg(feature = "profiling")]
    read_bound: Window,
}

impl TimingWindows {
    /// Record a job that waited `delay` before starting and ran for `duration`,
    /// producing `bytes` of output.
    pub(crate) fn record_job(&mut self, delay: Duration, duration: Duration, bytes: usize) {
        self.queue_delay_us.push(micros(delay));
        self.duration_us.push(micros(duration));
        self.bytes_per_job.push(bytes as u64);
    }

    /// Record a job that failed; only its queue delay says anything about the pool.
    pub(crate) fn record_failed_job(&mut self, delay: Duration) {
        self.queue_delay_us.push(micros(delay));
    }

    pub(crate) fn record_read(&mut self, duration: Duration) {
        self.read_us.push(micros(duration));
    }

    pub(crate) fn avg_queue_delay_us(&self) -> f64 {
        self.queue_delay_us.average()
    }

    pub(crate) fn avg_duration_us(&self) -> f64 {
        self.duration_us.average()
    }

    pub(crate) fn avg_read_us(&self) -> f64 {
        self.read_us.average()
    }

    /// Decompressed bytes per microsecond across the window, which is also MB/s.
    pub(crate) fn throughput_mb_per_s(&self) -> f64 {
        let total_us = self.duration_us.total();
        if total_us == 0 { 0.0 } else { self.bytes_per_job.total() as f64 / total_us as f64 }
    }

    pub(crate) fn avg_queue_delay(&self) -> Duration {
        from_micros(self.avg_queue_delay_us())
    }

    pub(crate) fn avg_read_duration(&self) -> Duration {
        from_micros(self.avg_read_us())
    }

    /// Expected time to decompress `bytes` of output.
    ///
    /// Uses the window's throughput; without a measurable throughput falls back to
    /// the average job duration (zero when nothing has been recorded).
    pub(crate) fn decompression_time(&self, bytes: usize) -> Duration {
        let throughput = self.throughput_mb_per_s();
        if throughput > 0.0 {
            from_micros(bytes as f64 / throughput)
        } else {
            from_micros(self.avg_duration_us())
        }
    }

    #[cfg(feature = "profiling")]
    pub(crate) fn record_duty_cycle(&mut self, decompression_bound: bool, read_bound: bool) {
        self.decompression_bound.push(u64::from(decompression_bound));
        self.read_bound.push(u64::from(read_bound));
    }

    #[cfg(feature = "profiling")]
    pub(crate) fn decompression_bound_fraction(&self) -> f64 {
        self.decompression_bound.average()
    }

    #[cfg(feature = "profiling")]
    pub(crate) fn read_bound_fraction(&self) -> f64 {
        self.read_bound.average()
    }
}

/// The time at which each slot of a fixed table is next free.
#[derive(Debug, Clone)]
pub(crate) struct SlotClock {
    free_at: Vec<Instant>,
}

impl SlotClock {
    /// A clock over the given free-at times; an empty table behaves as one free slot.
    pub(crate) fn new(mut free_at: Vec<Instant>, now: Instant) -> Self {
        if free_at.is_empty() {
            free_at.push(now);
        }
        Self { free_at }
    }

    /// The slot that frees up first and when.
    pub(crate) fn earliest(&self) -> (usize, Instant) {
        let mut best = (0, self.free_at[0]);
        for (index, at) in self.free_at.iter().enumerate().skip(1) {
            if *at < best.1 {
                best = (index, *at);
            }
        }
        best
    }

    pub(crate) fn set(&mut self, index: usize, at: Instant) {
        if let Some(slot) = self.free_at.get_mut(index) {
            *slot = at;
        }
    }

    /// Place work that is ready at `ready` and runs for `busy` on the earliest free
    /// slot. Returns when it starts and when it finishes.
    pub(crate) fn schedule(&mut self, ready: Instant, busy: Duration) -> (Instant, Instant) {
        let (index, free_at) = self.earliest();
        let start = free_at.max(ready);
        let finish = start + busy;
        self.set(index, finish);
        (start, finish)
    }
}
