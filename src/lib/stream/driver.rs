//! Run-to-completion pump for a [`DecompressionStage`].
//!
//! The driver plays the part of the upstream pipeline: it holds the requests the
//! stage has not yet accepted, feeds them in as read slots open up, pumps
//! `execute_requests`, finalizes whatever finishes, and periodically refreshes the
//! completion estimates of everything still waiting. When a pass makes no progress
//! it blocks on the stage's event channel instead of spinning.

use log::{debug, error};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::request::{Request, RequestStatus};
use super::stage::DecompressionStage;
use crate::progress::ProgressTracker;

/// Tuning for [`StreamDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// How often completion estimates are refreshed.
    pub estimate_interval: Duration,
    /// Longest a single idle wait blocks.
    pub idle_wait: Duration,
    /// Finished requests between progress log lines.
    pub progress_interval: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            estimate_interval: Duration::from_millis(50),
            idle_wait: Duration::from_millis(20),
            progress_interval: 1_000,
        }
    }
}

/// Outcome of a driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSummary {
    /// Requests that completed.
    pub completed: u64,
    /// Requests that failed.
    pub failed: u64,
    /// Bytes delivered into destinations of completed requests.
    pub bytes_delivered: u64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl DriverSummary {
    /// True if no request failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Feeds a sequence of requests through a stage until all of them finish.
pub struct StreamDriver<'a> {
    stage: &'a mut DecompressionStage,
    options: DriverOptions,
}

impl<'a> StreamDriver<'a> {
    /// Create a driver over `stage`.
    #[must_use]
    pub fn new(stage: &'a mut DecompressionStage, options: DriverOptions) -> Self {
        Self { stage, options }
    }

    /// Run every request to a terminal state.
    ///
    /// `on_finished` is called on the driving thread once per request, in
    /// completion order, with the request's terminal status.
    pub fn run<I, F>(&mut self, requests: I, mut on_finished: F) -> DriverSummary
    where
        I: IntoIterator<Item = Request>,
        F: FnMut(Request, RequestStatus),
    {
        let start = Instant::now();
        let progress =
            ProgressTracker::new("Streamed").with_interval(self.options.progress_interval);
        let mut upstream: VecDeque<Request> = requests.into_iter().collect();
        let mut outstanding = 0usize;
        let mut summary = DriverSummary::default();
        let mut last_estimate: Option<Instant> = None;

        debug!("Driving {} requests through the stage", upstream.len());
        loop {
            // Only hand over as many requests as there are read slots to take them.
            let budget = self
                .stage
                .available_request_slots()
                .saturating_sub(self.stage.num_pending_reads());
            for _ in 0..budget {
                let Some(request) = upstream.pop_front() else {
                    break;
                };
                if self.stage.queue_request(request.clone()) {
                    outstanding += 1;
                } else {
                    let status = request.status();
                    Self::tally(&mut summary, &progress, &request, &status);
                    on_finished(request, status);
                }
            }

            let progressed = self.stage.execute_requests();

            for request in self.stage.take_finished() {
                let status = self.stage.finalize_request(&request);
                outstanding = outstanding.saturating_sub(1);
                Self::tally(&mut summary, &progress, &request, &status);
                on_finished(request, status);
            }

            if upstream.is_empty() && outstanding == 0 {
                break;
            }

            let now = Instant::now();
            if last_estimate.is_none_or(|t| now.duration_since(t) >= self.options.estimate_interval)
            {
                self.stage.update_completion_estimates(now, &[], upstream.make_contiguous());
                last_estimate = Some(now);
            }

            if !progressed
                && !self.stage.wait_for_events(self.options.idle_wait)
                && upstream.is_empty()
                && self.stage.is_idle()
            {
                error!("Stage went idle with {outstanding} requests unaccounted for");
                break;
            }
        }

        progress.log_final();
        summary.elapsed = start.elapsed();
        summary
    }

    fn tally(
        summary: &mut DriverSummary,
        progress: &ProgressTracker,
        request: &Request,
        status: &RequestStatus,
    ) {
        if *status == RequestStatus::Completed {
            let bytes = request.range().size as u64;
            summary.completed += 1;
            summary.bytes_delivered += bytes;
            progress.record(1, bytes);
        } else {
            summary.failed += 1;
            progress.record(1, 0);
        }
    }
}
