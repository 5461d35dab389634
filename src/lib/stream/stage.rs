//! The bounded streaming decompression stage.
//!
//! [`DecompressionStage`] accepts read-then-decompress [`Request`]s and drives each
//! through a fixed number of read slots and decompression job slots:
//!
//! ```text
//! queue_request ──► pending_reads ──► read slot ──► pending_decompression ──► job slot ──► finished
//!                   (FIFO)            (reader)      (FIFO of read slots)      (workers)
//! ```
//!
//! All bookkeeping happens on the thread that owns the stage. Readers and workers
//! report back through a channel of [`StageEvent`]s which
//! [`execute_requests`](DecompressionStage::execute_requests) applies before starting
//! new work, so slot tables are never shared between threads.
//!
//! Running out of slots is never an error: work simply waits in FIFO order until a
//! slot frees up. Every failure is recorded on its request and the slot it held is
//! released.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, error, warn};
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::StageConfig;
use super::estimates::{SlotClock, TimingWindows};
use super::events::StageEvent;
use super::job_slots::DecompressionJobTable;
use super::pending::PendingQueue;
use super::read_buffers::{ReadBuffer, ReadBufferPool, ReadBufferStatus};
use super::request::{DecompressionMode, ReadRange, Request, RequestId, RequestStatus};
use crate::codec::{CompressionKind, Decompressor};
use crate::dispatch::{JobDispatcher, create_dispatcher, extract_panic_message};
use crate::errors::{Result, StreamError};
use crate::reader::{ReadCompletion, ReadIssuer, ReadOrder};
use crate::statistics::Statistic;

/// Name the stage reports its statistics under.
pub const STAGE_NAME: &str = "Decompressor";

/// Snapshot of how much work a stage holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStatus {
    /// Read slots without a read in flight.
    pub available_read_slots: usize,
    /// Job slots not holding a job.
    pub available_job_slots: usize,
    /// Requests waiting for a read slot.
    pub pending_reads: usize,
    /// Reads waiting for a job slot.
    pub pending_decompression: usize,
    /// Jobs queued or running.
    pub running_jobs: usize,
    /// True if the stage holds no work at all.
    pub idle: bool,
}

/// Work a decompression job carries to its worker.
struct DecompressionWork {
    job: usize,
    request: RequestId,
    mode: DecompressionMode,
    kind: CompressionKind,
    range: ReadRange,
    compressed: ReadBuffer,
    events: Sender<StageEvent>,
}

impl DecompressionWork {
    fn run(self) {
        let DecompressionWork { job, request, mode, kind, range, compressed, events } = self;

        if events.send(StageEvent::JobStarted { job, request, at: Instant::now() }).is_err() {
            debug!("Job for request {request} started after its stage was dropped");
            return;
        }

        let codec = kind.decompressor();
        let output = catch_unwind(AssertUnwindSafe(|| {
            decompress(codec, mode, compressed.as_slice(), range)
        }))
        .unwrap_or_else(|panic_info| {
            Err(StreamError::Decompression {
                codec: codec.name(),
                reason: format!("codec panicked: {}", extract_panic_message(panic_info)),
            })
        });

        let finished =
            StageEvent::JobFinished { job, request, compressed, output, finished_at: Instant::now() };
        if events.send(finished).is_err() {
            debug!("Job for request {request} finished after its stage was dropped");
        }
    }
}

/// Decode `range` of the payload into a new buffer.
fn decompress(
    codec: &dyn Decompressor,
    mode: DecompressionMode,
    compressed: &[u8],
    range: ReadRange,
) -> Result<Vec<u8>> {
    let mut output = vec![0u8; range.size];
    match mode {
        DecompressionMode::Full => codec.decompress_full(compressed, &mut output)?,
        DecompressionMode::Partial => codec.decompress_range(compressed, range.offset, &mut output)?,
    }
    Ok(output)
}

/// Check a request and work out how it has to be decompressed.
fn validate_request(request: &Request) -> std::result::Result<DecompressionMode, String> {
    let source = request.source();
    let range = request.range();

    if source.compressed_size == 0 {
        return Err("compressed size is zero".to_string());
    }
    if source.uncompressed_size == 0 {
        return Err("uncompressed size is zero".to_string());
    }
    if range.size == 0 {
        return Err("zero-length range".to_string());
    }
    let end = range
        .end()
        .ok_or_else(|| format!("range {}+{} overflows", range.offset, range.size))?;
    if end > source.uncompressed_size {
        return Err(format!(
            "range {}..{end} exceeds the {} byte entry",
            range.offset, source.uncompressed_size
        ));
    }
    if request.destination_len() < range.size {
        return Err(format!(
            "destination holds {} bytes, range needs {}",
            request.destination_len(),
            range.size
        ));
    }
    if source.kind == CompressionKind::Stored && source.compressed_size != source.uncompressed_size
    {
        return Err(format!(
            "stored entry sizes differ ({} compressed, {} uncompressed)",
            source.compressed_size, source.uncompressed_size
        ));
    }
    if source.offset.checked_add(source.compressed_size as u64).is_none() {
        return Err(format!("payload at offset {} overflows", source.offset));
    }

    if range.offset == 0 && range.size == source.uncompressed_size {
        Ok(DecompressionMode::Full)
    } else {
        Ok(DecompressionMode::Partial)
    }
}

fn set_estimate(request: &Request, at: Instant) {
    if !request.is_finished() {
        request.set_estimated_completion(at);
    }
}

/// A pipeline stage that reads compressed payloads and decompresses them with
/// bounded concurrency.
///
/// # Example
/// ```
/// use pakstream_lib::codec::CompressionKind;
/// use pakstream_lib::dispatch::InlineDispatcher;
/// use pakstream_lib::reader::MemoryReader;
/// use pakstream_lib::stream::{
///     CompressionInfo, DecompressionStage, Request, RequestStatus, StageConfig,
/// };
/// use std::sync::Arc;
///
/// let reader = MemoryReader::new().with_file("plain.pak", b"hello world".to_vec());
/// let mut stage =
///     DecompressionStage::new(StageConfig::new(1, 1), Box::new(reader), Arc::new(InlineDispatcher))
///         .unwrap();
///
/// let request = Request::whole_file(CompressionInfo {
///     archive: "plain.pak".into(),
///     offset: 0,
///     compressed_size: 11,
///     uncompressed_size: 11,
///     kind: CompressionKind::Stored,
/// });
/// stage.queue_request(request.clone());
/// while stage.execute_requests() {}
///
/// assert_eq!(stage.finalize_request(&request), RequestStatus::Completed);
/// assert_eq!(request.take_destination(), b"hello world");
/// ```
pub struct DecompressionStage {
    config: StageConfig,
    reader: Box<dyn ReadIssuer>,
    dispatcher: Arc<dyn JobDispatcher>,
    read_buffers: ReadBufferPool,
    jobs: DecompressionJobTable,
    pending_reads: PendingQueue<Request>,
    pending_decompression: PendingQueue<usize>,
    finished: Vec<Request>,
    timings: TimingWindows,
    num_completed: u64,
    num_failed: u64,
    events_tx: Sender<StageEvent>,
    events_rx: Receiver<StageEvent>,
}

impl DecompressionStage {
    /// Create a stage that reads through `reader` and decompresses on `dispatcher`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidParameter`] if `config` is invalid.
    pub fn new(
        config: StageConfig,
        reader: Box<dyn ReadIssuer>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = unbounded();
        debug!(
            "Creating decompression stage: {} read slots, {} job slots, {} dispatch with {} workers",
            config.max_num_reads,
            config.max_num_jobs,
            dispatcher.name(),
            dispatcher.num_workers()
        );
        Ok(Self {
            read_buffers: ReadBufferPool::new(config.max_num_reads),
            jobs: DecompressionJobTable::new(config.max_num_jobs),
            config,
            reader,
            dispatcher,
            pending_reads: PendingQueue::new(),
            pending_decompression: PendingQueue::new(),
            finished: Vec::new(),
            timings: TimingWindows::default(),
            num_completed: 0,
            num_failed: 0,
            events_tx,
            events_rx,
        })
    }

    /// Create a stage whose dispatcher is built from the configured strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the workers cannot be started.
    pub fn with_strategy(config: StageConfig, reader: Box<dyn ReadIssuer>) -> Result<Self> {
        let dispatcher = create_dispatcher(config.dispatch_strategy, config.num_worker_threads)?;
        Self::new(config, reader, dispatcher)
    }

    /// The stage's configuration.
    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Validate `request` and annotate its decompression mode.
    ///
    /// A malformed request is marked `Failed` with [`StreamError::InvalidRequest`].
    /// Only `Submitted` requests are examined; anything else is left untouched.
    /// Returns true if the request can be queued.
    pub fn prepare_request(&self, request: &Request) -> bool {
        let status = request.status();
        if status != RequestStatus::Submitted {
            debug!("Not preparing request {} while it is {status}", request.id());
            return false;
        }
        match validate_request(request) {
            Ok(mode) => {
                request.set_mode(mode);
                true
            }
            Err(reason) => {
                request.fail(StreamError::InvalidRequest { request: request.id(), reason });
                false
            }
        }
    }

    /// Submit a request.
    ///
    /// Unprepared requests are prepared first. A request that failed preparation
    /// goes straight to the finished list without occupying a slot. Returns false
    /// if the request was already queued or finished elsewhere and was ignored.
    pub fn queue_request(&mut self, request: Request) -> bool {
        if request.mode().is_none() {
            self.prepare_request(&request);
        }
        match request.status() {
            RequestStatus::Submitted => {
                request.set_status(RequestStatus::ReadPending);
                debug!("Queued request {} for {:?}", request.id(), request.source().archive);
                self.pending_reads.push_back(request);
                true
            }
            RequestStatus::Failed(_) if request.mode().is_none() => {
                self.num_failed += 1;
                self.finished.push(request);
                true
            }
            other => {
                warn!("Ignoring submission of request {} while it is {other}", request.id());
                false
            }
        }
    }

    /// Read slots that are not in flight.
    #[must_use]
    pub fn available_request_slots(&self) -> usize {
        self.config.max_num_reads.saturating_sub(self.read_buffers.num_in_flight())
    }

    /// Requests waiting for a read slot.
    #[must_use]
    pub fn num_pending_reads(&self) -> usize {
        self.pending_reads.len()
    }

    /// Apply completion events, then start decompressions and reads while slots are
    /// free. Returns true if anything happened.
    pub fn execute_requests(&mut self) -> bool {
        let mut progress = self.drain_events();
        progress |= self.start_decompressions();
        progress |= self.start_reads();

        #[cfg(feature = "profiling")]
        self.timings.record_duty_cycle(
            !self.pending_decompression.is_empty() && self.jobs.num_free() == 0,
            self.read_buffers.num_in_flight() == self.read_buffers.capacity(),
        );

        progress
    }

    /// Block until a completion event arrives or `timeout` elapses, and apply it.
    ///
    /// Returns immediately with false when nothing is in flight. Returns true if an
    /// event was applied.
    pub fn wait_for_events(&mut self, timeout: Duration) -> bool {
        if self.read_buffers.num_in_flight() == 0 && self.jobs.num_running() == 0 {
            return self.drain_events();
        }
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Requests that reached a terminal state since the last call, in completion order.
    pub fn take_finished(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.finished)
    }

    /// Release the stage's hold on a finished request and return its status.
    ///
    /// Failures are logged with their reason.
    pub fn finalize_request(&mut self, request: &Request) -> RequestStatus {
        if let Some(index) = self.finished.iter().position(|r| r.ptr_eq(request)) {
            self.finished.remove(index);
        }
        let status = request.status();
        match &status {
            RequestStatus::Completed => debug!("Request {} completed", request.id()),
            RequestStatus::Failed(e) => warn!("Request {} failed: {e}", request.id()),
            other => debug!("Finalizing request {} while it is {other}", request.id()),
        }
        status
    }

    /// Fill `status` with the stage's current occupancy.
    pub fn report_status(&self, status: &mut StageStatus) {
        *status = StageStatus {
            available_read_slots: self.available_request_slots(),
            available_job_slots: self.jobs.num_free(),
            pending_reads: self.pending_reads.len(),
            pending_decompression: self.pending_decompression.len(),
            running_jobs: self.jobs.num_running(),
            idle: self.is_idle(),
        };
    }

    /// True if no request is queued, reading, or decompressing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_reads.is_empty()
            && self.pending_decompression.is_empty()
            && self.jobs.num_running() == 0
            && self.read_buffers.is_idle()
    }

    /// Append the stage's statistics to `statistics`.
    pub fn collect_statistics(&self, statistics: &mut Vec<Statistic>) {
        let t = &self.timings;
        statistics.extend([
            Statistic::float(STAGE_NAME, "Decompression queue delay (avg. us)", t.avg_queue_delay_us()),
            Statistic::float(STAGE_NAME, "Decompression duration (avg. us)", t.avg_duration_us()),
            Statistic::float(
                STAGE_NAME,
                "Decompression speed per job (avg. MB/s)",
                t.throughput_mb_per_s(),
            ),
            Statistic::float(STAGE_NAME, "Read duration (avg. us)", t.avg_read_us()),
            Statistic::integer(
                STAGE_NAME,
                "Available decompression slots",
                self.jobs.num_free() as i64,
            ),
            Statistic::integer(
                STAGE_NAME,
                "Available read slots",
                self.available_request_slots() as i64,
            ),
            Statistic::integer(
                STAGE_NAME,
                "Pending decompression",
                self.pending_decompression.len() as i64,
            ),
            Statistic::integer(
                STAGE_NAME,
                "Buffer allocations",
                i64::try_from(self.read_buffers.allocations()).unwrap_or(i64::MAX),
            ),
            Statistic::integer(
                STAGE_NAME,
                "Peak pending reads",
                self.pending_reads.peak_len() as i64,
            ),
            Statistic::integer(
                STAGE_NAME,
                "Requests completed",
                i64::try_from(self.num_completed).unwrap_or(i64::MAX),
            ),
            Statistic::integer(
                STAGE_NAME,
                "Requests failed",
                i64::try_from(self.num_failed).unwrap_or(i64::MAX),
            ),
        ]);

        #[cfg(feature = "profiling")]
        statistics.extend([
            Statistic::percentage(STAGE_NAME, "Decompression bound", t.decompression_bound_fraction()),
            Statistic::percentage(STAGE_NAME, "Read bound", t.read_bound_fraction()),
        ]);
    }

    /// Write an advisory completion time onto every request the stage holds, then
    /// onto `internal_pending` and `external_pending` (in that order) as if they were
    /// queued behind it.
    ///
    /// Finished requests are skipped. Estimates never move earlier while the stage is
    /// stalled and its statistics are unchanged.
    pub fn update_completion_estimates(
        &self,
        now: Instant,
        internal_pending: &[Request],
        external_pending: &[Request],
    ) {
        let t = &self.timings;
        let queue_delay = t.avg_queue_delay();
        let read_time = t.avg_read_duration();

        // Jobs already holding a slot
        let mut job_free_at = Vec::with_capacity(self.jobs.capacity());
        for record in self.jobs.records() {
            let Some(request) = &record.wait_request else {
                job_free_at.push(now);
                continue;
            };
            let busy = t.decompression_time(record.output_len);
            let at = match record.started_at {
                Some(started) if record.is_processing() => (started + busy).max(now),
                _ => now + queue_delay + busy,
            };
            set_estimate(request, at);
            job_free_at.push(at);
        }
        let mut jobs = SlotClock::new(job_free_at, now);

        // Read slots: free now, or once their buffer moves into a job
        let mut read_free_at = vec![now; self.read_buffers.capacity()];
        let schedule_job = |jobs: &mut SlotClock, request: &Request, ready: Instant| {
            let busy = queue_delay + t.decompression_time(request.range().size);
            let (start, finish) = jobs.schedule(ready, busy);
            set_estimate(request, finish);
            start
        };

        for &slot in self.pending_decompression.iter() {
            if let Some(request) = self.read_buffers.slots().nth(slot).and_then(|s| s.request.as_ref())
            {
                read_free_at[slot] = schedule_job(&mut jobs, request, now);
            }
        }

        let mut in_flight: Vec<(usize, Instant, &Request)> = self
            .read_buffers
            .slots()
            .enumerate()
            .filter(|(_, s)| s.status == ReadBufferStatus::ReadInFlight)
            .filter_map(|(index, s)| {
                let issued = s.issued_at.unwrap_or(now);
                s.request.as_ref().map(|r| (index, (issued + read_time).max(now), r))
            })
            .collect();
        in_flight.sort_by_key(|(_, done, _)| *done);
        for (slot, read_done, request) in in_flight {
            read_free_at[slot] = schedule_job(&mut jobs, request, read_done);
        }

        // Everything still waiting for a read slot
        let mut reads = SlotClock::new(read_free_at, now);
        let waiting = self.pending_reads.iter().chain(internal_pending).chain(external_pending);
        for request in waiting {
            if request.is_finished() {
                continue;
            }
            let (slot, free_at) = reads.earliest();
            let read_done = free_at.max(now) + read_time;
            let job_start = schedule_job(&mut jobs, request, read_done);
            reads.set(slot, job_start);
        }
    }

    fn drain_events(&mut self) -> bool {
        let mut processed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            processed = true;
        }
        processed
    }

    fn handle_event(&mut self, event: StageEvent) {
        match event {
            StageEvent::ReadFinished { slot, request, buffer, result } => {
                self.finish_read_file(slot, request, buffer, result);
            }
            StageEvent::JobStarted { job, request, at } => {
                if let Err(e) = self.jobs.mark_started(job, request, at) {
                    error!("Ignoring job start: {e}");
                }
            }
            StageEvent::JobFinished { job, request, compressed, output, finished_at } => {
                self.finish_decompression(job, request, compressed, output, finished_at);
            }
        }
    }

    fn start_reads(&mut self) -> bool {
        let mut started = false;
        while !self.pending_reads.is_empty() {
            let Some(slot) = self.read_buffers.find_unused() else {
                break;
            };
            let Some(request) = self.pending_reads.pop_front() else {
                break;
            };
            self.start_read_file(slot, request);
            started = true;
        }
        started
    }

    fn start_read_file(&mut self, slot: usize, request: Request) {
        let source = request.source();
        let order = ReadOrder {
            path: source.archive.clone(),
            offset: source.offset,
            length: source.compressed_size,
        };
        match self.read_buffers.begin_read(slot, request.clone(), order.length, Instant::now()) {
            Ok(buffer) => {
                request.set_status(RequestStatus::ReadInFlight);
                debug!(
                    "Reading {} bytes at {} of {:?} for request {} into slot {slot}",
                    order.length,
                    order.offset,
                    order.path,
                    request.id()
                );
                let completion = ReadCompletion::new(slot, request.id(), self.events_tx.clone());
                self.reader.issue_read(order, buffer, completion);
            }
            Err(e) => self.finish_failed(request, e),
        }
    }

    fn finish_read_file(
        &mut self,
        slot: usize,
        request_id: RequestId,
        buffer: Option<ReadBuffer>,
        result: io::Result<usize>,
    ) {
        let now = Instant::now();
        let (buffer, error) = match (buffer, result) {
            (Some(buffer), Ok(n)) if n == buffer.len() => {
                match self.read_buffers.finish_read(slot, request_id, buffer, now) {
                    Ok((request, elapsed)) => {
                        self.timings.record_read(elapsed);
                        request.set_status(RequestStatus::PendingDecompression);
                        self.pending_decompression.push_back(slot);
                        debug!("Read for request {request_id} finished in slot {slot}");
                    }
                    Err(e) => error!("Dropping read completion: {e}"),
                }
                return;
            }
            (Some(buffer), Ok(n)) => {
                let message = format!("read {n} of {} bytes", buffer.len());
                (Some(buffer), io::Error::new(io::ErrorKind::UnexpectedEof, message))
            }
            (None, Ok(_)) => (None, io::Error::other("reader returned no buffer")),
            (buffer, Err(e)) => (buffer, e),
        };

        match self.read_buffers.fail_read(slot, request_id, buffer, now) {
            Ok((request, elapsed)) => {
                self.timings.record_read(elapsed);
                let failure = StreamError::read(&request.source().archive, &error);
                self.finish_failed(request, failure);
            }
            Err(e) => error!("Dropping failed read completion: {e}"),
        }
    }

    fn start_decompressions(&mut self) -> bool {
        let mut started = false;
        while let Some(&slot) = self.pending_decompression.front() {
            let Some(job) = self.jobs.find_free() else {
                break;
            };
            self.pending_decompression.pop_front();
            match self.read_buffers.take_for_decompression(slot) {
                Ok((request, buffer)) => {
                    self.start_decompression(job, slot, request, buffer);
                    started = true;
                }
                Err(e) => error!("Skipping pending decompression: {e}"),
            }
        }
        started
    }

    fn start_decompression(
        &mut self,
        job: usize,
        read_slot: usize,
        request: Request,
        buffer: ReadBuffer,
    ) {
        if let Err(e) = self.jobs.occupy(job, request.clone(), buffer.len(), read_slot, Instant::now())
        {
            self.read_buffers.recycle(buffer);
            self.finish_failed(request, e);
            return;
        }
        request.set_status(RequestStatus::DecompressionQueued);

        let source = request.source();
        let mode = request.mode().unwrap_or(DecompressionMode::Partial);
        debug!(
            "Queueing {mode:?} {} decompression of request {} ({} bytes) as job {job}",
            source.kind,
            request.id(),
            buffer.len()
        );
        let work = DecompressionWork {
            job,
            request: request.id(),
            mode,
            kind: source.kind,
            range: request.range(),
            compressed: buffer,
            events: self.events_tx.clone(),
        };
        self.dispatcher.submit(Box::new(move || work.run()));
    }

    fn finish_decompression(
        &mut self,
        job: usize,
        request_id: RequestId,
        compressed: ReadBuffer,
        output: Result<Vec<u8>>,
        finished_at: Instant,
    ) {
        self.read_buffers.recycle(compressed);
        let released = match self.jobs.release(job, request_id) {
            Ok(released) => released,
            Err(e) => {
                error!("Dropping job completion: {e}");
                return;
            }
        };

        let started_at = released.started_at.unwrap_or(released.queued_at);
        let delay = started_at.saturating_duration_since(released.queued_at);
        let request = released.request;
        match output {
            Ok(bytes) => {
                let duration = finished_at.saturating_duration_since(started_at);
                self.timings.record_job(delay, duration, bytes.len());
                request.complete_with(&bytes);
            }
            Err(e) => {
                self.timings.record_failed_job(delay);
                request.fail(e);
            }
        }

        if request.status() == RequestStatus::Completed {
            self.num_completed += 1;
            debug!(
                "Request {request_id} decompressed by job {job} ({} compressed bytes from read slot {})",
                released.compressed_len, released.read_slot
            );
        } else {
            self.num_failed += 1;
        }
        self.finished.push(request);
    }

    fn finish_failed(&mut self, request: Request, error: StreamError) {
        request.fail(error);
        self.num_failed += 1;
        self.finished.push(request);
    }
}
