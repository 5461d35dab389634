//! Fixed table of decompression job records.
//!
//! A record is in use exactly while it holds a wait request. The compressed buffer
//! itself travels with the submitted work and comes back in the job's
//! [`StageEvent::JobFinished`](super::events::StageEvent) event, so the table only
//! keeps the bookkeeping the owning thread needs for estimates and statistics.

use std::time::Instant;

use super::request::{Request, RequestId, RequestStatus};
use crate::errors::{Result, StreamError};

/// Bookkeeping for one decompression job.
#[derive(Debug)]
pub(crate) struct JobRecord {
    pub(crate) wait_request: Option<Request>,
    /// Bytes of compressed input the job consumes.
    pub(crate) compressed_len: usize,
    /// Bytes of output the job produces; the estimate model works on these.
    pub(crate) output_len: usize,
    pub(crate) queued_at: Option<Instant>,
    pub(crate) started_at: Option<Instant>,
    /// Read slot the compressed buffer came from.
    pub(crate) read_slot: usize,
}

impl JobRecord {
    fn free() -> Self {
        Self {
            wait_request: None,
            compressed_len: 0,
            output_len: 0,
            queued_at: None,
            started_at: None,
            read_slot: 0,
        }
    }

    pub(crate) fn in_use(&self) -> bool {
        self.wait_request.is_some()
    }

    pub(crate) fn is_processing(&self) -> bool {
        self.in_use() && self.started_at.is_some()
    }
}

/// What the table hands back when a job is released.
#[derive(Debug)]
pub(crate) struct ReleasedJob {
    pub(crate) request: Request,
    pub(crate) compressed_len: usize,
    pub(crate) read_slot: usize,
    pub(crate) queued_at: Instant,
    pub(crate) started_at: Option<Instant>,
}

#[derive(Debug)]
pub(crate) struct DecompressionJobTable {
    records: Vec<JobRecord>,
    running: usize,
}

impl DecompressionJobTable {
    pub(crate) fn new(max_jobs: usize) -> Self {
        Self { records: (0..max_jobs).map(|_| JobRecord::free()).collect(), running: 0 }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Jobs submitted and not yet finished.
    pub(crate) fn num_running(&self) -> usize {
        self.running
    }

    pub(crate) fn num_free(&self) -> usize {
        self.records.len() - self.running
    }

    pub(crate) fn find_free(&self) -> Option<usize> {
        self.records.iter().position(|r| !r.in_use())
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter()
    }

    /// Claim record `job` for `request`.
    pub(crate) fn occupy(
        &mut self,
        job: usize,
        request: Request,
        compressed_len: usize,
        read_slot: usize,
        now: Instant,
    ) -> Result<()> {
        let record = self.record_mut(job)?;
        if record.in_use() {
            return Err(StreamError::Internal(format!("job slot {job} is already in use")));
        }
        *record = JobRecord {
            output_len: request.range().size,
            wait_request: Some(request),
            compressed_len,
            queued_at: Some(now),
            started_at: None,
            read_slot,
        };
        self.running += 1;
        Ok(())
    }

    /// Record that a worker picked up the job.
    pub(crate) fn mark_started(&mut self, job: usize, request: RequestId, at: Instant) -> Result<()> {
        let record = self.held_by(job, request)?;
        record.started_at = Some(at);
        if let Some(req) = &record.wait_request {
            req.set_status(RequestStatus::Decompressing);
        }
        Ok(())
    }

    /// Free record `job` and return what it held.
    pub(crate) fn release(&mut self, job: usize, request: RequestId) -> Result<ReleasedJob> {
        let record = std::mem::replace(self.held_by(job, request)?, JobRecord::free());
        self.running -= 1;
        let queued_at = record
            .queued_at
            .ok_or_else(|| StreamError::Internal(format!("job slot {job} has no queue time")))?;
        let request = record
            .wait_request
            .ok_or_else(|| StreamError::Internal(format!("job slot {job} has no request")))?;
        Ok(ReleasedJob {
            request,
            compressed_len: record.compressed_len,
            read_slot: record.read_slot,
            queued_at,
            started_at: record.started_at,
        })
    }

    fn record_mut(&mut self, job: usize) -> Result<&mut JobRecord> {
        self.records
            .get_mut(job)
            .ok_or_else(|| StreamError::Internal(format!("job slot {job} does not exist")))
    }

    fn held_by(&mut self, job: usize, request: RequestId) -> Result<&mut JobRecord> {
        let record = self.record_mut(job)?;
        match &record.wait_request {
            Some(owner) if owner.id() == request => Ok(record),
            _ => Err(StreamError::Internal(format!(
                "job slot {job} does not hold request {request}"
            ))),
        }
    }
}
