//! Fixed pool of read slots and the buffers that move through them.
//!
//! Each slot walks `Unused → ReadInFlight → PendingDecompression → Unused`
//! (or `ReadInFlight → Unused` when the read fails). A slot borrows a
//! [`ReadBuffer`] for the duration of its read; when decompression starts the buffer
//! moves into the job and the slot is immediately free for the next read. Finished
//! buffers come back to the pool's recycle list, so the memory read into by one
//! request is reused by the next instead of being reallocated.

use log::debug;
use std::time::{Duration, Instant};

use super::request::{Request, RequestId};
use crate::errors::{Result, StreamError};

/// A uniquely owned byte buffer that a read fills and a decompression job consumes.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    data: Vec<u8>,
}

impl ReadBuffer {
    fn with_len(len: usize) -> Self {
        Self { data: vec![0u8; len] }
    }

    /// Resize to `len`, reusing the allocation when it is large enough.
    fn prepare(&mut self, len: usize) {
        self.data.resize(len, 0);
    }

    /// Number of bytes the buffer holds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes available to the allocation without growing it.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// The buffer contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The buffer contents, for the reader to fill.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Address of the allocation; identifies a buffer across reuse.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

/// State of a read slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBufferStatus {
    /// Free for a new read.
    Unused,
    /// The reader owns the slot's buffer.
    ReadInFlight,
    /// Read finished; waiting for a decompression job.
    PendingDecompression,
}

#[derive(Debug)]
pub(crate) struct ReadSlot {
    pub(crate) status: ReadBufferStatus,
    pub(crate) request: Option<Request>,
    buffer: Option<ReadBuffer>,
    pub(crate) issued_at: Option<Instant>,
}

impl ReadSlot {
    fn unused() -> Self {
        Self { status: ReadBufferStatus::Unused, request: None, buffer: None, issued_at: None }
    }
}

/// A fixed-size table of read slots plus the recycle list of idle buffers.
#[derive(Debug)]
pub struct ReadBufferPool {
    slots: Vec<ReadSlot>,
    spare: Vec<ReadBuffer>,
    in_flight: usize,
    allocations: u64,
}

impl ReadBufferPool {
    /// Create a pool with `max_reads` slots. Buffers are allocated lazily.
    #[must_use]
    pub fn new(max_reads: usize) -> Self {
        Self {
            slots: (0..max_reads).map(|_| ReadSlot::unused()).collect(),
            spare: Vec::new(),
            in_flight: 0,
            allocations: 0,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots whose read is in flight.
    #[must_use]
    pub fn num_in_flight(&self) -> usize {
        self.in_flight
    }

    /// Number of slots waiting for a decompression job.
    #[must_use]
    pub fn num_pending_decompression(&self) -> usize {
        self.slots.iter().filter(|s| s.status == ReadBufferStatus::PendingDecompression).count()
    }

    /// Number of buffers allocated over the pool's lifetime.
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Status of `slot`.
    #[must_use]
    pub fn status(&self, slot: usize) -> Option<ReadBufferStatus> {
        self.slots.get(slot).map(|s| s.status)
    }

    /// First slot with status `Unused`.
    #[must_use]
    pub fn find_unused(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.status == ReadBufferStatus::Unused)
    }

    /// True if every slot is `Unused` and no read is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.slots.iter().all(|s| s.status == ReadBufferStatus::Unused)
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &ReadSlot> {
        self.slots.iter()
    }

    /// Claim `slot` for `request` and hand out a buffer of `len` bytes for the read.
    pub(crate) fn begin_read(
        &mut self,
        slot: usize,
        request: Request,
        len: usize,
        now: Instant,
    ) -> Result<ReadBuffer> {
        let entry = Self::slot_mut(&mut self.slots, slot)?;
        if entry.status != ReadBufferStatus::Unused {
            return Err(StreamError::Internal(format!(
                "read slot {slot} is {:?}, expected Unused",
                entry.status
            )));
        }

        let mut buffer = match entry.buffer.take() {
            Some(buffer) => buffer,
            None => Self::take_spare(&mut self.spare, len).unwrap_or_else(|| {
                self.allocations += 1;
                debug!("Allocating read buffer #{} ({len} bytes)", self.allocations);
                ReadBuffer::with_len(len)
            }),
        };
        buffer.prepare(len);

        entry.status = ReadBufferStatus::ReadInFlight;
        entry.request = Some(request);
        entry.issued_at = Some(now);
        self.in_flight += 1;
        Ok(buffer)
    }

    /// Accept a successfully filled buffer back into `slot`.
    ///
    /// Returns the slot's request and how long the read took.
    pub(crate) fn finish_read(
        &mut self,
        slot: usize,
        request: RequestId,
        buffer: ReadBuffer,
        now: Instant,
    ) -> Result<(Request, Duration)> {
        if let Err(e) = self.check_in_flight(slot, request) {
            self.recycle(buffer);
            return Err(e);
        }
        let entry = &mut self.slots[slot];
        entry.status = ReadBufferStatus::PendingDecompression;
        entry.buffer = Some(buffer);
        self.in_flight -= 1;

        let elapsed = entry.issued_at.map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        let owner = entry.request.clone().ok_or_else(|| missing_request(slot))?;
        Ok((owner, elapsed))
    }

    /// Release `slot` after its read failed; the buffer, if the reader handed it
    /// back, goes to the recycle list.
    pub(crate) fn fail_read(
        &mut self,
        slot: usize,
        request: RequestId,
        buffer: Option<ReadBuffer>,
        now: Instant,
    ) -> Result<(Request, Duration)> {
        if let Some(buffer) = buffer {
            self.recycle(buffer);
        }
        self.check_in_flight(slot, request)?;
        self.in_flight -= 1;
        let entry = std::mem::replace(&mut self.slots[slot], ReadSlot::unused());
        let elapsed = entry.issued_at.map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        let owner = entry.request.ok_or_else(|| missing_request(slot))?;
        Ok((owner, elapsed))
    }

    /// Move the filled buffer out of a `PendingDecompression` slot and free the slot.
    pub(crate) fn take_for_decompression(&mut self, slot: usize) -> Result<(Request, ReadBuffer)> {
        let entry = Self::slot_mut(&mut self.slots, slot)?;
        if entry.status != ReadBufferStatus::PendingDecompression {
            return Err(StreamError::Internal(format!(
                "read slot {slot} is {:?}, expected PendingDecompression",
                entry.status
            )));
        }
        let entry = std::mem::replace(entry, ReadSlot::unused());
        match (entry.request, entry.buffer) {
            (Some(request), Some(buffer)) => Ok((request, buffer)),
            (_, buffer) => {
                if let Some(buffer) = buffer {
                    self.recycle(buffer);
                }
                Err(StreamError::Internal(format!("read slot {slot} lost its request or buffer")))
            }
        }
    }

    /// Return a buffer for reuse by a later read.
    pub(crate) fn recycle(&mut self, buffer: ReadBuffer) {
        self.spare.push(buffer);
    }

    fn check_in_flight(&self, slot: usize, request: RequestId) -> Result<()> {
        let entry = self
            .slots
            .get(slot)
            .ok_or_else(|| StreamError::Internal(format!("read slot {slot} does not exist")))?;
        if entry.status != ReadBufferStatus::ReadInFlight {
            return Err(StreamError::Internal(format!(
                "read slot {slot} is {:?}, expected ReadInFlight",
                entry.status
            )));
        }
        match &entry.request {
            Some(owner) if owner.id() == request => Ok(()),
            _ => Err(StreamError::Internal(format!(
                "read slot {slot} does not hold request {request}"
            ))),
        }
    }

    fn slot_mut(slots: &mut [ReadSlot], slot: usize) -> Result<&mut ReadSlot> {
        slots
            .get_mut(slot)
            .ok_or_else(|| StreamError::Internal(format!("read slot {slot} does not exist")))
    }

    /// Best-fitting spare buffer: the smallest one that already holds `len` bytes,
    /// else the largest one.
    fn take_spare(spare: &mut Vec<ReadBuffer>, len: usize) -> Option<ReadBuffer> {
        let fitting = spare
            .iter()
            .enumerate()
            .filter(|(_, b)| b.capacity() >= len)
            .min_by_key(|(_, b)| b.capacity())
            .map(|(i, _)| i);
        let index = fitting.or_else(|| {
            spare.iter().enumerate().max_by_key(|(_, b)| b.capacity()).map(|(i, _)| i)
        })?;
        Some(spare.swap_remove(index))
    }
}

fn missing_request(slot: usize) -> StreamError {
    StreamError::Internal(format!("read slot {slot} has no request"))
}
