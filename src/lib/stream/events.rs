//! Completion events sent to the stage's owning thread.
//!
//! Reader threads and decompression workers never touch the slot tables. They
//! report through a multi-producer channel and the owning thread applies the
//! events during `execute_requests`.

use std::io;
use std::time::Instant;

use super::read_buffers::ReadBuffer;
use super::request::RequestId;
use crate::errors::Result;

pub(crate) enum StageEvent {
    /// The reader finished filling (or failed to fill) a read slot's buffer. The
    /// buffer is missing when the reader dropped the read without completing it.
    ReadFinished {
        slot: usize,
        request: RequestId,
        buffer: Option<ReadBuffer>,
        result: io::Result<usize>,
    },
    /// A worker began running a decompression job.
    JobStarted { job: usize, request: RequestId, at: Instant },
    /// A worker finished a decompression job.
    JobFinished {
        job: usize,
        request: RequestId,
        compressed: ReadBuffer,
        output: Result<Vec<u8>>,
        finished_at: Instant,
    },
}

