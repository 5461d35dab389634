//! A reader and a dispatcher whose work only happens when the test says so.
//!
//! Together they let a test freeze the stage at any point: reads stay in flight
//! until completed through [`ReadControl`], and decompression jobs stay queued until
//! run through [`JobControl`].

#![allow(dead_code)]

use pakstream_lib::dispatch::{Job, JobDispatcher};
use pakstream_lib::reader::{ReadCompletion, ReadIssuer, ReadOrder};
use pakstream_lib::stream::ReadBuffer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// A read the stage issued that has not been completed yet.
pub struct PendingRead {
    pub order: ReadOrder,
    buffer: ReadBuffer,
    completion: ReadCompletion,
}

impl PendingRead {
    /// Address of the buffer the stage handed over for this read.
    pub fn buffer_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    /// Fill the buffer from `archive` and hand it back.
    pub fn complete_from(mut self, archive: &[u8]) {
        let start = self.order.offset as usize;
        let target = self.buffer.as_mut_slice();
        target.copy_from_slice(&archive[start..start + target.len()]);
        let len = target.len();
        self.completion.complete(self.buffer, Ok(len));
    }

    /// Hand the buffer back with an I/O error.
    pub fn fail(self, kind: io::ErrorKind) {
        self.completion.complete(self.buffer, Err(io::Error::from(kind)));
    }

    /// Drop the read without completing it, as a reader thread that dies would.
    pub fn abandon(self) {
        drop(self);
    }

    /// Hand the buffer back claiming only `n` bytes were read.
    pub fn complete_short(self, n: usize) {
        self.completion.complete(self.buffer, Ok(n));
    }
}

type ReadQueue = Arc<Mutex<VecDeque<PendingRead>>>;

/// Reader that parks every read until the test completes it.
pub struct ManualReader {
    reads: ReadQueue,
}

/// Test-side handle on a [`ManualReader`].
#[derive(Clone)]
pub struct ReadControl {
    reads: ReadQueue,
}

impl ManualReader {
    pub fn new() -> (Self, ReadControl) {
        let reads = ReadQueue::default();
        (Self { reads: reads.clone() }, ReadControl { reads })
    }
}

impl ReadIssuer for ManualReader {
    fn issue_read(&mut self, order: ReadOrder, buffer: ReadBuffer, completion: ReadCompletion) {
        self.reads.lock().push_back(PendingRead { order, buffer, completion });
    }
}

impl ReadControl {
    /// Reads issued and not yet completed.
    pub fn num_in_flight(&self) -> usize {
        self.reads.lock().len()
    }

    /// The oldest outstanding read.
    pub fn pop(&self) -> Option<PendingRead> {
        self.reads.lock().pop_front()
    }

    /// Complete every outstanding read from `archive`, returning how many there were.
    pub fn complete_all(&self, archive: &[u8]) -> usize {
        let reads: Vec<PendingRead> = self.reads.lock().drain(..).collect();
        let n = reads.len();
        for read in reads {
            read.complete_from(archive);
        }
        n
    }
}

type JobQueue = Arc<Mutex<VecDeque<Job>>>;

/// Dispatcher that queues jobs until the test runs them.
pub struct ManualDispatcher {
    jobs: JobQueue,
}

/// Test-side handle on a [`ManualDispatcher`].
#[derive(Clone)]
pub struct JobControl {
    jobs: JobQueue,
}

impl ManualDispatcher {
    pub fn new() -> (Arc<Self>, JobControl) {
        let jobs = JobQueue::default();
        (Arc::new(Self { jobs: jobs.clone() }), JobControl { jobs })
    }
}

impl JobDispatcher for ManualDispatcher {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn submit(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    fn num_workers(&self) -> usize {
        1
    }
}

impl JobControl {
    /// Jobs submitted and not yet run.
    pub fn num_queued(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run the oldest queued job. Returns false if there was none.
    pub fn run_next(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run every queued job, returning how many ran.
    pub fn run_all(&self) -> usize {
        let mut n = 0;
        while self.run_next() {
            n += 1;
        }
        n
    }
}
