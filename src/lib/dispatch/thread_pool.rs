//! Dedicated worker threads fed by a crossbeam channel.

use crossbeam_channel::{Sender, unbounded};
use log::{debug, error};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use super::{Job, JobDispatcher, extract_panic_message};
use crate::errors::{Result, StreamError};

/// A fixed pool of named threads that pull jobs off a shared channel.
///
/// Dropping the pool closes the channel and joins the workers once they have
/// drained the jobs already submitted.
pub struct DedicatedPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl DedicatedPool {
    /// Spawn `num_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(num_threads: usize) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(num_threads);

        for thread_id in 0..num_threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("pakstream-decompress-{thread_id}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // A job that panics must not take the worker down with it.
                        if let Err(panic_info) = catch_unwind(AssertUnwindSafe(job)) {
                            error!(
                                "Decompression worker {thread_id} caught a panic: {}",
                                extract_panic_message(panic_info)
                            );
                        }
                    }
                    debug!("Decompression worker {thread_id} exiting");
                })
                .map_err(|e| {
                    StreamError::Internal(format!("failed to spawn worker {thread_id}: {e}"))
                })?;
            handles.push(handle);
        }

        Ok(Self { sender: Some(sender), handles })
    }
}

impl JobDispatcher for DedicatedPool {
    fn name(&self) -> &'static str {
        "dedicated"
    }

    fn submit(&self, job: Job) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(rejected) = sender.send(job) {
            // Every worker has exited; run the job here rather than lose its events.
            error!("Decompression workers are gone; running job on the submitting thread");
            (rejected.into_inner())();
        }
    }

    fn num_workers(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for DedicatedPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Decompression worker thread panicked");
            }
        }
    }
}
