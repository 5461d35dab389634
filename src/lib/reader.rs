//! Disk reads of compressed payloads.
//!
//! The stage issues a [`ReadOrder`] together with the buffer to fill and a
//! [`ReadCompletion`] token. The reader fills the buffer on whatever thread it likes
//! and hands both back through [`ReadCompletion::complete`], which routes them to
//! the stage's owning thread.

use crossbeam_channel::{Sender, unbounded};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::errors::{Result, StreamError};
use crate::stream::events::StageEvent;
use crate::stream::{ReadBuffer, RequestId};

/// A byte range of a file to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOrder {
    /// File to read from.
    pub path: PathBuf,
    /// Byte offset of the first byte.
    pub offset: u64,
    /// Number of bytes to read; equals the buffer length.
    pub length: usize,
}

/// One-shot token that returns a filled buffer to the stage that issued the read.
///
/// Dropping the token without calling [`complete`](Self::complete) reports the
/// read as abandoned, so its slot is released and the request fails.
pub struct ReadCompletion {
    slot: usize,
    request: RequestId,
    events: Option<Sender<StageEvent>>,
}

impl ReadCompletion {
    pub(crate) fn new(slot: usize, request: RequestId, events: Sender<StageEvent>) -> Self {
        Self { slot, request, events: Some(events) }
    }

    /// The request this read belongs to.
    #[must_use]
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Hand `buffer` back with the number of bytes read, or the error that stopped
    /// the read.
    pub fn complete(mut self, buffer: ReadBuffer, result: io::Result<usize>) {
        let event = StageEvent::ReadFinished {
            slot: self.slot,
            request: self.request,
            buffer: Some(buffer),
            result,
        };
        self.send(event);
    }

    fn send(&mut self, event: StageEvent) {
        let Some(events) = self.events.take() else {
            return;
        };
        if events.send(event).is_err() {
            debug!("Read for request {} finished after its stage was dropped", self.request);
        }
    }
}

impl Drop for ReadCompletion {
    fn drop(&mut self) {
        if self.events.is_none() {
            return;
        }
        warn!("Read for request {} was dropped before it completed", self.request);
        let event = StageEvent::ReadFinished {
            slot: self.slot,
            request: self.request,
            buffer: None,
            result: Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "reader dropped the read before completing it",
            )),
        };
        self.send(event);
    }
}

/// Issues asynchronous reads on behalf of the stage.
pub trait ReadIssuer: Send {
    /// Start reading `order` into `buffer`; call `completion.complete` when done.
    ///
    /// Must not block until the read finishes, although synchronous readers may
    /// complete before returning.
    fn issue_read(&mut self, order: ReadOrder, buffer: ReadBuffer, completion: ReadCompletion);
}

/// Read `order.length` bytes at `order.offset` of `order.path` into `buffer`.
fn read_range(order: &ReadOrder, buffer: &mut ReadBuffer) -> io::Result<usize> {
    let mut file = File::open(&order.path)?;
    file.seek(SeekFrom::Start(order.offset))?;
    let target = buffer.as_mut_slice();
    file.read_exact(target)?;
    Ok(target.len())
}

type ReadWork = (ReadOrder, ReadBuffer, ReadCompletion);

/// A small pool of I/O threads reading byte ranges from files.
pub struct FileReader {
    sender: Option<Sender<ReadWork>>,
    handles: Vec<JoinHandle<()>>,
}

impl FileReader {
    /// Spawn `num_threads` I/O threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `num_threads` is zero or a thread cannot be spawned.
    pub fn new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(StreamError::InvalidParameter {
                parameter: "io-threads".to_string(),
                reason: "must be >= 1".to_string(),
            });
        }

        let (sender, receiver) = unbounded::<ReadWork>();
        let mut handles = Vec::with_capacity(num_threads);
        for thread_id in 0..num_threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("pakstream-read-{thread_id}"))
                .spawn(move || {
                    while let Ok((order, mut buffer, completion)) = receiver.recv() {
                        let result = read_range(&order, &mut buffer);
                        completion.complete(buffer, result);
                    }
                })
                .map_err(|e| {
                    StreamError::Internal(format!("failed to spawn reader {thread_id}: {e}"))
                })?;
            handles.push(handle);
        }
        Ok(Self { sender: Some(sender), handles })
    }
}

impl ReadIssuer for FileReader {
    fn issue_read(&mut self, order: ReadOrder, buffer: ReadBuffer, completion: ReadCompletion) {
        let Some(sender) = &self.sender else {
            completion.complete(buffer, Err(io::Error::other("reader is shut down")));
            return;
        };
        if let Err(rejected) = sender.send((order, buffer, completion)) {
            let (_, buffer, completion) = rejected.into_inner();
            completion.complete(buffer, Err(io::Error::other("reader threads have exited")));
        }
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Reader thread panicked");
            }
        }
    }
}

/// Serves reads from in-memory files, completing each read before returning.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, Arc<[u8]>>,
}

impl MemoryReader {
    /// Create a reader with no files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` as the contents of `path`.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> Self {
        self.insert(path, data);
        self
    }

    /// Register `data` as the contents of `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) {
        self.files.insert(path.into(), data.into());
    }

    fn read(&self, order: &ReadOrder, buffer: &mut ReadBuffer) -> io::Result<usize> {
        let data = self.files.get(&order.path).ok_or_else(|| not_found(&order.path))?;
        let start = usize::try_from(order.offset).map_err(io::Error::other)?;
        let target = buffer.as_mut_slice();
        let source = start
            .checked_add(target.len())
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        target.copy_from_slice(source);
        Ok(target.len())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} is not loaded", path.display()))
}

impl ReadIssuer for MemoryReader {
    fn issue_read(&mut self, order: ReadOrder, mut buffer: ReadBuffer, completion: ReadCompletion) {
        let result = self.read(&order, &mut buffer);
        completion.complete(buffer, result);
    }
}
