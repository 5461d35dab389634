//! Read-and-decompress requests.
//!
//! A [`Request`] is a cheap, cloneable handle. The caller keeps one clone to observe
//! the outcome; the stage keeps another while the request occupies a queue or slot.
//! The stage only ever updates the status, the annotated mode, the destination
//! contents, and the advisory completion estimate.

use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::codec::CompressionKind;
use crate::errors::StreamError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        RequestId(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an entry's compressed payload lives and how it is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionInfo {
    /// Archive (or plain file) holding the payload.
    pub archive: PathBuf,
    /// Byte offset of the payload within the archive.
    pub offset: u64,
    /// Size of the payload as stored.
    pub compressed_size: usize,
    /// Size of the entry once decompressed.
    pub uncompressed_size: usize,
    /// Codec the payload was written with.
    pub kind: CompressionKind,
}

/// A byte range within the uncompressed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRange {
    /// First byte of the range.
    pub offset: usize,
    /// Number of bytes in the range.
    pub size: usize,
}

impl ReadRange {
    /// Create a range.
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// One past the last byte, or `None` on overflow.
    #[must_use]
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.size)
    }
}

/// How much of the payload a decompression job has to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressionMode {
    /// The request covers the whole entry; decode it in one pass.
    Full,
    /// The request covers part of the entry; decode forward only as far as needed.
    Partial,
}

/// Lifecycle of a request as seen by the decompression stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Created, not yet queued on a stage.
    Submitted,
    /// Waiting for a free read slot.
    ReadPending,
    /// The compressed payload is being read.
    ReadInFlight,
    /// Read finished, waiting for a free decompression job.
    PendingDecompression,
    /// Handed to the job system but not yet running.
    DecompressionQueued,
    /// A worker is decompressing the payload.
    Decompressing,
    /// The destination holds the requested bytes.
    Completed,
    /// The request failed; the destination was not written.
    Failed(StreamError),
}

impl RequestStatus {
    /// True for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed(_))
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RequestStatus::Submitted => "submitted",
            RequestStatus::ReadPending => "read-pending",
            RequestStatus::ReadInFlight => "read-in-flight",
            RequestStatus::PendingDecompression => "pending-decompression",
            RequestStatus::DecompressionQueued => "decompression-queued",
            RequestStatus::Decompressing => "decompressing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Failed(e) => write!(f, "failed ({e})"),
            other => f.write_str(other.name()),
        }
    }
}

struct RequestState {
    status: RequestStatus,
    mode: Option<DecompressionMode>,
    destination: Vec<u8>,
    estimated_completion: Option<Instant>,
}

struct RequestInner {
    id: RequestId,
    source: CompressionInfo,
    range: ReadRange,
    state: Mutex<RequestState>,
}

/// Handle to a read-and-decompress request.
///
/// # Example
/// ```
/// use pakstream_lib::codec::CompressionKind;
/// use pakstream_lib::stream::{CompressionInfo, ReadRange, Request, RequestStatus};
///
/// let info = CompressionInfo {
///     archive: "assets.pak".into(),
///     offset: 128,
///     compressed_size: 400,
///     uncompressed_size: 1024,
///     kind: CompressionKind::Deflate,
/// };
/// let request = Request::new(info, ReadRange::new(0, 1024), vec![0u8; 1024]);
/// assert_eq!(request.status(), RequestStatus::Submitted);
/// ```
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    /// Create a request for `range` of the entry described by `source`, delivering
    /// into `destination`.
    #[must_use]
    pub fn new(source: CompressionInfo, range: ReadRange, destination: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                id: RequestId::next(),
                source,
                range,
                state: Mutex::new(RequestState {
                    status: RequestStatus::Submitted,
                    mode: None,
                    destination,
                    estimated_completion: None,
                }),
            }),
        }
    }

    /// Create a request for the whole entry with a destination of the right size.
    #[must_use]
    pub fn whole_file(source: CompressionInfo) -> Self {
        let size = source.uncompressed_size;
        Self::new(source, ReadRange::new(0, size), vec![0u8; size])
    }

    /// Create a request for `range` with a destination of the right size.
    #[must_use]
    pub fn range_of(source: CompressionInfo, range: ReadRange) -> Self {
        Self::new(source, range, vec![0u8; range.size])
    }

    /// Identifier of this request.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// The entry this request reads from.
    #[must_use]
    pub fn source(&self) -> &CompressionInfo {
        &self.inner.source
    }

    /// The requested range of the uncompressed entry.
    #[must_use]
    pub fn range(&self) -> ReadRange {
        self.inner.range
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.inner.state.lock().status.clone()
    }

    /// True once the request is `Completed` or `Failed`.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().status.is_terminal()
    }

    /// Mode annotated by the stage, if the request has been prepared.
    #[must_use]
    pub fn mode(&self) -> Option<DecompressionMode> {
        self.inner.state.lock().mode
    }

    /// Advisory completion estimate.
    #[must_use]
    pub fn estimated_completion(&self) -> Option<Instant> {
        self.inner.state.lock().estimated_completion
    }

    /// Length of the destination buffer.
    #[must_use]
    pub fn destination_len(&self) -> usize {
        self.inner.state.lock().destination.len()
    }

    /// Take the destination buffer out of the request, leaving it empty.
    ///
    /// Intended for the caller once the request has finished.
    #[must_use]
    pub fn take_destination(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.state.lock().destination)
    }

    /// True if both handles refer to the same request.
    #[must_use]
    pub fn ptr_eq(&self, other: &Request) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Move to `status` unless the request already finished.
    ///
    /// Returns false if the request was terminal and the status was left alone.
    pub(crate) fn set_status(&self, status: RequestStatus) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }

    pub(crate) fn set_mode(&self, mode: DecompressionMode) {
        self.inner.state.lock().mode = Some(mode);
    }

    pub(crate) fn set_estimated_completion(&self, at: Instant) {
        self.inner.state.lock().estimated_completion = Some(at);
    }

    /// Mark the request failed.
    pub(crate) fn fail(&self, error: StreamError) {
        self.set_status(RequestStatus::Failed(error));
    }

    /// Copy `output` to the start of the destination and mark the request completed.
    pub(crate) fn complete_with(&self, output: &[u8]) {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return;
        }
        match state.destination.get_mut(..output.len()) {
            Some(target) => {
                target.copy_from_slice(output);
                state.status = RequestStatus::Completed;
            }
            None => {
                let reason = format!(
                    "destination holds {} bytes but {} were decompressed",
                    state.destination.len(),
                    output.len()
                );
                state.status = RequestStatus::Failed(StreamError::Internal(reason));
            }
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("archive", &self.inner.source.archive)
            .field("range", &self.inner.range)
            .field("status", &self.status())
            .finish()
    }
}
