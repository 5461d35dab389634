//! Custom error types for pakstream operations.
//!
//! Errors are `Clone` because a failed request keeps its error on the request
//! handle, where both the stage and the caller may read it.

use thiserror::Error;

use crate::stream::request::RequestId;

/// Result type alias for pakstream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Error type for pakstream operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A request was rejected during preparation
    #[error("Invalid request {request}: {reason}")]
    InvalidRequest {
        /// The rejected request
        request: RequestId,
        /// Explanation of why it's malformed
        reason: String,
    },

    /// The underlying read of the compressed payload failed
    #[error("Read of '{path}' failed: {reason}")]
    Read {
        /// Archive the payload was read from
        path: String,
        /// Description of the I/O failure
        reason: String,
    },

    /// The codec could not decompress the payload
    #[error("{codec} decompression failed: {reason}")]
    Decompression {
        /// Name of the codec that failed
        codec: &'static str,
        /// Description of the codec failure
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Bookkeeping reached a state that should be impossible
    #[error("Internal stage error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Build a read error from an I/O error.
    #[must_use]
    pub fn read(path: &std::path::Path, error: &std::io::Error) -> Self {
        StreamError::Read { path: path.display().to_string(), reason: error.to_string() }
    }
}
