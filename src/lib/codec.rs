//! Black-box decompression codecs.
//!
//! The stage never looks inside a payload; it asks a [`Decompressor`] either for the
//! whole file or for a byte range of it. Codecs must be shareable across worker
//! threads, so per-call state (such as a libdeflater context) is created inside the
//! call rather than stored on the codec.
//!
//! # Codecs
//!
//! - [`DeflateCodec`]: raw deflate, as stored in zip-style archives. Whole-file
//!   decompression uses libdeflater; range decompression streams forward with
//!   flate2 and stops as soon as the requested range has been produced.
//! - [`StoredCodec`]: uncompressed entries.

use flate2::read::DeflateDecoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};

use crate::errors::{Result, StreamError};

/// A decompression algorithm usable from any worker thread.
pub trait Decompressor: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Decompress the whole payload into `output`.
    ///
    /// `output.len()` is the expected uncompressed size; producing more or fewer
    /// bytes is an error.
    fn decompress_full(&self, compressed: &[u8], output: &mut [u8]) -> Result<()>;

    /// Decompress forward from the start of the payload and fill `output` with the
    /// bytes at `offset..offset + output.len()` of the uncompressed stream.
    fn decompress_range(&self, compressed: &[u8], offset: usize, output: &mut [u8])
    -> Result<()>;
}

/// Compression method of an archive entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Entry is stored as-is.
    Stored,
    /// Entry is a raw deflate stream.
    #[default]
    Deflate,
}

impl CompressionKind {
    /// The codec that decodes entries of this kind.
    #[must_use]
    pub fn decompressor(self) -> &'static dyn Decompressor {
        static STORED: StoredCodec = StoredCodec;
        static DEFLATE: DeflateCodec = DeflateCodec;
        match self {
            CompressionKind::Stored => &STORED,
            CompressionKind::Deflate => &DEFLATE,
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.decompressor().name())
    }
}

/// Raw deflate codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateCodec;

impl DeflateCodec {
    const NAME: &'static str = "deflate";

    fn error(reason: impl Into<String>) -> StreamError {
        StreamError::Decompression { codec: Self::NAME, reason: reason.into() }
    }

    fn io_error(e: &io::Error) -> StreamError {
        Self::error(e.to_string())
    }
}

impl Decompressor for DeflateCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decompress_full(&self, compressed: &[u8], output: &mut [u8]) -> Result<()> {
        let mut decompressor = libdeflater::Decompressor::new();
        let written = decompressor
            .deflate_decompress(compressed, output)
            .map_err(|e| Self::error(format!("{e:?}")))?;
        if written != output.len() {
            return Err(Self::error(format!(
                "expected {} uncompressed bytes, stream produced {written}",
                output.len()
            )));
        }
        Ok(())
    }

    fn decompress_range(
        &self,
        compressed: &[u8],
        offset: usize,
        output: &mut [u8],
    ) -> Result<()> {
        let mut decoder = DeflateDecoder::new(compressed);

        // The stream is not seekable: decode and discard everything before the range.
        let skipped = io::copy(&mut (&mut decoder).take(offset as u64), &mut io::sink())
            .map_err(|e| Self::io_error(&e))?;
        if skipped != offset as u64 {
            return Err(Self::error(format!(
                "stream ended after {skipped} bytes, before range offset {offset}"
            )));
        }

        decoder.read_exact(output).map_err(|e| Self::io_error(&e))
    }
}

/// Pass-through codec for stored entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredCodec;

impl StoredCodec {
    const NAME: &'static str = "stored";

    fn error(reason: String) -> StreamError {
        StreamError::Decompression { codec: Self::NAME, reason }
    }
}

impl Decompressor for StoredCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decompress_full(&self, compressed: &[u8], output: &mut [u8]) -> Result<()> {
        if compressed.len() != output.len() {
            return Err(Self::error(format!(
                "stored entry is {} bytes, expected {}",
                compressed.len(),
                output.len()
            )));
        }
        output.copy_from_slice(compressed);
        Ok(())
    }

    fn decompress_range(
        &self,
        compressed: &[u8],
        offset: usize,
        output: &mut [u8],
    ) -> Result<()> {
        let source = offset
            .checked_add(output.len())
            .and_then(|end| compressed.get(offset..end))
            .ok_or_else(|| {
                Self::error(format!(
                    "range {offset}+{} is outside the {} byte entry",
                    output.len(),
                    compressed.len()
                ))
            })?;
        output.copy_from_slice(source);
        Ok(())
    }
}
