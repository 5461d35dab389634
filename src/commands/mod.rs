//! CLI command implementations for pakstream.
//!
//! - [`pack`] - Compress files into an archive and write its manifest
//! - [`stream`] - Stream archive entries through the decompression stage

#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod pack;
pub mod stream;
