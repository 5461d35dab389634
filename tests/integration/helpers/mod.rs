//! Helper utilities for integration tests.

pub mod archive;
pub mod manual;

pub use archive::*;
pub use manual::*;
