//! Integration tests for pakstream.
//!
//! These tests validate end-to-end workflows that span multiple modules,
//! ensuring that module interactions work correctly.

mod helpers;
mod test_cli;
mod test_error_paths;
mod test_file_pipeline;
