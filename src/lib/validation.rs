//! Input validation utilities
//!
//! This module provides common validation functions for command-line parameters
//! and file paths with consistent error messages.

use crate::errors::{Result, StreamError};
use std::fmt::Display;
use std::path::Path;

/// Highest deflate compression level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Validate that a file exists
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Archive", "Manifest")
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use pakstream_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/assets.pak", "Archive");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.is_file() {
        return Err(StreamError::InvalidParameter {
            parameter: description.to_string(),
            reason: format!("File does not exist: {}", path_ref.display()),
        });
    }
    Ok(())
}

/// Validate that multiple files exist
///
/// # Errors
/// Returns an error for the first file that doesn't exist
pub fn validate_files_exist<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<()> {
    for (path, description) in files {
        validate_file_exists(path, description)?;
    }
    Ok(())
}

/// Validate that a value is positive (> 0)
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use pakstream_lib::validation::validate_positive;
///
/// validate_positive(2, "max-reads").unwrap();
/// assert!(validate_positive(0, "max-reads").is_err());
/// ```
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(StreamError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}

/// Validate a deflate compression level
///
/// # Errors
/// Returns an error if the level is above [`MAX_COMPRESSION_LEVEL`]
pub fn validate_compression_level(level: u32) -> Result<()> {
    if level > MAX_COMPRESSION_LEVEL {
        return Err(StreamError::InvalidParameter {
            parameter: "level".to_string(),
            reason: format!("Must be between 0 and {MAX_COMPRESSION_LEVEL}, got: {level}"),
        });
    }
    Ok(())
}
