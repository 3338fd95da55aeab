//! Error types for cmlstat
//!
//! This module defines the error types used throughout the cmlstat crates.
//! All errors are derived from `thiserror` for convenient error handling
//! and automatic `From` implementations.
//!
//! Two enums live here:
//!
//! - [`CmlstatError`] is fatal for a report run (fetch, write, config).
//! - [`ParseError`] describes a single malformed usage record. The
//!   normalizer recovers from it by skipping the record and counting it.
//!
//! # Example
//!
//! ```
//! use cmlstat_core::error::{CmlstatError, Result};
//!
//! fn example_function() -> Result<()> {
//!     // This will automatically convert io::Error to CmlstatError
//!     let _file = std::fs::read_to_string("nonexistent.txt")?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cmlstat operations
///
/// Every variant here ends the current report run. Record-level problems
/// are reported through [`ParseError`] instead.
#[derive(Error, Debug)]
pub enum CmlstatError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API request to {endpoint} failed with status {status}: {body}")]
    Api {
        /// Endpoint path that was called
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Fetching from the API failed after all retries
    #[error("Fetch from {endpoint} failed after {attempts} attempt(s): {message}")]
    Fetch {
        /// Endpoint path that was called
        endpoint: String,
        /// Number of attempts made, including the first
        attempts: u32,
        /// Description of the last failure
        message: String,
    },

    /// Writing an export file failed
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Final path of the file being written
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// Invalid date or date arguments
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Invalid timezone
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CmlstatError {
    /// Build a [`CmlstatError::Write`] for `path`
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Whether repeating the failed API call may succeed
    ///
    /// Transport failures, timeouts, 408, 429 and 5xx responses are
    /// transient. Auth failures, other 4xx responses and malformed bodies
    /// are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_decode() && !e.is_builder() && !e.is_status(),
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }
}

/// Reason a single usage record was rejected by the normalizer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A required field is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A timestamp field could not be parsed
    #[error("invalid timestamp in `{field}`: {value:?}")]
    InvalidTimestamp {
        /// Field name
        field: &'static str,
        /// Raw value
        value: String,
    },

    /// The record ends before it starts
    #[error("end time {end} precedes start time {start}")]
    EndBeforeStart {
        /// Start instant (RFC 3339)
        start: String,
        /// End instant (RFC 3339)
        end: String,
    },

    /// The workload type is not one of model, job, application, session
    #[error("unknown workload type {0:?}")]
    UnknownWorkloadType(String),

    /// A resource quantity is negative or not finite
    #[error("invalid quantity in `{field}`: {value}")]
    InvalidQuantity {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// A time-series count is not a non-negative integer
    #[error("invalid count {0:?}")]
    InvalidCount(String),
}

/// Convenience type alias for Results in cmlstat
///
/// # Example
///
/// ```
/// use cmlstat_core::Result;
///
/// fn process_data() -> Result<String> {
///     Ok("Processed successfully".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, CmlstatError>;
