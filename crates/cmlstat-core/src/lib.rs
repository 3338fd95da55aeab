//! Core types, traits, and utilities for cmlstat
//!
//! This crate provides the foundational types, error handling,
//! configuration, timezone and report-window handling used by the
//! client crate and the `cmlstat` binary.

pub mod aggregation_types;
pub mod config;
pub mod error;
pub mod source;
pub mod timezone;
pub mod types;
pub mod window;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use config::ReportConfig;
pub use error::{CmlstatError, ParseError, Result};
pub use source::UsageSource;
pub use types::{NormalizedRow, RawUsageRecord, ResourceKind, WorkloadType};
pub use window::ReportWindow;
