//! cmlstat - Generate CML workload and resource usage reports
//!
//! This library provides functionality to:
//! - Fetch workload usage and resource time series from the CML usage API
//! - Normalize raw usage records into validated rows
//! - Summarize usage by user, project, workload type and status
//! - Export the results as CSV tables plus a JSON metadata document
//!
//! # Examples
//!
//! ```no_run
//! use cmlstat::report::run_workload_report;
//! use cmlstat_client::CmlClient;
//! use cmlstat_core::{ReportConfig, ReportWindow};
//! use cmlstat_core::timezone::TimezoneConfig;
//!
//! #[tokio::main]
//! async fn main() -> cmlstat_core::Result<()> {
//!     let config = ReportConfig::load(None)?;
//!     config.validate()?;
//!
//!     let client = CmlClient::new(&config.api)?;
//!     let window = ReportWindow::month(2024, 7, &TimezoneConfig::utc())?;
//!     let report = run_workload_report(&client, &config, &window).await?;
//!
//!     println!("{} rows, {} skipped", report.rows, report.skipped_records);
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod cli;
pub mod export;
pub mod normalizer;
pub mod report;
pub mod timeseries;

// Re-export commonly used types
pub use cmlstat_core::{CmlstatError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
