//! CML usage API client for cmlstat
//!
//! - [`client::CmlClient`] performs single HTTP calls against the usage
//!   endpoints and implements [`cmlstat_core::UsageSource`].
//! - [`retry::with_retry`] repeats a call with exponential backoff.
//! - [`fetcher::UsageFetcher`] follows pagination and collects a full
//!   report window, aborting the run if any call fails permanently.

pub mod client;
pub mod fetcher;
pub mod retry;

pub use client::CmlClient;
pub use fetcher::{FetchedUsage, UsageFetcher};
