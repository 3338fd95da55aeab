//! Usage source trait
//!
//! This module defines the `UsageSource` trait the fetcher is written
//! against. The HTTP client in `cmlstat-client` implements it for the real
//! API; tests implement it over in-memory pages.

use crate::error::Result;
use crate::types::{RawSeriesValue, ResourceKind, UsagePage};
use crate::window::ReportWindow;
use async_trait::async_trait;

/// One call to the platform's usage endpoints.
///
/// Implementations perform a single request with no retrying; retry and
/// pagination are layered on top by the fetcher.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Fetch one page of usage records created inside `window`.
    async fn list_usage(
        &self,
        window: &ReportWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<UsagePage>;

    /// Fetch the count series for one resource inside `window`.
    async fn time_series(
        &self,
        resource: ResourceKind,
        window: &ReportWindow,
    ) -> Result<Vec<RawSeriesValue>>;
}
