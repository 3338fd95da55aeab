//! HTTP client for the CML usage endpoints
//!
//! # Endpoints
//!
//! - `GET {root}/api/v2/usage?search_filter=..&page_size=..[&page_token=..]`
//!   returns `{"usage_response": [...], "next_page_token": "..."}`
//! - `GET {root}/api/v2/usage/timeseries?series_type=..&time_range_search_filter=..`
//!   returns `{"result": {"values": [{"time_stamp": "..", "count": ".."}]}}`
//!
//! Both filters are JSON documents of the form
//! `{"created_time": {"min": "YYYY-MM-DD HH:MM:SS", "max": "..."}}` with
//! inclusive bounds, built from [`ReportWindow::api_min`] and
//! [`ReportWindow::api_max`].

use async_trait::async_trait;
use cmlstat_core::config::ApiConfig;
use cmlstat_core::error::{CmlstatError, Result};
use cmlstat_core::source::UsageSource;
use cmlstat_core::types::{RawSeriesValue, ResourceKind, TimeSeriesResponse, UsagePage};
use cmlstat_core::window::ReportWindow;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Path of the listUsage endpoint
pub const USAGE_PATH: &str = "api/v2/usage";
/// Path of the time-series endpoint
pub const TIMESERIES_PATH: &str = "api/v2/usage/timeseries";

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Client for the usage endpoints of one CML workspace
#[derive(Debug, Clone)]
pub struct CmlClient {
    http: reqwest::Client,
    root: String,
    api_key: Option<String>,
}

impl CmlClient {
    /// Create a client from the API section of the configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let root = config.root_url().to_string();
        Url::parse(&root)
            .map_err(|e| CmlstatError::Config(format!("Invalid API base URL '{root}': {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            root,
            api_key: config.api_key.clone(),
        })
    }

    /// Build the URL for `path` with the given query parameters
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.root, path))
            .map_err(|e| CmlstatError::Config(format!("Invalid endpoint URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Perform one GET and decode the JSON body
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, query)?;
        debug!(%url, "GET");

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CmlstatError::Api {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// JSON search filter over `created_time` for `window`
pub fn created_time_filter(window: &ReportWindow) -> String {
    json!({
        "created_time": {
            "min": window.api_min(),
            "max": window.api_max(),
        }
    })
    .to_string()
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

#[async_trait]
impl UsageSource for CmlClient {
    async fn list_usage(
        &self,
        window: &ReportWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<UsagePage> {
        let filter = created_time_filter(window);
        let page_size = page_size.to_string();
        let mut query = vec![
            ("search_filter", filter.as_str()),
            ("page_size", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token));
        }
        self.get_json(USAGE_PATH, &query).await
    }

    async fn time_series(
        &self,
        resource: ResourceKind,
        window: &ReportWindow,
    ) -> Result<Vec<RawSeriesValue>> {
        let filter = created_time_filter(window);
        let query = [
            ("series_type", resource.series_type()),
            ("time_range_search_filter", filter.as_str()),
        ];
        let response: TimeSeriesResponse = self.get_json(TIMESERIES_PATH, &query).await?;
        Ok(response.result.values)
    }
}
