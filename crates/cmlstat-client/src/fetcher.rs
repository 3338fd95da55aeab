//! Paginated, retrying fetch of usage data
//!
//! [`UsageFetcher`] drives a [`UsageSource`] through every listUsage page of
//! a report window, retrying each call under the configured
//! [`RetryPolicy`]. A page that still fails after its retries aborts the
//! whole fetch; no partial record set is ever returned.
//!
//! # Example
//!
//! ```no_run
//! use cmlstat_client::{CmlClient, UsageFetcher};
//! use cmlstat_core::{ReportConfig, ReportWindow};
//! use cmlstat_core::timezone::TimezoneConfig;
//!
//! # async fn example() -> cmlstat_core::Result<()> {
//! let config = ReportConfig::load(None)?;
//! let client = CmlClient::new(&config.api)?;
//! let fetcher = UsageFetcher::new(&client, &config);
//! let window = ReportWindow::month(2024, 7, &TimezoneConfig::utc())?;
//! let fetched = fetcher.fetch_usage(&window).await?;
//! println!("{} records in {} pages", fetched.records.len(), fetched.pages);
//! # Ok(())
//! # }
//! ```

use crate::client::{TIMESERIES_PATH, USAGE_PATH};
use crate::retry::with_retry;
use cmlstat_core::config::{ReportConfig, RetryPolicy};
use cmlstat_core::error::{CmlstatError, Result};
use cmlstat_core::source::UsageSource;
use cmlstat_core::types::{RawSeriesValue, RawUsageRecord, ResourceKind};
use cmlstat_core::window::ReportWindow;
use futures::stream::{Stream, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use tracing::{debug, info};

/// All raw records of one window
#[derive(Debug, Clone, Default)]
pub struct FetchedUsage {
    /// Records in API order, pages concatenated
    pub records: Vec<RawUsageRecord>,
    /// Number of pages fetched
    pub pages: usize,
}

/// Fetches usage data page by page with retry
pub struct UsageFetcher<'a, S: UsageSource + ?Sized> {
    source: &'a S,
    page_size: u32,
    retry: RetryPolicy,
}

impl<'a, S: UsageSource + ?Sized> UsageFetcher<'a, S> {
    /// Create a fetcher using the page size and retry policy from `config`
    pub fn new(source: &'a S, config: &ReportConfig) -> Self {
        Self {
            source,
            page_size: config.api.page_size,
            retry: config.retry,
        }
    }

    /// Stream the listUsage pages of `window` in order
    ///
    /// The stream ends after the first page without a next-page token. A
    /// token the API has already handed out ends it with an error, since
    /// following it would loop forever.
    pub fn pages<'w>(
        &'w self,
        window: &'w ReportWindow,
    ) -> Pin<Box<dyn Stream<Item = Result<Vec<RawUsageRecord>>> + Send + 'w>>
    where
        'a: 'w,
    {
        Box::pin(async_stream::try_stream! {
            let mut token: Option<String> = None;
            let mut seen_tokens: HashSet<String> = HashSet::new();
            let mut page_number = 0usize;

            loop {
                page_number += 1;
                let current = token.clone();
                let page = with_retry(&self.retry, USAGE_PATH, || {
                    let current = current.as_deref();
                    async move {
                        self.source
                            .list_usage(window, self.page_size, current)
                            .await
                    }
                })
                .await?;

                debug!(
                    page = page_number,
                    records = page.records.len(),
                    has_next = page.next_token().is_some(),
                    "Fetched usage page"
                );

                let next = page.next_token().map(str::to_string);
                yield page.records;

                match next {
                    None => break,
                    Some(next) => {
                        if !seen_tokens.insert(next.clone()) {
                            Err(CmlstatError::Fetch {
                                endpoint: USAGE_PATH.to_string(),
                                attempts: 1,
                                message: format!("page token {next:?} was returned twice"),
                            })?;
                        }
                        token = Some(next);
                    }
                }
            }
        })
    }

    /// Fetch every record created inside `window`
    pub async fn fetch_usage(&self, window: &ReportWindow) -> Result<FetchedUsage> {
        let mut fetched = FetchedUsage::default();
        let mut pages = self.pages(window);
        while let Some(page) = pages.next().await {
            let records = page?;
            fetched.pages += 1;
            fetched.records.extend(records);
        }

        info!(
            window = %window.label,
            records = fetched.records.len(),
            pages = fetched.pages,
            "Fetched usage records"
        );
        Ok(fetched)
    }

    /// Fetch the count series for one resource
    pub async fn fetch_time_series(
        &self,
        resource: ResourceKind,
        window: &ReportWindow,
    ) -> Result<Vec<RawSeriesValue>> {
        let values = with_retry(&self.retry, TIMESERIES_PATH, || async move {
            self.source.time_series(resource, window).await
        })
        .await?;

        debug!(%resource, samples = values.len(), "Fetched time series");
        Ok(values)
    }

    /// Fetch the cpu, memory and gpu series, in that order
    ///
    /// Fails as soon as any resource fails.
    pub async fn fetch_all_time_series(
        &self,
        window: &ReportWindow,
    ) -> Result<BTreeMap<ResourceKind, Vec<RawSeriesValue>>> {
        let mut series = BTreeMap::new();
        for resource in ResourceKind::ALL {
            let values = self.fetch_time_series(resource, window).await?;
            series.insert(resource, values);
        }

        info!(
            window = %window.label,
            samples = series.values().map(Vec::len).sum::<usize>(),
            "Fetched time series"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cmlstat_core::timezone::TimezoneConfig;
    use cmlstat_core::types::{NumberOrString, UsagePage};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory source serving pages keyed by token
    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<Option<String>, UsagePage>,
        /// Status to fail with, per token, for the given number of calls
        failures: Mutex<HashMap<Option<String>, (u16, u32)>>,
        calls: AtomicU32,
    }

    impl FakeSource {
        fn page(mut self, token: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
            let records = ids
                .iter()
                .map(|id| RawUsageRecord {
                    id: Some(id.to_string()),
                    ..Default::default()
                })
                .collect();
            self.pages.insert(
                token.map(str::to_string),
                UsagePage {
                    records,
                    next_page_token: next.map(str::to_string),
                },
            );
            self
        }

        fn fail(self, token: Option<&str>, status: u16, times: u32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(token.map(str::to_string), (status, times));
            self
        }
    }

    #[async_trait]
    impl UsageSource for FakeSource {
        async fn list_usage(
            &self,
            _window: &ReportWindow,
            _page_size: u32,
            page_token: Option<&str>,
        ) -> Result<UsagePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = page_token.map(str::to_string);
            if let Some((status, remaining)) = self.failures.lock().unwrap().get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CmlstatError::Api {
                        endpoint: USAGE_PATH.into(),
                        status: *status,
                        body: String::new(),
                    });
                }
            }
            Ok(self.pages.get(&key).cloned().unwrap_or_default())
        }

        async fn time_series(
            &self,
            resource: ResourceKind,
            _window: &ReportWindow,
        ) -> Result<Vec<RawSeriesValue>> {
            let count = match resource {
                ResourceKind::Cpu => 8,
                ResourceKind::Memory => 32,
                ResourceKind::Gpu => 1,
            };
            Ok(vec![RawSeriesValue {
                time_stamp: NumberOrString::Text("1719792000000".into()),
                count: NumberOrString::Text(count.to_string()),
            }])
        }
    }

    fn config() -> ReportConfig {
        let mut config = ReportConfig::default();
        config.retry.backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        config
    }

    fn july() -> ReportWindow {
        ReportWindow::month(2024, 7, &TimezoneConfig::utc()).unwrap()
    }

    fn ids(fetched: &FetchedUsage) -> Vec<&str> {
        fetched
            .records
            .iter()
            .filter_map(|r| r.id.as_deref())
            .collect()
    }

    #[tokio::test]
    async fn test_follows_pages_in_order() {
        let source = FakeSource::default()
            .page(None, &["a", "b"], Some("t2"))
            .page(Some("t2"), &["c", "d"], Some("t3"))
            .page(Some("t3"), &["e"], Some(""));
        let config = config();
        let fetched = UsageFetcher::new(&source, &config)
            .fetch_usage(&july())
            .await
            .unwrap();

        assert_eq!(fetched.pages, 3);
        assert_eq!(ids(&fetched), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let source = FakeSource::default().page(None, &[], None);
        let config = config();
        let fetched = UsageFetcher::new(&source, &config)
            .fetch_usage(&july())
            .await
            .unwrap();

        assert_eq!(fetched.pages, 1);
        assert!(fetched.records.is_empty());
    }

    #[tokio::test]
    async fn test_retries_transient_page_failure() {
        let source = FakeSource::default()
            .page(None, &["a"], Some("t2"))
            .page(Some("t2"), &["b"], None)
            .fail(Some("t2"), 503, 2);
        let config = config();
        let fetched = UsageFetcher::new(&source, &config)
            .fetch_usage(&july())
            .await
            .unwrap();

        assert_eq!(ids(&fetched), vec!["a", "b"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let source = FakeSource::default()
            .page(None, &["a"], None)
            .fail(None, 401, 10);
        let config = config();
        let err = UsageFetcher::new(&source, &config)
            .fetch_usage(&july())
            .await
            .unwrap_err();

        assert!(matches!(err, CmlstatError::Fetch { attempts: 1, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_page_failure_aborts_fetch() {
        let source = FakeSource::default()
            .page(None, &["a"], Some("t2"))
            .page(Some("t2"), &["b"], None)
            .fail(Some("t2"), 500, 100);
        let config = config();
        let err = UsageFetcher::new(&source, &config)
            .fetch_usage(&july())
            .await
            .unwrap_err();

        match err {
            CmlstatError::Fetch { attempts, .. } => {
                assert_eq!(attempts, config.retry.max_retries + 1)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_token_is_an_error() {
        let source = FakeSource::default()
            .page(None, &["a"], Some("loop"))
            .page(Some("loop"), &["b"], Some("loop"));
        let config = config();
        let err = UsageFetcher::new(&source, &config)
            .fetch_usage(&july())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("returned twice"));
    }

    #[tokio::test]
    async fn test_fetch_all_time_series() {
        let source = FakeSource::default();
        let config = config();
        let series = UsageFetcher::new(&source, &config)
            .fetch_all_time_series(&july())
            .await
            .unwrap();

        let kinds: Vec<_> = series.keys().copied().collect();
        assert_eq!(kinds, ResourceKind::ALL.to_vec());
        assert_eq!(series[&ResourceKind::Memory][0].count.as_u64(), Some(32));
    }

    #[tokio::test]
    async fn test_paginates_over_http() {
        use crate::client::CmlClient;
        use cmlstat_core::config::ApiConfig;
        use serde_json::json;
        use wiremock::matchers::{method, path, query_param, query_param_is_missing};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/usage"))
            .and(query_param_is_missing("page_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usage_response": [{"id": "a"}, {"id": "b"}],
                "next_page_token": "t2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/usage"))
            .and(query_param("page_token", "t2"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/usage"))
            .and(query_param("page_token", "t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usage_response": [{"id": "c"}],
                "next_page_token": ""
            })))
            .mount(&server)
            .await;

        let mut config = config();
        config.api = ApiConfig {
            base_url: server.uri(),
            page_size: 2,
            ..Default::default()
        };
        let client = CmlClient::new(&config.api).unwrap();
        let fetched = UsageFetcher::new(&client, &config)
            .fetch_usage(&july())
            .await
            .unwrap();

        assert_eq!(ids(&fetched), vec!["a", "b", "c"]);
        assert_eq!(fetched.pages, 2);
    }
}
