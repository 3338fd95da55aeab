//! Common test utilities and helpers for cmlstat tests
//!
//! Provides a builder for raw usage records and an in-memory
//! [`UsageSource`] serving pre-built pages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cmlstat_core::config::ReportConfig;
use cmlstat_core::error::{CmlstatError, Result};
use cmlstat_core::source::UsageSource;
use cmlstat_core::timezone::TimezoneConfig;
use cmlstat_core::types::{
    CreatorInfo, NumberOrString, ProjectInfo, RawSeriesValue, RawUsageRecord, ResourceKind,
    UsagePage,
};
use cmlstat_core::window::ReportWindow;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Start of the July 2024 test window
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
}

/// July 2024 in UTC
pub fn july() -> ReportWindow {
    ReportWindow::month(2024, 7, &TimezoneConfig::utc()).unwrap()
}

/// Default config writing into a fresh temporary directory, with fast retries
pub fn temp_config() -> (TempDir, ReportConfig) {
    let dir = TempDir::new().unwrap();
    let mut config = ReportConfig::default();
    config.output.directory = dir.path().to_path_buf();
    config.retry.backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    (dir, config)
}

/// Builder for creating test RawUsageRecord instances
pub struct RawRecordBuilder {
    id: String,
    user: Option<String>,
    project: Option<String>,
    workload_type: String,
    status: Option<String>,
    created_at: Option<String>,
    hours: Option<f64>,
    cpu: f64,
    memory_mib: f64,
    gpu: f64,
}

impl RawRecordBuilder {
    /// A one-hour, one-core job by `alice` in `default`
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            user: Some("alice".to_string()),
            project: Some("default".to_string()),
            workload_type: "job".to_string(),
            status: Some("succeeded".to_string()),
            created_at: Some(base_time().to_rfc3339()),
            hours: Some(1.0),
            cpu: 1.0,
            memory_mib: 1024.0,
            gpu: 0.0,
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.project = Some(project.to_string());
        self
    }

    pub fn workload_type(mut self, workload_type: &str) -> Self {
        self.workload_type = workload_type.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn created_at(mut self, created_at: &str) -> Self {
        self.created_at = Some(created_at.to_string());
        self
    }

    /// Run time in hours; `None` leaves the workload running
    pub fn hours(mut self, hours: Option<f64>) -> Self {
        self.hours = hours;
        self
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn gpu(mut self, gpu: f64) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn build(self) -> RawUsageRecord {
        let finished_at = match (&self.created_at, self.hours) {
            (Some(created), Some(hours)) => DateTime::parse_from_rfc3339(created)
                .ok()
                .map(|start| {
                    let millis = (hours * 3_600_000.0).round() as i64;
                    (start.with_timezone(&Utc) + Duration::milliseconds(millis)).to_rfc3339()
                }),
            _ => None,
        };

        RawUsageRecord {
            id: Some(self.id),
            workload_type: Some(self.workload_type),
            status: self.status,
            created_at: self.created_at,
            finished_at,
            duration: None,
            cpu: Some(NumberOrString::Text(self.cpu.to_string())),
            memory: Some(NumberOrString::Text(self.memory_mib.to_string())),
            nvidia_gpu: Some(NumberOrString::Text(self.gpu.to_string())),
            creator_info: self.user.map(|username| CreatorInfo {
                username: Some(username),
            }),
            project_info: self.project.map(|name| ProjectInfo { name: Some(name) }),
        }
    }
}

/// In-memory usage source
///
/// `list_usage` serves `records` in pages of the requested size, using the
/// page index as token. `fail_from_page` makes every request for that page
/// and later ones fail with a 500.
#[derive(Default)]
pub struct MemorySource {
    pub records: Vec<RawUsageRecord>,
    pub series: Vec<(ResourceKind, Vec<RawSeriesValue>)>,
    pub fail_from_page: Option<usize>,
    pub requests: AtomicUsize,
}

impl MemorySource {
    pub fn with_records(records: Vec<RawUsageRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageSource for MemorySource {
    async fn list_usage(
        &self,
        _window: &ReportWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<UsagePage> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let page: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        if self.fail_from_page.is_some_and(|from| page >= from) {
            return Err(CmlstatError::Api {
                endpoint: "api/v2/usage".into(),
                status: 500,
                body: "internal error".into(),
            });
        }

        let size = page_size as usize;
        let start = page * size;
        let end = (start + size).min(self.records.len());
        let records = self.records.get(start..end).unwrap_or_default().to_vec();
        let next_page_token = (end < self.records.len()).then(|| (page + 1).to_string());
        Ok(UsagePage {
            records,
            next_page_token,
        })
    }

    async fn time_series(
        &self,
        resource: ResourceKind,
        _window: &ReportWindow,
    ) -> Result<Vec<RawSeriesValue>> {
        Ok(self
            .series
            .iter()
            .find(|(kind, _)| *kind == resource)
            .map(|(_, values)| values.clone())
            .unwrap_or_default())
    }
}
