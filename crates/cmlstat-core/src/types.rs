//! Core domain types for cmlstat
//!
//! This module contains the raw API schema (what the usage endpoints return)
//! and the typed rows the rest of the pipeline works with. Raw types accept
//! whatever the API sends and default every field; the normalizer is the
//! only place that decides whether a raw record is usable.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of workload running on the platform
///
/// # Examples
/// ```
/// use cmlstat_core::types::WorkloadType;
/// use std::str::FromStr;
///
/// assert_eq!(WorkloadType::from_str("job").unwrap(), WorkloadType::Job);
/// assert_eq!(WorkloadType::from_str("WORKLOAD_TYPE_SESSION").unwrap(), WorkloadType::Session);
/// assert_eq!(WorkloadType::from_str("Applications").unwrap(), WorkloadType::Application);
/// assert_eq!(WorkloadType::Model.to_string(), "model");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadType {
    /// Model serving instance
    Model,
    /// Batch job run
    Job,
    /// Long-running interactive application
    Application,
    /// Interactive session
    Session,
}

impl WorkloadType {
    /// All workload types in their canonical order
    pub const ALL: [WorkloadType; 4] = [Self::Model, Self::Job, Self::Application, Self::Session];

    /// Lowercase name used in CSV output and grouping keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Job => "job",
            Self::Application => "application",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("workload_type_").unwrap_or(&lowered);
        let name = name.strip_suffix('s').unwrap_or(name);
        match name {
            "model" => Ok(Self::Model),
            "job" => Ok(Self::Job),
            "application" | "app" => Ok(Self::Application),
            "session" => Ok(Self::Session),
            _ => Err(format!("Invalid workload type: {s}")),
        }
    }
}

/// Resource counted by the time-series API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Gpu,
}

impl ResourceKind {
    /// Resources in report column order
    pub const ALL: [ResourceKind; 3] = [Self::Cpu, Self::Memory, Self::Gpu];

    /// `series_type` parameter value for the time-series endpoint
    pub fn series_type(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.series_type())
    }
}

/// A JSON scalar the API may send either as a number or as a string
///
/// The usage API is inconsistent about numeric encoding (`"2"` vs `2`), so
/// raw numeric fields go through this type. Anything that is neither a
/// number nor a numeric string lands in `Other` and coerces to nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl NumberOrString {
    /// Numeric value, if the scalar is a number or a numeric string
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Other(_) => None,
        }
    }

    /// Non-negative integer value, if representable
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            Self::Text(s) => s.trim().parse::<u64>().ok(),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Creator block nested in a usage record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorInfo {
    #[serde(default)]
    pub username: Option<String>,
}

/// Project block nested in a usage record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: Option<String>,
}

/// Raw usage record as returned by the listUsage endpoint
///
/// Every field is optional. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUsageRecord {
    /// Workload identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Workload type as sent by the API (`job`, `WORKLOAD_TYPE_SESSION`, ...)
    #[serde(default)]
    pub workload_type: Option<String>,
    /// Final or current status
    #[serde(default)]
    pub status: Option<String>,
    /// Creation (start) timestamp
    #[serde(default)]
    pub created_at: Option<String>,
    /// Completion timestamp, absent while running
    #[serde(default)]
    pub finished_at: Option<String>,
    /// Run time in seconds
    #[serde(default)]
    pub duration: Option<NumberOrString>,
    /// CPU cores
    #[serde(default)]
    pub cpu: Option<NumberOrString>,
    /// Memory in MiB
    #[serde(default)]
    pub memory: Option<NumberOrString>,
    /// NVIDIA GPU count
    #[serde(default)]
    pub nvidia_gpu: Option<NumberOrString>,
    /// Creator details
    #[serde(default)]
    pub creator_info: Option<CreatorInfo>,
    /// Project details
    #[serde(default)]
    pub project_info: Option<ProjectInfo>,
}

/// One page of the listUsage endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsagePage {
    /// Records on this page
    #[serde(default, rename = "usage_response")]
    pub records: Vec<RawUsageRecord>,
    /// Token for the next page; empty or absent on the last page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl UsagePage {
    /// Token for the next page, treating an empty string as "no more pages"
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

/// Raw time-series sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeriesValue {
    /// Milliseconds since the Unix epoch
    pub time_stamp: NumberOrString,
    /// Number of units of the resource in use at that instant
    pub count: NumberOrString,
}

/// Body of the `result` field of a time-series response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesResult {
    #[serde(default)]
    pub values: Vec<RawSeriesValue>,
}

/// Time-series endpoint response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesResponse {
    #[serde(default)]
    pub result: TimeSeriesResult,
}

/// A usage record after validation
///
/// Invariants enforced by the normalizer:
/// - `end_time >= start_time` when `end_time` is present
/// - `duration_hours` is `end_time - start_time` in hours, 0 without `end_time`
/// - all quantities are finite and non-negative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// Workload identifier (empty when the API omitted it)
    pub id: String,
    /// Creator username, `"unknown"` when absent
    pub user: String,
    /// Project name, `"unknown"` when absent
    pub project: String,
    /// Workload type
    pub workload_type: WorkloadType,
    /// Status string, `"unknown"` when absent
    pub status: String,
    /// Start instant
    pub start_time: DateTime<Utc>,
    /// End instant, if known
    pub end_time: Option<DateTime<Utc>>,
    /// CPU cores held
    pub cpu: f64,
    /// Memory held in MiB
    pub memory_mib: f64,
    /// GPUs held
    pub gpu: f64,
    /// Duration in hours
    pub duration_hours: f64,
    /// `cpu * duration_hours`
    pub cpu_hours: f64,
    /// `gpu * duration_hours`
    pub gpu_hours: f64,
    /// `memory_mib / 1024 * duration_hours`
    pub memory_gb_hours: f64,
}

impl NormalizedRow {
    /// Whether the workload held at least one GPU
    pub fn has_gpu(&self) -> bool {
        self.gpu > 0.0
    }
}

/// A time-series sample after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Sample instant
    pub timestamp: DateTime<Utc>,
    /// Units of the resource in use
    pub count: u64,
}

/// Parse an API timestamp
///
/// Accepts RFC 3339 (`2024-07-01T10:00:00Z`, `2024-07-01T10:00:00+02:00`)
/// and the naive `2024-07-01 10:00:00[.fff]` / `2024-07-01T10:00:00[.fff]`
/// forms, which are taken to be UTC.
///
/// # Examples
/// ```
/// use cmlstat_core::types::parse_api_timestamp;
///
/// assert!(parse_api_timestamp("2024-07-01T10:00:00Z").is_some());
/// assert!(parse_api_timestamp("2024-07-01 10:00:00").is_some());
/// assert!(parse_api_timestamp("not a date").is_none());
/// ```
pub fn parse_api_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
