//! Record normalization
//!
//! Turns a [`RawUsageRecord`] from the listUsage API into a validated
//! [`NormalizedRow`]. Records that cannot be normalized are skipped and
//! counted by [`normalize_all`]; a bad record never fails a report.
//!
//! # Rules
//!
//! - missing user, project or status becomes `"unknown"`
//! - missing or non-numeric quantities become 0
//! - `start_time` is `created_at` and is required
//! - `end_time` is `finished_at`, else `start_time + duration` when
//!   `duration > 0`, else absent
//! - a record ending before it starts is rejected
//! - negative or non-finite quantities are rejected
//!
//! # Examples
//!
//! ```
//! use cmlstat::normalizer::normalize;
//! use cmlstat_core::RawUsageRecord;
//!
//! let raw: RawUsageRecord = serde_json::from_str(r#"{
//!     "id": "wl-1",
//!     "workload_type": "job",
//!     "created_at": "2024-07-01T10:00:00Z",
//!     "finished_at": "2024-07-01T12:00:00Z",
//!     "cpu": "2",
//!     "memory": 4096,
//!     "creator_info": {"username": "alice"}
//! }"#).unwrap();
//!
//! let row = normalize(&raw).unwrap();
//! assert_eq!(row.user, "alice");
//! assert_eq!(row.project, "unknown");
//! assert_eq!(row.duration_hours, 2.0);
//! assert_eq!(row.cpu_hours, 4.0);
//! assert_eq!(row.memory_gb_hours, 8.0);
//! ```

use chrono::{DateTime, Duration, Utc};
use cmlstat_core::error::ParseError;
use cmlstat_core::types::{
    NormalizedRow, NumberOrString, RawUsageRecord, WorkloadType, parse_api_timestamp,
};
use tracing::{debug, warn};

/// Placeholder for absent user, project and status values
pub const UNKNOWN: &str = "unknown";

const NANOS_PER_HOUR: f64 = 3_600_000_000_000.0;
const MICROS_PER_HOUR: f64 = 3_600_000_000.0;
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Rows that survived normalization plus the number that did not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    /// Rows in input order
    pub rows: Vec<NormalizedRow>,
    /// Records rejected by [`normalize`]
    pub skipped_records: usize,
}

/// Normalize one raw usage record
pub fn normalize(raw: &RawUsageRecord) -> Result<NormalizedRow, ParseError> {
    let workload_type = raw
        .workload_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("workload_type"))?;
    let workload_type: WorkloadType = workload_type
        .parse()
        .map_err(|_| ParseError::UnknownWorkloadType(workload_type.to_string()))?;

    let start_time = required_timestamp("created_at", raw.created_at.as_deref())?;

    let cpu = quantity("cpu", raw.cpu.as_ref())?;
    let memory_mib = quantity("memory", raw.memory.as_ref())?;
    let gpu = quantity("nvidia_gpu", raw.nvidia_gpu.as_ref())?;
    let duration_secs = quantity("duration", raw.duration.as_ref())?;

    let end_time = match non_empty(raw.finished_at.as_deref()) {
        Some(value) => Some(parse_timestamp("finished_at", value)?),
        None if duration_secs > 0.0 => {
            let end = elapsed_from_seconds(duration_secs)
                .and_then(|elapsed| start_time.checked_add_signed(elapsed))
                .ok_or(ParseError::InvalidQuantity {
                    field: "duration",
                    value: duration_secs,
                })?;
            Some(end)
        }
        None => None,
    };

    if let Some(end) = end_time {
        if end < start_time {
            return Err(ParseError::EndBeforeStart {
                start: start_time.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
    }

    let duration_hours = end_time
        .map(|end| hours(end - start_time))
        .unwrap_or(0.0);

    Ok(NormalizedRow {
        id: raw.id.clone().unwrap_or_default(),
        user: text_or_unknown(raw.creator_info.as_ref().and_then(|c| c.username.as_deref())),
        project: text_or_unknown(raw.project_info.as_ref().and_then(|p| p.name.as_deref())),
        workload_type,
        status: text_or_unknown(raw.status.as_deref()),
        start_time,
        end_time,
        cpu,
        memory_mib,
        gpu,
        duration_hours,
        cpu_hours: cpu * duration_hours,
        gpu_hours: gpu * duration_hours,
        memory_gb_hours: memory_mib / 1024.0 * duration_hours,
    })
}

/// Normalize every record, skipping and counting the malformed ones
pub fn normalize_all(records: &[RawUsageRecord]) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        rows: Vec::with_capacity(records.len()),
        skipped_records: 0,
    };

    for raw in records {
        match normalize(raw) {
            Ok(row) => batch.rows.push(row),
            Err(reason) => {
                warn!(
                    id = raw.id.as_deref().unwrap_or(""),
                    reason = %reason,
                    "Skipping malformed usage record"
                );
                batch.skipped_records += 1;
            }
        }
    }

    debug!(
        rows = batch.rows.len(),
        skipped = batch.skipped_records,
        "Normalized usage records"
    );
    batch
}

/// Elapsed time in hours at the full precision of the timestamps
fn hours(elapsed: Duration) -> f64 {
    match elapsed.num_nanoseconds() {
        Some(nanos) => nanos as f64 / NANOS_PER_HOUR,
        // beyond ~292 years of nanoseconds
        None => elapsed
            .num_microseconds()
            .map(|micros| micros as f64 / MICROS_PER_HOUR)
            .unwrap_or_else(|| elapsed.num_seconds() as f64 / 3600.0),
    }
}

/// Split fractional seconds into whole seconds plus nanoseconds
fn elapsed_from_seconds(secs: f64) -> Option<Duration> {
    let whole = secs.trunc();
    if whole >= i64::MAX as f64 {
        return None;
    }
    let nanos = ((secs - whole) * NANOS_PER_SECOND).round() as i64;
    Duration::try_seconds(whole as i64)?.checked_add(&Duration::nanoseconds(nanos))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn text_or_unknown(value: Option<&str>) -> String {
    non_empty(value).unwrap_or(UNKNOWN).to_string()
}

fn required_timestamp(
    field: &'static str,
    value: Option<&str>,
) -> Result<DateTime<Utc>, ParseError> {
    let value = non_empty(value).ok_or(ParseError::MissingField(field))?;
    parse_timestamp(field, value)
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    parse_api_timestamp(value).ok_or_else(|| ParseError::InvalidTimestamp {
        field,
        value: value.to_string(),
    })
}

/// Coerce a raw quantity: absent or non-numeric is 0, negative or
/// non-finite is an error
fn quantity(field: &'static str, value: Option<&NumberOrString>) -> Result<f64, ParseError> {
    let Some(value) = value.and_then(NumberOrString::as_f64) else {
        return Ok(0.0);
    };
    if !value.is_finite() || value < 0.0 {
        return Err(ParseError::InvalidQuantity { field, value });
    }
    Ok(value)
}
