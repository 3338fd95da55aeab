//! Time-series processing
//!
//! Converts the raw `{time_stamp, count}` samples of the time-series API
//! into sorted [`TimeSeriesPoint`]s, computes per-resource statistics and
//! pivots the three resources into one combined table.

use chrono::{DateTime, Utc};
use cmlstat_core::aggregation_types::ResourceStats;
use cmlstat_core::error::ParseError;
use cmlstat_core::types::{RawSeriesValue, ResourceKind, TimeSeriesPoint};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Points of one series plus the number of samples that were rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBatch {
    /// Points sorted by timestamp, one per instant
    pub points: Vec<TimeSeriesPoint>,
    /// Samples with an unusable timestamp or count
    pub skipped_records: usize,
}

/// Statistics of one resource series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    /// min/max/avg/total over the counts
    #[serde(flatten)]
    pub stats: ResourceStats,
    /// Earliest sample
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Latest sample
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// One row of the combined table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombinedRow {
    pub timestamp: DateTime<Utc>,
    pub cpu: u64,
    pub memory: u64,
    pub gpu: u64,
}

impl CombinedRow {
    fn set(&mut self, resource: ResourceKind, count: u64) {
        match resource {
            ResourceKind::Cpu => self.cpu = count,
            ResourceKind::Memory => self.memory = count,
            ResourceKind::Gpu => self.gpu = count,
        }
    }
}

/// Convert one raw sample
///
/// `time_stamp` is milliseconds since the Unix epoch. `count` must be a
/// non-negative integer, given as a number or a string; `"3.0"` is accepted.
pub fn to_point(raw: &RawSeriesValue) -> Result<TimeSeriesPoint, ParseError> {
    let invalid_timestamp = || ParseError::InvalidTimestamp {
        field: "time_stamp",
        value: raw.time_stamp.to_string(),
    };
    let millis = raw
        .time_stamp
        .as_f64()
        .filter(|ms| ms.is_finite() && ms.fract() == 0.0)
        .ok_or_else(invalid_timestamp)?;
    let timestamp = DateTime::from_timestamp_millis(millis as i64).ok_or_else(invalid_timestamp)?;

    let count = match raw.count.as_u64() {
        Some(count) => count,
        None => raw
            .count
            .as_f64()
            .filter(|c| c.is_finite() && *c >= 0.0 && c.fract() == 0.0)
            .map(|c| c as u64)
            .ok_or_else(|| ParseError::InvalidCount(raw.count.to_string()))?,
    };

    Ok(TimeSeriesPoint { timestamp, count })
}

/// Convert a raw series into sorted points
///
/// Unusable samples are skipped and counted. When the API repeats a
/// timestamp, the last sample for it wins.
pub fn to_points(resource: ResourceKind, raw: &[RawSeriesValue]) -> SeriesBatch {
    let mut by_time: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    let mut skipped_records = 0;

    for value in raw {
        match to_point(value) {
            Ok(point) => {
                by_time.insert(point.timestamp, point.count);
            }
            Err(reason) => {
                warn!(%resource, reason = %reason, "Skipping malformed time-series sample");
                skipped_records += 1;
            }
        }
    }

    let points: Vec<_> = by_time
        .into_iter()
        .map(|(timestamp, count)| TimeSeriesPoint { timestamp, count })
        .collect();
    debug!(%resource, points = points.len(), skipped = skipped_records, "Processed time series");

    SeriesBatch {
        points,
        skipped_records,
    }
}

/// Statistics over a sorted series
pub fn series_stats(points: &[TimeSeriesPoint]) -> SeriesStats {
    SeriesStats {
        stats: ResourceStats::from_values(points.iter().map(|p| p.count as f64)),
        first_timestamp: points.first().map(|p| p.timestamp),
        last_timestamp: points.last().map(|p| p.timestamp),
    }
}

/// Pivot the series into one row per timestamp
///
/// The timestamp set is the union over all resources; a resource without a
/// sample at some instant contributes 0 there.
pub fn combine(series: &BTreeMap<ResourceKind, Vec<TimeSeriesPoint>>) -> Vec<CombinedRow> {
    let mut rows: BTreeMap<DateTime<Utc>, CombinedRow> = BTreeMap::new();
    for (resource, points) in series {
        for point in points {
            rows.entry(point.timestamp)
                .or_insert_with(|| CombinedRow {
                    timestamp: point.timestamp,
                    ..Default::default()
                })
                .set(*resource, point.count);
        }
    }
    rows.into_values().collect()
}
