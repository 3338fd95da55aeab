//! CSV and JSON export
//!
//! Every file is written to a temporary file in the output directory,
//! flushed and synced, then renamed over the final name. A failed write
//! never leaves a partial file under the final name.
//!
//! # CSV layout
//!
//! Each table has a fixed header ([`DETAIL_COLUMNS`], [`SUMMARY_COLUMNS`],
//! ...) that is written even when the table has no rows. Floating point
//! values use 4 decimal places, timestamps are RFC 3339 in UTC, and an
//! absent value is an empty cell.

use crate::timeseries::CombinedRow;
use chrono::{DateTime, SecondsFormat, Utc};
use cmlstat_core::aggregation_types::{AggregateRow, StatusRow};
use cmlstat_core::error::{CmlstatError, Result};
use cmlstat_core::types::{NormalizedRow, TimeSeriesPoint};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Columns of `workload_detail_*.csv`
pub const DETAIL_COLUMNS: [&str; 14] = [
    "id",
    "user",
    "project",
    "workload_type",
    "status",
    "start_time",
    "end_time",
    "cpu",
    "memory_mib",
    "gpu",
    "duration_hours",
    "cpu_hours",
    "gpu_hours",
    "memory_gb_hours",
];

/// Columns of the user and workload-type summaries; the first column is
/// renamed to the grouping key
pub const SUMMARY_COLUMNS: [&str; 7] = [
    "key",
    "total_cpu_hours",
    "total_gpu_hours",
    "total_memory_gb_hours",
    "workload_count",
    "gpu_workload_count",
    "avg_duration_hours",
];

/// Extra trailing column of the project summary
pub const UNIQUE_USERS_COLUMN: &str = "unique_user_count";

/// Columns of `workload_status_summary_*.csv`
pub const STATUS_COLUMNS: [&str; 3] = ["status", "workload_count", "total_cpu_hours"];

/// Columns of `cml_<resource>_usage_*.csv`
pub const SERIES_COLUMNS: [&str; 2] = ["timestamp", "count"];

/// Columns of `cml_combined_usage_*.csv`
pub const COMBINED_COLUMNS: [&str; 4] = ["timestamp", "cpu", "memory", "gpu"];

/// Format a float with 4 decimal places
///
/// # Examples
/// ```
/// assert_eq!(cmlstat::export::format_float(1.0 / 3.0), "0.3333");
/// assert_eq!(cmlstat::export::format_float(0.0), "0.0000");
/// ```
pub fn format_float(value: f64) -> String {
    format!("{value:.4}")
}

/// Format an instant as RFC 3339 UTC with second precision
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Header for a summary table grouped by `key_column`
pub fn summary_header(key_column: &str, with_unique_users: bool) -> Vec<String> {
    let mut header: Vec<String> = SUMMARY_COLUMNS.iter().map(|c| c.to_string()).collect();
    header[0] = key_column.to_string();
    if with_unique_users {
        header.push(UNIQUE_USERS_COLUMN.to_string());
    }
    header
}

pub fn detail_record(row: &NormalizedRow) -> Vec<String> {
    vec![
        row.id.clone(),
        row.user.clone(),
        row.project.clone(),
        row.workload_type.to_string(),
        row.status.clone(),
        format_timestamp(&row.start_time),
        row.end_time.as_ref().map(format_timestamp).unwrap_or_default(),
        format_float(row.cpu),
        format_float(row.memory_mib),
        format_float(row.gpu),
        format_float(row.duration_hours),
        format_float(row.cpu_hours),
        format_float(row.gpu_hours),
        format_float(row.memory_gb_hours),
    ]
}

pub fn summary_record(row: &AggregateRow, with_unique_users: bool) -> Vec<String> {
    let mut record = vec![
        row.key.clone(),
        format_float(row.total_cpu_hours),
        format_float(row.total_gpu_hours),
        format_float(row.total_memory_gb_hours),
        row.workload_count.to_string(),
        row.gpu_workload_count.to_string(),
        format_float(row.avg_duration_hours),
    ];
    if with_unique_users {
        record.push(row.unique_user_count.unwrap_or(0).to_string());
    }
    record
}

pub fn status_record(row: &StatusRow) -> Vec<String> {
    vec![
        row.status.clone(),
        row.workload_count.to_string(),
        format_float(row.total_cpu_hours),
    ]
}

pub fn point_record(point: &TimeSeriesPoint) -> Vec<String> {
    vec![format_timestamp(&point.timestamp), point.count.to_string()]
}

pub fn combined_record(row: &CombinedRow) -> Vec<String> {
    vec![
        format_timestamp(&row.timestamp),
        row.cpu.to_string(),
        row.memory.to_string(),
        row.gpu.to_string(),
    ]
}

/// JSON document describing one report run
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata<S, D> {
    /// Unique id of this run
    pub run_id: Uuid,
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Command that produced the report
    pub script_name: String,
    /// Human-readable report period
    pub report_period: String,
    /// Inclusive window start
    pub period_start: DateTime<Utc>,
    /// Exclusive window end
    pub period_end: DateTime<Utc>,
    /// Rows written per table
    pub row_counts: BTreeMap<String, usize>,
    /// Input records that could not be used
    pub skipped_records: usize,
    /// Per-column or per-resource statistics
    pub statistics: BTreeMap<String, S>,
    /// Report-specific summary
    pub data_summary: D,
    /// Files written for this report, by name
    pub export_files: Vec<String>,
}

/// Writes report files into one output directory
#[derive(Debug, Clone)]
pub struct Exporter {
    directory: PathBuf,
}

impl Exporter {
    /// Create an exporter writing into `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Write a CSV file with `header` followed by `records`
    pub fn write_csv<H, I>(&self, file_name: &str, header: H, records: I) -> Result<PathBuf>
    where
        H: IntoIterator,
        H::Item: AsRef<[u8]>,
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut rows = 0usize;
        let path = self.write_atomic(file_name, |out| {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(header)?;
            for record in records {
                writer.write_record(&record)?;
                rows += 1;
            }
            writer.flush()?;
            Ok(())
        })?;
        debug!(path = %path.display(), rows, "CSV rows written");
        Ok(path)
    }

    /// Write `value` as pretty-printed JSON
    pub fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        self.write_atomic(file_name, |out| {
            serde_json::to_writer_pretty(&mut *out, value)?;
            out.write_all(b"\n")
        })
    }

    /// Write through a temporary file and rename it into place
    fn write_atomic<F>(&self, file_name: &str, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let path = self.directory.join(file_name);

        let persist = || -> io::Result<()> {
            std::fs::create_dir_all(&self.directory)?;
            let mut tmp = NamedTempFile::new_in(&self.directory)?;
            {
                let mut out = BufWriter::new(tmp.as_file_mut());
                write(&mut out)?;
                out.flush()?;
            }
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        persist().map_err(|e| CmlstatError::write(&path, e))?;

        info!(path = %path.display(), "Wrote export file");
        Ok(path)
    }
}

/// File name of `path`, for the metadata file list
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
