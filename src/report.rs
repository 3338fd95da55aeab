//! Report pipelines
//!
//! Each pipeline runs fetch → normalize → aggregate → export to completion
//! against any [`UsageSource`]. Nothing is written unless the fetch
//! succeeded in full.

use crate::aggregation::{WorkloadAggregates, aggregate};
use crate::export::{
    COMBINED_COLUMNS, DETAIL_COLUMNS, Exporter, ReportMetadata, SERIES_COLUMNS, STATUS_COLUMNS,
    combined_record, detail_record, file_name, point_record, status_record, summary_header,
    summary_record,
};
use crate::normalizer::normalize_all;
use crate::timeseries::{SeriesStats, combine, series_stats, to_points};
use chrono::Utc;
use cmlstat_client::UsageFetcher;
use cmlstat_core::aggregation_types::{ResourceStats, Totals};
use cmlstat_core::config::ReportConfig;
use cmlstat_core::error::Result;
use cmlstat_core::source::UsageSource;
use cmlstat_core::types::{ResourceKind, TimeSeriesPoint};
use cmlstat_core::window::ReportWindow;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// Name recorded in the workload report metadata
pub const WORKLOAD_SCRIPT_NAME: &str = "cmlstat workloads";
/// Name recorded in the time-series report metadata
pub const TIMESERIES_SCRIPT_NAME: &str = "cmlstat timeseries";

/// Outcome of a workload report run
#[derive(Debug, Clone)]
pub struct WorkloadReport {
    pub window: ReportWindow,
    /// Raw records fetched
    pub fetched_records: usize,
    /// Rows that survived normalization
    pub rows: usize,
    pub skipped_records: usize,
    pub aggregates: WorkloadAggregates,
    /// Every file written, metadata last
    pub files: Vec<PathBuf>,
}

/// Outcome of a time-series report run
#[derive(Debug, Clone)]
pub struct TimeSeriesReport {
    pub window: ReportWindow,
    /// Points kept per resource
    pub points: BTreeMap<ResourceKind, usize>,
    pub skipped_records: usize,
    /// Rows of the combined table
    pub combined_rows: usize,
    pub files: Vec<PathBuf>,
}

/// `data_summary` section of the workload metadata
#[derive(Debug, Clone, Serialize)]
struct WorkloadDataSummary<'a> {
    fetched_records: usize,
    pages: usize,
    #[serde(flatten)]
    totals: &'a Totals,
}

/// `data_summary` section of the time-series metadata
#[derive(Debug, Clone, Serialize)]
struct TimeSeriesDataSummary {
    resources: Vec<String>,
    combined_rows: usize,
    first_timestamp: Option<chrono::DateTime<Utc>>,
    last_timestamp: Option<chrono::DateTime<Utc>>,
}

/// Fetch, normalize, aggregate and export the workload report for `window`
pub async fn run_workload_report<S: UsageSource + ?Sized>(
    source: &S,
    config: &ReportConfig,
    window: &ReportWindow,
) -> Result<WorkloadReport> {
    info!(window = %window.label, "Generating workload report");

    let fetched = UsageFetcher::new(source, config).fetch_usage(window).await?;
    let batch = normalize_all(&fetched.records);
    if batch.rows.is_empty() {
        warn!(window = %window.label, "No usable workload records in window");
    }
    let aggregates = aggregate(&batch.rows);
    let summary = &aggregates.summary;

    let exporter = Exporter::new(&config.output.directory);
    let label = &window.file_label;
    let files = vec![
        exporter.write_csv(
            &format!("workload_detail_{label}.csv"),
            DETAIL_COLUMNS,
            batch.rows.iter().map(detail_record),
        )?,
        exporter.write_csv(
            &format!("workload_user_summary_{label}.csv"),
            summary_header("user", false),
            summary.by_user.iter().map(|row| summary_record(row, false)),
        )?,
        exporter.write_csv(
            &format!("workload_project_summary_{label}.csv"),
            summary_header("project", true),
            summary.by_project.iter().map(|row| summary_record(row, true)),
        )?,
        exporter.write_csv(
            &format!("workload_type_summary_{label}.csv"),
            summary_header("workload_type", false),
            summary
                .by_workload_type
                .iter()
                .map(|row| summary_record(row, false)),
        )?,
        exporter.write_csv(
            &format!("workload_status_summary_{label}.csv"),
            STATUS_COLUMNS,
            summary.by_status.iter().map(status_record),
        )?,
    ];

    let row_counts = BTreeMap::from([
        ("detail".to_string(), batch.rows.len()),
        ("user_summary".to_string(), summary.by_user.len()),
        ("project_summary".to_string(), summary.by_project.len()),
        ("type_summary".to_string(), summary.by_workload_type.len()),
        ("status_summary".to_string(), summary.by_status.len()),
    ]);
    let metadata: ReportMetadata<ResourceStats, WorkloadDataSummary<'_>> = ReportMetadata {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        script_name: WORKLOAD_SCRIPT_NAME.to_string(),
        report_period: window.label.clone(),
        period_start: window.start,
        period_end: window.end,
        row_counts,
        skipped_records: batch.skipped_records,
        statistics: aggregates.statistics.clone(),
        data_summary: WorkloadDataSummary {
            fetched_records: fetched.records.len(),
            pages: fetched.pages,
            totals: &aggregates.totals,
        },
        export_files: files.iter().map(|path| file_name(path)).collect(),
    };
    let metadata_path = exporter.write_json(&format!("workload_report_{label}.json"), &metadata)?;

    let mut files = files;
    files.push(metadata_path);

    info!(
        window = %window.label,
        rows = batch.rows.len(),
        skipped = batch.skipped_records,
        users = aggregates.totals.unique_users,
        projects = aggregates.totals.unique_projects,
        "Workload report complete"
    );

    Ok(WorkloadReport {
        window: window.clone(),
        fetched_records: fetched.records.len(),
        rows: batch.rows.len(),
        skipped_records: batch.skipped_records,
        aggregates,
        files,
    })
}

/// Fetch, process and export the cpu/memory/gpu time series for `window`
pub async fn run_timeseries_report<S: UsageSource + ?Sized>(
    source: &S,
    config: &ReportConfig,
    window: &ReportWindow,
) -> Result<TimeSeriesReport> {
    info!(window = %window.label, "Generating time-series report");

    let raw = UsageFetcher::new(source, config)
        .fetch_all_time_series(window)
        .await?;

    let mut series: BTreeMap<ResourceKind, Vec<TimeSeriesPoint>> = BTreeMap::new();
    let mut skipped_records = 0;
    for resource in ResourceKind::ALL {
        let values = raw.get(&resource).map(Vec::as_slice).unwrap_or_default();
        let batch = to_points(resource, values);
        skipped_records += batch.skipped_records;
        series.insert(resource, batch.points);
    }
    let combined = combine(&series);

    let exporter = Exporter::new(&config.output.directory);
    let label = &window.file_label;
    let mut files = Vec::with_capacity(ResourceKind::ALL.len() + 2);
    let mut row_counts = BTreeMap::new();
    let mut statistics: BTreeMap<String, SeriesStats> = BTreeMap::new();

    for (resource, points) in &series {
        files.push(exporter.write_csv(
            &format!("cml_{resource}_usage_{label}.csv"),
            SERIES_COLUMNS,
            points.iter().map(point_record),
        )?);
        row_counts.insert(resource.to_string(), points.len());
        statistics.insert(resource.to_string(), series_stats(points));
    }
    files.push(exporter.write_csv(
        &format!("cml_combined_usage_{label}.csv"),
        COMBINED_COLUMNS,
        combined.iter().map(combined_record),
    )?);
    row_counts.insert("combined".to_string(), combined.len());

    let metadata = ReportMetadata {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        script_name: TIMESERIES_SCRIPT_NAME.to_string(),
        report_period: window.label.clone(),
        period_start: window.start,
        period_end: window.end,
        row_counts,
        skipped_records,
        statistics,
        data_summary: TimeSeriesDataSummary {
            resources: series.keys().map(ToString::to_string).collect(),
            combined_rows: combined.len(),
            first_timestamp: combined.first().map(|row| row.timestamp),
            last_timestamp: combined.last().map(|row| row.timestamp),
        },
        export_files: files.iter().map(|path| file_name(path)).collect(),
    };
    files.push(exporter.write_json(&format!("cml_timeseries_report_{label}.json"), &metadata)?);

    let points: BTreeMap<ResourceKind, usize> = series
        .iter()
        .map(|(resource, points)| (*resource, points.len()))
        .collect();
    info!(
        window = %window.label,
        combined_rows = combined.len(),
        skipped = skipped_records,
        "Time-series report complete"
    );

    Ok(TimeSeriesReport {
        window: window.clone(),
        points,
        skipped_records,
        combined_rows: combined.len(),
        files,
    })
}
