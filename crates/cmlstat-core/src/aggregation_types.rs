//! Aggregation data types for cmlstat
//!
//! Pure data structures used for aggregated usage summaries.
//! These types have no dependencies on the client or the exporter.

use serde::{Deserialize, Serialize};

/// One row of a user, project or workload-type summary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Grouping key (user name, project name or workload type)
    pub key: String,
    /// Sum of `cpu_hours`
    pub total_cpu_hours: f64,
    /// Sum of `gpu_hours`
    pub total_gpu_hours: f64,
    /// Sum of `memory_gb_hours`
    pub total_memory_gb_hours: f64,
    /// Number of workloads in the group
    pub workload_count: u64,
    /// Number of workloads that held at least one GPU
    pub gpu_workload_count: u64,
    /// Mean `duration_hours`, 0 for an empty group
    pub avg_duration_hours: f64,
    /// Distinct users in the group (project table only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_user_count: Option<u64>,
}

/// One row of the status summary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRow {
    /// Workload status
    pub status: String,
    /// Number of workloads with this status
    pub workload_count: u64,
    /// Sum of `cpu_hours`
    pub total_cpu_hours: f64,
}

/// All summary tables for one workload report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Sorted by `total_cpu_hours` descending
    pub by_user: Vec<AggregateRow>,
    /// Sorted by `total_cpu_hours` descending
    pub by_project: Vec<AggregateRow>,
    /// Sorted by `workload_count` descending
    pub by_workload_type: Vec<AggregateRow>,
    /// Sorted by `workload_count` descending
    pub by_status: Vec<StatusRow>,
}

/// min/max/avg/total over one numeric column
///
/// An empty column yields all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Number of values
    pub count: u64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Mean value
    pub avg: f64,
    /// Sum of values
    pub total: f64,
}

impl ResourceStats {
    /// Compute statistics over `values` in iteration order
    ///
    /// # Examples
    /// ```
    /// use cmlstat_core::aggregation_types::ResourceStats;
    ///
    /// let stats = ResourceStats::from_values([1.0, 3.0, 2.0]);
    /// assert_eq!(stats.count, 3);
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 3.0);
    /// assert_eq!(stats.avg, 2.0);
    /// assert_eq!(stats.total, 6.0);
    ///
    /// assert_eq!(ResourceStats::from_values(std::iter::empty()), ResourceStats::default());
    /// ```
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self::default();
        for value in values {
            if stats.count == 0 {
                stats.min = value;
                stats.max = value;
            } else {
                stats.min = stats.min.min(value);
                stats.max = stats.max.max(value);
            }
            stats.total += value;
            stats.count += 1;
        }
        if stats.count > 0 {
            stats.avg = stats.total / stats.count as f64;
        }
        stats
    }
}

/// Grand totals across all normalized rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Normalized rows
    pub total_records: u64,
    /// Sum of `cpu_hours`
    pub total_cpu_hours: f64,
    /// Sum of `gpu_hours`
    pub total_gpu_hours: f64,
    /// Sum of `memory_gb_hours`
    pub total_memory_gb_hours: f64,
    /// Distinct users
    pub unique_users: u64,
    /// Distinct projects
    pub unique_projects: u64,
}
