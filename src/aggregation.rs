//! Aggregation of normalized workload rows
//!
//! Rows are grouped by user, project, workload type and status. Groups are
//! accumulated in `BTreeMap`s while walking the rows in input order, so
//! identical input always yields bit-identical sums.
//!
//! Table ordering:
//!
//! - users and projects by `total_cpu_hours`, descending
//! - workload types and statuses by `workload_count`, descending
//!
//! Ties are broken by key, ascending.
//!
//! # Examples
//!
//! ```
//! use cmlstat::aggregation::aggregate;
//!
//! let aggregates = aggregate(&[]);
//! assert!(aggregates.summary.by_user.is_empty());
//! assert_eq!(aggregates.totals.total_records, 0);
//! assert_eq!(aggregates.statistics["cpu_hours"].avg, 0.0);
//! ```

use cmlstat_core::aggregation_types::{
    AggregateRow, ResourceStats, StatusRow, Totals, UsageSummary,
};
use cmlstat_core::types::NormalizedRow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the workload report derives from its rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadAggregates {
    /// Summary tables
    pub summary: UsageSummary,
    /// Grand totals
    pub totals: Totals,
    /// Per-column statistics keyed by column name
    pub statistics: BTreeMap<String, ResourceStats>,
}

/// Accumulator for one group of rows
#[derive(Default)]
struct GroupAccumulator {
    cpu_hours: f64,
    gpu_hours: f64,
    memory_gb_hours: f64,
    duration_hours: f64,
    count: u64,
    gpu_count: u64,
    users: Option<BTreeSet<String>>,
}

impl GroupAccumulator {
    fn tracking_users() -> Self {
        Self {
            users: Some(BTreeSet::new()),
            ..Self::default()
        }
    }

    fn add_row(&mut self, row: &NormalizedRow) {
        self.cpu_hours += row.cpu_hours;
        self.gpu_hours += row.gpu_hours;
        self.memory_gb_hours += row.memory_gb_hours;
        self.duration_hours += row.duration_hours;
        self.count += 1;
        if row.has_gpu() {
            self.gpu_count += 1;
        }
        if let Some(ref mut users) = self.users {
            if !users.contains(&row.user) {
                users.insert(row.user.clone());
            }
        }
    }

    fn into_row(self, key: String) -> AggregateRow {
        AggregateRow {
            key,
            total_cpu_hours: self.cpu_hours,
            total_gpu_hours: self.gpu_hours,
            total_memory_gb_hours: self.memory_gb_hours,
            workload_count: self.count,
            gpu_workload_count: self.gpu_count,
            avg_duration_hours: if self.count > 0 {
                self.duration_hours / self.count as f64
            } else {
                0.0
            },
            unique_user_count: self.users.map(|users| users.len() as u64),
        }
    }
}

/// Group rows by `key_fn` and finish each group into a table row
fn group_by<F>(rows: &[NormalizedRow], track_users: bool, key_fn: F) -> Vec<AggregateRow>
where
    F: Fn(&NormalizedRow) -> &str,
{
    let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    for row in rows {
        groups
            .entry(key_fn(row).to_string())
            .or_insert_with(|| {
                if track_users {
                    GroupAccumulator::tracking_users()
                } else {
                    GroupAccumulator::default()
                }
            })
            .add_row(row);
    }

    groups
        .into_iter()
        .map(|(key, acc)| acc.into_row(key))
        .collect()
}

fn by_cpu_hours_desc(a: &AggregateRow, b: &AggregateRow) -> Ordering {
    b.total_cpu_hours
        .total_cmp(&a.total_cpu_hours)
        .then_with(|| a.key.cmp(&b.key))
}

fn by_count_desc(a: &AggregateRow, b: &AggregateRow) -> Ordering {
    b.workload_count
        .cmp(&a.workload_count)
        .then_with(|| a.key.cmp(&b.key))
}

/// Summarize usage per user
pub fn summarize_by_user(rows: &[NormalizedRow]) -> Vec<AggregateRow> {
    let mut table = group_by(rows, false, |row| row.user.as_str());
    table.sort_by(by_cpu_hours_desc);
    table
}

/// Summarize usage per project, including distinct users
pub fn summarize_by_project(rows: &[NormalizedRow]) -> Vec<AggregateRow> {
    let mut table = group_by(rows, true, |row| row.project.as_str());
    table.sort_by(by_cpu_hours_desc);
    table
}

/// Summarize usage per workload type
pub fn summarize_by_workload_type(rows: &[NormalizedRow]) -> Vec<AggregateRow> {
    let mut table = group_by(rows, false, |row| row.workload_type.as_str());
    table.sort_by(by_count_desc);
    table
}

/// Count workloads and cpu-hours per status
pub fn summarize_by_status(rows: &[NormalizedRow]) -> Vec<StatusRow> {
    let mut table = group_by(rows, false, |row| row.status.as_str());
    table.sort_by(by_count_desc);
    table
        .into_iter()
        .map(|row| StatusRow {
            status: row.key,
            workload_count: row.workload_count,
            total_cpu_hours: row.total_cpu_hours,
        })
        .collect()
}

/// Build every summary table
pub fn summarize(rows: &[NormalizedRow]) -> UsageSummary {
    UsageSummary {
        by_user: summarize_by_user(rows),
        by_project: summarize_by_project(rows),
        by_workload_type: summarize_by_workload_type(rows),
        by_status: summarize_by_status(rows),
    }
}

/// Grand totals over all rows
pub fn totals(rows: &[NormalizedRow]) -> Totals {
    let mut totals = Totals::default();
    let mut users = BTreeSet::new();
    let mut projects = BTreeSet::new();

    for row in rows {
        totals.total_records += 1;
        totals.total_cpu_hours += row.cpu_hours;
        totals.total_gpu_hours += row.gpu_hours;
        totals.total_memory_gb_hours += row.memory_gb_hours;
        users.insert(row.user.as_str());
        projects.insert(row.project.as_str());
    }

    totals.unique_users = users.len() as u64;
    totals.unique_projects = projects.len() as u64;
    totals
}

/// min/max/avg/total of the derived resource columns
pub fn resource_statistics(rows: &[NormalizedRow]) -> BTreeMap<String, ResourceStats> {
    let columns: [(&str, fn(&NormalizedRow) -> f64); 4] = [
        ("cpu_hours", |row| row.cpu_hours),
        ("gpu_hours", |row| row.gpu_hours),
        ("memory_gb_hours", |row| row.memory_gb_hours),
        ("duration_hours", |row| row.duration_hours),
    ];

    columns
        .into_iter()
        .map(|(name, column)| {
            (
                name.to_string(),
                ResourceStats::from_values(rows.iter().map(column)),
            )
        })
        .collect()
}

/// Run every aggregation over `rows`
pub fn aggregate(rows: &[NormalizedRow]) -> WorkloadAggregates {
    WorkloadAggregates {
        summary: summarize(rows),
        totals: totals(rows),
        statistics: resource_statistics(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cmlstat_core::types::WorkloadType;

    fn row(user: &str, project: &str, cpu_hours: f64, gpu: f64) -> NormalizedRow {
        NormalizedRow {
            id: format!("{user}-{cpu_hours}"),
            user: user.to_string(),
            project: project.to_string(),
            workload_type: WorkloadType::Job,
            status: "succeeded".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2024, 7, 1, 1, 0, 0).unwrap()),
            cpu: cpu_hours,
            memory_mib: 1024.0,
            gpu,
            duration_hours: 1.0,
            cpu_hours,
            gpu_hours: gpu,
            memory_gb_hours: 1.0,
        }
    }

    #[test]
    fn test_user_summary_alice_and_bob() {
        let rows = vec![
            row("alice", "p1", 1.0, 0.0),
            row("alice", "p1", 2.0, 1.0),
            row("alice", "p2", 3.0, 0.0),
            row("bob", "p1", 5.0, 0.0),
        ];
        let table = summarize_by_user(&rows);

        assert_eq!(table.len(), 2);
        assert_eq!(table[0].key, "alice");
        assert_eq!(table[0].total_cpu_hours, 6.0);
        assert_eq!(table[0].workload_count, 3);
        assert_eq!(table[0].gpu_workload_count, 1);
        assert_eq!(table[0].unique_user_count, None);
        assert_eq!(table[1].key, "bob");
        assert_eq!(table[1].total_cpu_hours, 5.0);
        assert_eq!(table[1].workload_count, 1);
    }

    #[test]
    fn test_project_unique_users() {
        let rows = vec![
            row("alice", "p1", 1.0, 0.0),
            row("alice", "p1", 1.0, 0.0),
            row("bob", "p1", 1.0, 0.0),
            row("carol", "p2", 1.0, 0.0),
        ];
        let table = summarize_by_project(&rows);
        assert_eq!(table[0].key, "p1");
        assert_eq!(table[0].unique_user_count, Some(2));
        assert_eq!(table[1].unique_user_count, Some(1));
    }

    #[test]
    fn test_ties_break_by_key() {
        let rows = vec![row("zoe", "p", 2.0, 0.0), row("adam", "p", 2.0, 0.0)];
        let keys: Vec<_> = summarize_by_user(&rows)
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["adam", "zoe"]);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let rows = vec![row("Alice", "p", 1.0, 0.0), row("alice", "p", 1.0, 0.0)];
        assert_eq!(summarize_by_user(&rows).len(), 2);
    }

    #[test]
    fn test_workload_type_and_status_tables() {
        let mut session = row("alice", "p", 1.0, 0.0);
        session.workload_type = WorkloadType::Session;
        session.status = "running".to_string();
        let rows = vec![row("alice", "p", 1.0, 0.0), row("bob", "p", 1.0, 0.0), session];

        let types = summarize_by_workload_type(&rows);
        assert_eq!(types[0].key, "job");
        assert_eq!(types[0].workload_count, 2);
        assert_eq!(types[1].key, "session");

        let statuses = summarize_by_status(&rows);
        assert_eq!(statuses[0].status, "succeeded");
        assert_eq!(statuses[0].workload_count, 2);
        assert_eq!(statuses[1].status, "running");
    }

    #[test]
    fn test_average_duration() {
        let mut long = row("alice", "p", 1.0, 0.0);
        long.duration_hours = 3.0;
        let rows = vec![row("alice", "p", 1.0, 0.0), long];
        assert_eq!(summarize_by_user(&rows)[0].avg_duration_hours, 2.0);
    }

    #[test]
    fn test_totals_and_statistics() {
        let rows = vec![
            row("alice", "p1", 1.0, 0.0),
            row("bob", "p1", 3.0, 2.0),
        ];
        let aggregates = aggregate(&rows);
        assert_eq!(aggregates.totals.total_records, 2);
        assert_eq!(aggregates.totals.total_cpu_hours, 4.0);
        assert_eq!(aggregates.totals.total_gpu_hours, 2.0);
        assert_eq!(aggregates.totals.unique_users, 2);
        assert_eq!(aggregates.totals.unique_projects, 1);

        let cpu = aggregates.statistics["cpu_hours"];
        assert_eq!(cpu.min, 1.0);
        assert_eq!(cpu.max, 3.0);
        assert_eq!(cpu.avg, 2.0);
        assert_eq!(cpu.total, 4.0);
    }

    #[test]
    fn test_empty_input() {
        let aggregates = aggregate(&[]);
        assert_eq!(aggregates.summary, UsageSummary::default());
        assert_eq!(aggregates.totals, Totals::default());
        assert_eq!(aggregates.statistics.len(), 4);
        assert!(
            aggregates
                .statistics
                .values()
                .all(|stats| *stats == ResourceStats::default())
        );
    }
}
