//! CLI interface for cmlstat
//!
//! This module defines the command-line interface using clap:
//! `cmlstat [GLOBAL FLAGS] <workloads|timeseries> [YEAR [MONTH [DAY]]] [--to-date]`.
//!
//! Without date arguments a report covers the previous calendar month.
//!
//! # Example
//!
//! ```bash
//! # Workload report for last month
//! cmlstat workloads
//!
//! # July 2024, days 1-15, boundaries in UTC
//! cmlstat --utc workloads 2024 7 15
//!
//! # Resource time series for the current month so far
//! cmlstat timeseries --to-date --output-dir /tmp/reports
//! ```

use clap::{Args, Parser, Subcommand};
use cmlstat_core::config::ReportConfig;
use cmlstat_core::error::Result;
use cmlstat_core::timezone::TimezoneConfig;
use cmlstat_core::window::ReportWindow;
use std::path::PathBuf;

/// Generate CML workload and resource usage reports
#[derive(Parser, Debug, Clone)]
#[command(name = "cmlstat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Only show warnings and errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (default: ./cmlstat.toml, then the user config directory)
    #[arg(long, short = 'c', global = true, env = "CMLSTAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace URL, overriding the configuration and CDSW_API_URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory the report files are written to
    #[arg(long, short = 'o', global = true)]
    pub output_dir: Option<PathBuf>,

    /// Timezone for report boundaries (e.g. "America/New_York", "Asia/Tokyo", "UTC")
    /// If not specified, uses the system's local timezone
    #[arg(long, short = 'z', global = true)]
    pub timezone: Option<String>,

    /// Use UTC for report boundaries (overrides --timezone)
    #[arg(long, global = true)]
    pub utc: bool,

    /// Report to generate
    #[command(subcommand)]
    pub command: Command,
}

/// Available reports
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Per-workload usage with user, project, type and status summaries
    Workloads(WindowArgs),
    /// CPU, memory and GPU usage over time
    Timeseries(WindowArgs),
}

impl Command {
    /// Date arguments of the selected report
    pub fn window_args(&self) -> &WindowArgs {
        match self {
            Command::Workloads(args) | Command::Timeseries(args) => args,
        }
    }
}

/// Report period arguments
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowArgs {
    /// Year of the report month
    pub year: Option<i32>,

    /// Month (1-12)
    #[arg(requires = "year")]
    pub month: Option<u32>,

    /// Last day to include; the report covers day 1 through DAY
    #[arg(requires = "month")]
    pub day: Option<u32>,

    /// Report the current month up to now
    #[arg(long, conflicts_with = "year")]
    pub to_date: bool,
}

impl WindowArgs {
    /// Resolve the arguments into a report window
    pub fn window(&self, tz: &TimezoneConfig) -> Result<ReportWindow> {
        ReportWindow::from_args(self.year, self.month, self.day, self.to_date, tz)
    }
}

impl Cli {
    /// Timezone selected by `--timezone` / `--utc`
    pub fn timezone_config(&self) -> Result<TimezoneConfig> {
        TimezoneConfig::from_cli(self.timezone.as_deref(), self.utc)
    }

    /// Apply command-line overrides, the highest-precedence layer
    pub fn apply_overrides(&self, config: &mut ReportConfig) {
        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["cmlstat", "workloads"]);
        assert!(!cli.quiet);
        match &cli.command {
            Command::Workloads(args) => assert_eq!(args, &WindowArgs::default()),
            _ => panic!("Expected Workloads command"),
        }

        let cli = Cli::parse_from(["cmlstat", "timeseries", "2024", "7", "15"]);
        match &cli.command {
            Command::Timeseries(args) => {
                assert_eq!(args.year, Some(2024));
                assert_eq!(args.month, Some(7));
                assert_eq!(args.day, Some(15));
            }
            _ => panic!("Expected Timeseries command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "cmlstat",
            "workloads",
            "--to-date",
            "--utc",
            "-q",
            "--output-dir",
            "/tmp/out",
        ]);
        assert!(cli.utc);
        assert!(cli.quiet);
        assert!(cli.command.window_args().to_date);
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_invalid_argument_combinations() {
        assert!(Cli::try_parse_from(["cmlstat"]).is_err());
        assert!(Cli::try_parse_from(["cmlstat", "workloads", "2024", "7", "--to-date"]).is_err());
        assert!(Cli::try_parse_from(["cmlstat", "workloads", "july"]).is_err());
    }

    #[test]
    fn test_year_without_month_is_rejected_by_window() {
        let cli = Cli::parse_from(["cmlstat", "--utc", "workloads", "2024"]);
        let tz = cli.timezone_config().unwrap();
        assert!(cli.command.window_args().window(&tz).is_err());
    }

    #[test]
    fn test_window_from_args() {
        let cli = Cli::parse_from(["cmlstat", "--utc", "workloads", "2024", "2"]);
        let tz = cli.timezone_config().unwrap();
        let window = cli.command.window_args().window(&tz).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(window.label, "2024-02");
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "cmlstat",
            "--api-url",
            "https://ml.example.com",
            "-o",
            "out",
            "workloads",
        ]);
        let mut config = ReportConfig::default();
        config.api.base_url = "https://from-file.example.com".into();
        cli.apply_overrides(&mut config);
        assert_eq!(config.api.base_url, "https://ml.example.com");
        assert_eq!(config.output.directory, PathBuf::from("out"));
    }

    #[test]
    fn test_invalid_timezone() {
        let cli = Cli::parse_from(["cmlstat", "-z", "Mars/Olympus", "workloads"]);
        assert!(cli.timezone_config().is_err());
    }
}
