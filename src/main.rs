//! cmlstat - Generate CML workload and resource usage reports

use anyhow::Context;
use clap::Parser;
use cmlstat::cli::{Cli, Command};
use cmlstat::report::{run_timeseries_report, run_workload_report};
use cmlstat_client::CmlClient;
use cmlstat_core::config::ReportConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the run configuration: file and environment, then CLI flags
fn load_config(cli: &Cli) -> anyhow::Result<ReportConfig> {
    let mut config = ReportConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn print_files(files: &[PathBuf]) {
    for path in files {
        println!("{}", path.display());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging. The --quiet flag should override RUST_LOG.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("warn")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cmlstat=info"))
    };
    let (text_layer, json_layer) = if cli.log_json {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();

    let config = load_config(&cli)?;
    let tz_config = cli.timezone_config()?;
    info!("Using timezone: {}", tz_config.display_name());

    let window = cli.command.window_args().window(&tz_config)?;
    info!(
        period = %window.label,
        start = %window.start,
        end = %window.end,
        output_dir = %config.output.directory.display(),
        "Report window"
    );

    let client = CmlClient::new(&config.api)?;

    match &cli.command {
        Command::Workloads(_) => {
            let report = run_workload_report(&client, &config, &window)
                .await
                .with_context(|| format!("workload report for {}", window.label))?;
            print_files(&report.files);
        }
        Command::Timeseries(_) => {
            let report = run_timeseries_report(&client, &config, &window)
                .await
                .with_context(|| format!("time-series report for {}", window.label))?;
            print_files(&report.files);
        }
    }

    Ok(())
}
