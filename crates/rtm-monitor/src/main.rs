//! Studio round-time monitor - entry point.
//!
//! Runs the checkpoint pipeline until Ctrl-C, or replays a JSON Lines file
//! of checkpoints and exits. With `--export`, recent annotated intervals are
//! written to a JSON or CSV file before shutdown.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use rtm_monitor::{replay_file, AppConfig, Pipeline};
use rtm_persistence::ExportFormat;
use rtm_telemetry::logging::default_directive;
use tracing::{info, warn};

/// Studio round-time monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via RTM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Write a default configuration file to the config path and exit
    #[arg(long)]
    create_config: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    validate_config: bool,

    /// Print pipeline health as JSON after start and the shutdown report on exit
    #[arg(long)]
    status: bool,

    /// Publish the checkpoints in a JSON Lines file, then shut down
    #[arg(long, value_name = "FILE")]
    replay: Option<String>,

    /// Export recent annotated intervals to this file before shutting down
    #[arg(long, value_name = "FILE")]
    export: Option<String>,

    /// Export format (json or csv); inferred from the file extension if omitted
    #[arg(long, value_name = "FORMAT", requires = "export")]
    export_format: Option<ExportFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Determine config path: CLI arg > RTM_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("RTM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    if args.create_config {
        AppConfig::write_default(&config_path)?;
        println!("Wrote default configuration to {config_path}");
        return Ok(());
    }

    let config_exists = Path::new(&config_path).exists();
    let config = if config_exists {
        AppConfig::from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    rtm_telemetry::init_logging(&default_directive(&config.telemetry.log_level))?;
    info!("Starting studio round-time monitor v{}", env!("CARGO_PKG_VERSION"));
    if config_exists {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
    }

    config.validate()?;
    if args.validate_config {
        println!("Configuration OK: {config_path}");
        return Ok(());
    }

    let pipeline = Pipeline::from_config(&config)?;
    pipeline.start()?;

    if args.status {
        println!("{}", serde_json::to_string_pretty(&pipeline.health())?);
    }

    let outcome: Result<()> = match args.replay.as_deref() {
        Some(file) => replay_file(&pipeline, file)
            .await
            .map(|summary| {
                info!(
                    published = summary.published,
                    skipped = summary.skipped,
                    displaced = summary.displaced,
                    "Replay complete, shutting down"
                );
            })
            .map_err(Into::into),
        None => {
            info!("Monitoring; press Ctrl-C to stop");
            let signal = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.map_err(Into::into)
        }
    };

    if let Some(file) = args.export.as_deref() {
        let format = args
            .export_format
            .unwrap_or_else(|| ExportFormat::from_path(Path::new(file)));
        pipeline.settle(pipeline.config().shutdown_drain_timeout).await;
        match pipeline.export_intervals(file, format).await {
            Ok(count) => info!(path = %file, %format, count, "Export complete"),
            Err(e) => warn!(path = %file, error = %e, "Export failed"),
        }
    }

    // Sinks are flushed and closed even when replay or export failed.
    let report = pipeline.stop().await;
    if args.status {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    outcome
}
