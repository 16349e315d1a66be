// ABOUTME: Command-line entry point for copying DynamoDB tables
// ABOUTME: Merges a TOML config file with flags, wires logging, progress and Ctrl-C

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dynamo_table_copy::config::ResumeConfig;
use dynamo_table_copy::{
    copy, BackupPolicy, ClientConfig, CopyConfig, NoProgress, ProgressReporter, SpinnerReporter,
};

#[derive(Parser, Debug)]
#[command(
    name = "dynamo-table-copy",
    version,
    about = "Copy a DynamoDB table's schema, backups and data into another table"
)]
struct Cli {
    /// TOML file with the copy configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Table to read from
    #[arg(long)]
    source_table: Option<String>,

    /// Table to write to
    #[arg(long)]
    destination_table: Option<String>,

    /// Region used by both sides unless overridden
    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    source_region: Option<String>,

    #[arg(long)]
    destination_region: Option<String>,

    /// Endpoint override for both sides (e.g. DynamoDB Local)
    #[arg(long)]
    endpoint_url: Option<String>,

    #[arg(long)]
    source_endpoint_url: Option<String>,

    #[arg(long)]
    destination_endpoint_url: Option<String>,

    /// Shared credentials profile
    #[arg(long)]
    profile: Option<String>,

    /// Create the destination from the source schema first
    #[arg(long)]
    create_if_missing: bool,

    /// Stop after creating the destination; copy no data
    #[arg(long)]
    schema_only: bool,

    /// Point-in-time recovery on a created destination: copy, true or false
    #[arg(long)]
    continuous_backups: Option<BackupPolicy>,

    /// Show live progress on one line
    #[arg(long)]
    log: bool,

    /// Give up on a batch after this many retries of unprocessed items
    #[arg(long)]
    max_write_retries: Option<u32>,

    /// Give up waiting for the new table to become active after this many seconds
    #[arg(long)]
    activation_timeout_secs: Option<u64>,

    /// Resume after this exclusive start key, in DynamoDB JSON
    #[arg(long, requires = "resume_copied")]
    resume_cursor: Option<String>,

    /// Items already copied before the resume cursor
    #[arg(long)]
    resume_copied: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn override_client(
    client: &mut Option<ClientConfig>,
    region: Option<String>,
    endpoint: Option<String>,
) {
    if region.is_none() && endpoint.is_none() {
        return;
    }
    let client = client.get_or_insert_with(ClientConfig::default);
    if region.is_some() {
        client.region = region;
    }
    if endpoint.is_some() {
        client.endpoint_url = endpoint;
    }
}

fn build_config(cli: Cli) -> Result<CopyConfig> {
    let mut config = match &cli.config {
        Some(path) => CopyConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CopyConfig::default(),
    };

    if let Some(table) = cli.source_table {
        config.source.table_name = table;
    }
    if let Some(table) = cli.destination_table {
        config.destination.table_name = table;
    }
    if cli.region.is_some() {
        config.default_client.region = cli.region;
    }
    if cli.endpoint_url.is_some() {
        config.default_client.endpoint_url = cli.endpoint_url;
    }
    if cli.profile.is_some() {
        config.default_client.profile = cli.profile;
    }
    override_client(
        &mut config.source.client,
        cli.source_region,
        cli.source_endpoint_url,
    );
    override_client(
        &mut config.destination.client,
        cli.destination_region,
        cli.destination_endpoint_url,
    );

    config.log |= cli.log;
    config.create_if_missing |= cli.create_if_missing;
    config.schema_only |= cli.schema_only;
    if let Some(policy) = cli.continuous_backups {
        config.continuous_backups = policy;
    }
    if cli.max_write_retries.is_some() {
        config.retry.max_write_retries = cli.max_write_retries;
    }
    if cli.activation_timeout_secs.is_some() {
        config.retry.activation_timeout_secs = cli.activation_timeout_secs;
    }
    if let Some(raw) = cli.resume_cursor {
        let cursor = serde_json::from_str(&raw).context("--resume-cursor is not valid JSON")?;
        config.resume = Some(ResumeConfig {
            cursor,
            copied: cli.resume_copied.unwrap_or_default(),
        });
    }

    Ok(config)
}

/// Cancel the run on Ctrl-C or SIGTERM so pending waits stop promptly.
fn cancel_on_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl-C, stopping"),
            _ = terminate => info!("Received SIGTERM, stopping"),
        }
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = build_config(cli)?;

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let reporter: Box<dyn ProgressReporter> = if config.log {
        Box::new(SpinnerReporter::new())
    } else {
        Box::new(NoProgress)
    };

    let report = copy(&config, reporter.as_ref(), &cancel)
        .await
        .with_context(|| {
            format!(
                "Failed to copy {} into {}",
                config.source.table_name, config.destination.table_name
            )
        })?;

    if let Some(provisioned) = &report.provisioned {
        println!(
            "Created {} ({} status checks, continuous backups {})",
            config.destination.table_name,
            provisioned.activation_polls,
            if provisioned.backups_enabled {
                "enabled"
            } else {
                "unchanged"
            }
        );
    }
    match &report.progress {
        Some(progress) => println!(
            "Copied {} items from {} to {} ({} scans, {} writes)",
            progress.copied,
            config.source.table_name,
            config.destination.table_name,
            progress.scans,
            progress.writes
        ),
        None => println!("Schema only: no items copied"),
    }

    Ok(())
}
