//! Main entry point for the step-tracker-sync CLI

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use step_tracker_sync::cli::Cli;
use step_tracker_sync::fetcher::garmin::GarminHttpProvider;
use step_tracker_sync::fetcher::FitnessClient;
use step_tracker_sync::health::{HealthRetrySignal, HealthSink, HealthcheckReporter};
use step_tracker_sync::retry::RetryObserver;
use step_tracker_sync::storage::r2::R2Connector;
use step_tracker_sync::storage::{LocalMirror, StorageGateway};
use step_tracker_sync::{RunOutcome, RunReport, SyncRunner};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("step_tracker_sync=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let config = cli.run_config()?;

    let health: Arc<dyn HealthSink> = Arc::new(
        HealthcheckReporter::new(cli.healthchecks_url.clone())
            .context("failed to build healthcheck client")?,
    );
    let retry_signal: Arc<dyn RetryObserver> = Arc::new(HealthRetrySignal::new(health.clone()));

    let provider = GarminHttpProvider::new(cli.garmin_config())
        .context("failed to build Garmin client")?;
    let fitness = FitnessClient::new(Arc::new(provider))
        .with_login_retries(cli.garmin_login_retry_count)
        .with_fetch_retries(cli.garmin_fetch_retry_count)
        .with_observer(retry_signal.clone());

    let mut storage = StorageGateway::new(Arc::new(R2Connector), cli.storage_settings())
        .with_upload_retries(cli.r2_upload_retry_count)
        .with_observer(retry_signal);
    if let Some(dir) = &cli.local_output_dir {
        let mirror = LocalMirror::new(dir);
        info!(dir = %mirror.dir().display(), "Mirroring published files locally");
        storage = storage.with_mirror(mirror);
    }
    if !storage.settings().is_complete() {
        warn!(
            missing = %storage.settings().missing_fields().join(", "),
            "Object storage is not fully configured"
        );
    }

    let runner = SyncRunner::new(config, fitness, storage, health);
    info!(config = ?runner.config(), "Configuration loaded");
    Ok(runner.run().await?)
}

#[tokio::main]
async fn main() {
    // .env is optional; real environment variables take precedence
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => match &report.outcome {
            RunOutcome::Warning(message) => {
                warn!(
                    days = report.total_days,
                    message = %message,
                    "Step sync finished with warnings"
                );
            }
            outcome => {
                info!(
                    days = report.total_days,
                    new = report.merge.new,
                    updated = report.merge.updated,
                    ?outcome,
                    "Step sync finished"
                );
            }
        },
        Err(e) => {
            error!("Step sync failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
