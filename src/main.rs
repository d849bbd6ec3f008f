use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tracing::Level;

use parley_engine::{EngineConfig, JobRunner};
use parley_llm::{ModelRegistry, OpenAiBackend};
use parley_server::handlers::HandlerState;
use parley_server::{EngineOrchestrator, ServerConfig};
use parley_store::Database;
use parley_telemetry::TelemetryConfig;

/// Turns source documents into structured podcast transcripts.
#[derive(Debug, Parser)]
#[command(name = "parley", version)]
struct Cli {
    /// HTTP port.
    #[arg(long, default_value_t = 8964)]
    port: u16,

    /// Directory for the job and log databases. Defaults to ~/.parley.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Model registry JSON. Defaults to <data-dir>/models.json; built-in models when absent.
    #[arg(long)]
    model_config: Option<PathBuf>,

    /// Override the API base of every model role.
    #[arg(long)]
    api_base: Option<String>,

    /// Seconds a completed transcript stays retrievable.
    #[arg(long, default_value_t = 120)]
    result_ttl_secs: u64,

    /// Wall-clock limit for one job.
    #[arg(long, default_value_t = 3600)]
    job_timeout_secs: u64,

    /// Seconds shutdown waits for cancelled jobs to be marked failed.
    #[arg(long, default_value_t = 10)]
    shutdown_grace_secs: u64,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Do not persist warnings and errors to the log database.
    #[arg(long)]
    no_log_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(parley_telemetry::default_data_dir);

    let telemetry = Arc::new(parley_telemetry::init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        log_to_sqlite: !cli.no_log_db,
        log_db_path: data_dir.join("logs.db"),
        ..Default::default()
    }));

    tracing::info!(data_dir = %data_dir.display(), "starting parley");

    let db = Database::open(&data_dir.join("parley.db")).context("failed to open database")?;

    let model_path = cli
        .model_config
        .clone()
        .unwrap_or_else(|| data_dir.join("models.json"));
    let mut registry = ModelRegistry::load(&model_path)
        .with_context(|| format!("failed to load model config {}", model_path.display()))?;
    if let Some(api_base) = cli.api_base.clone() {
        registry = registry.with_api_base(api_base);
    }

    let api_key = std::env::var("PARLEY_API_KEY").ok().map(SecretString::from);
    if api_key.is_none() {
        tracing::warn!("PARLEY_API_KEY is not set; requests go out unauthenticated");
    }
    let backend = Arc::new(OpenAiBackend::new(registry, api_key).context("failed to build backend")?);

    let engine_config = EngineConfig {
        result_ttl: Duration::from_secs(cli.result_ttl_secs),
        max_job_duration: Duration::from_secs(cli.job_timeout_secs),
    };
    let runner = JobRunner::new(backend, db.clone(), engine_config);
    let orchestrator = Arc::new(EngineOrchestrator::new(runner));

    let state = HandlerState::new(db, orchestrator).with_telemetry(telemetry);
    let config = ServerConfig {
        port: cli.port,
        shutdown_grace_secs: cli.shutdown_grace_secs,
        ..Default::default()
    };
    let handle = parley_server::start(config, state)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "parley ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    if !handle.shutdown().await {
        tracing::warn!("some jobs were still running at exit");
    }
    Ok(())
}
