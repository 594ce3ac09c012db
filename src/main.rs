use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use apicheck::config::{require_secret, Config};
use apicheck::models::SuiteDefinition;
use apicheck::services::{
    render_summary, write_json_report, CancelSignal, SchemaStore, ScenarioRegistry,
};

/// Run HTTP API scenarios and report pass/fail per scenario
#[derive(Debug, Parser)]
#[command(name = "apicheck", version, about)]
struct Cli {
    /// Suite definition file (defaults to APICHECK_SUITE)
    suite: Option<PathBuf>,

    /// Write a JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Maximum number of scenarios running at once
    #[arg(long)]
    workers: Option<usize>,

    /// Only run scenarios whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Only run scenarios carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Log as JSON lines
    #[arg(long, env = "APICHECK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file if exists
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = ?e, "Setup failed");
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every scenario passed
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(suite) = cli.suite {
        config.suite_path = suite;
    }
    if let Some(report) = cli.report {
        config.report_path = Some(report);
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.log_json = cli.log_json;
    config.validate().context("Invalid configuration")?;

    tracing::info!(suite = %config.suite_path.display(), "Loading suite");
    let suite = SuiteDefinition::from_file(&config.suite_path)?;

    let schema_names = suite.referenced_schemas();
    let schemas = SchemaStore::load(&config.schema_dir, &schema_names).with_context(|| {
        format!("Failed to load schemas from {}", config.schema_dir.display())
    })?;
    tracing::info!(count = schemas.len(), "Schemas compiled");

    let mut registry = ScenarioRegistry::from_suite(&suite, &config, Arc::new(schemas), require_secret)
        .context("Failed to build scenarios")?;
    if let Some(pattern) = cli.filter.as_deref() {
        registry = registry.filter_name(pattern);
    }
    if let Some(tag) = cli.tag.as_deref() {
        registry = registry.filter_tag(tag);
    }
    if registry.is_empty() {
        anyhow::bail!("No scenarios selected");
    }

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Shutdown signal received, cancelling remaining steps...");
        let _ = shutdown_tx.send(true);
    });

    let report = registry
        .run(config.workers, CancelSignal::new(shutdown_rx))
        .await?;

    print!("{}", render_summary(&report));

    if let Some(path) = &config.report_path {
        write_json_report(&report, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    Ok(report.all_passed())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
