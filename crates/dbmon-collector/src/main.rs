use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dbmon_collector::{Collector, CollectorConfig, logging};
use dbmon_connection::ConnectionPool;
use dbmon_driver_postgres::PostgresConnectionFactory;
use tokio_util::sync::CancellationToken;

/// Periodically check every configured database on a PostgreSQL server
#[derive(Debug, Parser)]
#[command(name = "dbmon", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "DBMON_CONFIG", default_value = "dbmon.toml")]
    config: PathBuf,

    /// Run a single collection round and exit
    #[arg(long)]
    once: bool,

    /// Log filter, overrides `logging.filter` (RUST_LOG still wins)
    #[arg(long, env = "DBMON_LOG_FILTER")]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CollectorConfig::load(&cli.config)?;

    let _log_guard = logging::init(logging::LoggingConfig::from_settings(
        &config.logging,
        cli.log_filter.as_deref(),
    ))?;

    let factory = PostgresConnectionFactory::new(config.server.clone());
    let pool = Arc::new(ConnectionPool::new(config.pool.clone(), factory));
    let collector = Collector::new(pool, config.collector.clone());

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        databases = config.all_databases().count(),
        interval_ms = config.collector.interval_ms,
        background_pruner = collector.has_background_pruner(),
        "dbmon collector starting"
    );

    let healthy = if cli.once {
        let report = collector.collect_once().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
        report.all_healthy()
    } else {
        let shutdown = CancellationToken::new();
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("received ctrl-c, shutting down"),
                    Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
                }
                shutdown.cancel();
            }
        });
        collector.run(shutdown).await;
        true
    };

    collector.shutdown().await;

    if !healthy {
        anyhow::bail!("one or more databases failed their health check");
    }
    Ok(())
}
