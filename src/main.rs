//! binlog-sync service
//!
//! # Usage
//!
//! ```bash
//! # Run with conf.yaml from the working directory
//! binlog-sync
//!
//! # Explicit config, verbose logging
//! RUST_LOG=binlog_sync=debug binlog-sync --config /etc/binlog-sync/conf.yaml
//!
//! # Start and inspect a task
//! curl 'http://localhost:8080/api/task/start?id=1'
//! curl 'http://localhost:8080/api/task?id=1'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use binlog_sync::config::MetaConfig;
use binlog_sync::server::{self, AppState};
use binlog_sync::{
    CheckpointTiming, Config, MySQLSinkFactory, MySQLSourceFactory, TaskBuilder, TaskContext,
    TaskRegistry,
};
use clap::Parser;
use meta_store::{MemoryMetaStore, MySQLMetaStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "binlog-sync")]
#[command(about = "Replicate MySQL binlog changes into MySQL destinations")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "BINLOG_SYNC_CONFIG", default_value = "conf.yaml")]
    config: PathBuf,

    /// Override server.port from the configuration file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_file(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let registry = Arc::new(TaskRegistry::new());
    let timing = CheckpointTiming {
        tick: config.checkpoint.tick,
        interval: config.checkpoint.interval,
    };
    let ctx = match &config.meta {
        MetaConfig::Mysql(datasource) => {
            let store = MySQLMetaStore::connect(datasource).await?;
            TaskContext::new(Arc::new(store), registry.clone(), timing)
        }
        MetaConfig::Memory { tasks } => {
            info!("Using in-memory meta store with {} seeded tasks", tasks.len());
            let store = MemoryMetaStore::seeded(tasks.clone()).await?;
            TaskContext::new(Arc::new(store), registry.clone(), timing)
        }
    };
    let builder = Arc::new(TaskBuilder::new(
        ctx,
        Arc::new(MySQLSourceFactory),
        Arc::new(MySQLSinkFactory::new(config.sink.pool_settings())),
    ));

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    server::serve(listener, AppState::new(builder), shutdown_signal()).await?;

    registry.stop_all().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
