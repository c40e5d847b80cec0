//! skyscaled — the Skyscale daemon.
//!
//! One replica of the scaling engine. Every replica serves the HTTP
//! gateway; the lease lock elects the single replica that runs
//! leader-only housekeeping.
//!
//! - State store (redb)
//! - Lease lock
//! - Scaling history pruner (leader only)
//! - HTTP gateway
//!
//! # Usage
//!
//! ```text
//! skyscaled run --config /etc/skyscale/skyscale.toml --port 8080
//! skyscaled default-config > skyscale.toml
//! ```

mod pruner;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skyscale_api::{ApiState, build_router};
use skyscale_core::SkyscaleConfig;
use skyscale_engine::ScalingEngine;
use skyscale_lock::{LeaseLock, LockConfig, StateLockStore};
use skyscale_state::StateStore;

use crate::pruner::HistoryPruner;

const DEFAULT_LOG_FILTER: &str = "info,skyscaled=debug,skyscale=debug";

#[derive(Parser)]
#[command(name = "skyscaled", about = "Skyscale scaling engine daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run one engine replica.
    Run {
        /// Path to skyscale.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides server.port).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides server.data_dir).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => {
            let config = load_config(config, port, data_dir)?;
            run(config).await
        }
        Command::DefaultConfig => {
            print!("{}", SkyscaleConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(
    path: Option<PathBuf>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<SkyscaleConfig> {
    let mut config = match &path {
        Some(path) => SkyscaleConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SkyscaleConfig::default(),
    };
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.server.data_dir = data_dir;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: SkyscaleConfig) -> anyhow::Result<()> {
    info!("Skyscale daemon starting");

    // ── State store ────────────────────────────────────────────

    let data_dir = &config.server.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("skyscale.redb");
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Lease lock ─────────────────────────────────────────────

    let owner = config
        .lock
        .owner
        .clone()
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let lock_config = LockConfig {
        owner,
        ttl: config.lock.ttl()?,
        retry_interval: config.lock.retry_interval()?,
    };
    let lock_store = Arc::new(StateLockStore::new(state.clone(), config.lock.name.clone()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let lock = LeaseLock::new(lock_config, lock_store, events_tx);
    let mut observer = lock.observer();
    let lock_handle = tokio::spawn(lock.run(shutdown_rx.clone()));
    info!(lock = %config.lock.name, "lease lock initialized");

    // ── History pruner ─────────────────────────────────────────

    let pruner = HistoryPruner::new(
        state.clone(),
        config.history.cutoff()?,
        config.history.refresh_interval()?,
    );
    let pruner_handle = tokio::spawn(pruner.run(events_rx, shutdown_rx));

    observer.ready().await;
    info!(status = observer.status().as_str(), "initial election attempt complete");

    // ── API server ─────────────────────────────────────────────

    let router = build_router(ApiState {
        engine: ScalingEngine::from_state(state.clone()),
        store: state,
        lock: observer,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for the lock to release its lease.
    let _ = lock_handle.await;
    let _ = pruner_handle.await;

    info!("Skyscale daemon stopped");
    Ok(())
}
