//! leadline-server binary.
//!
//! Reads `leadline.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, starts the background worker, and serves the JSON
//! API over HTTP until Ctrl+C or SIGTERM.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use leadline_core::clock::SystemClock;
use leadline_engine::{Engine, ai::TextService};
use leadline_server::{ServerConfig, app, shutdown_signal};
use leadline_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Leadline lead intelligence server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "leadline.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("LEADLINE").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let text = TextService::from_config(&server_cfg.ai, server_cfg.engine.scoring.ai_timeout())
    .context("failed to build text-understanding client")?;
  if server_cfg.ai.endpoint.is_none() {
    tracing::warn!("no text-understanding endpoint configured; scoring uses the heuristic only");
  }

  let (engine, worker) =
    Engine::new(store, text, server_cfg.engine.clone(), Arc::new(SystemClock));

  // Background triggers and the due scan.
  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let worker_task = tokio::spawn(worker.run(shutdown_rx));

  let address = server_cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app(engine))
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  // Let in-flight triggers finish before exiting.
  let _ = shutdown_tx.send(true);
  worker_task.await.context("worker task panicked")?;

  tracing::info!("shutdown complete");
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
