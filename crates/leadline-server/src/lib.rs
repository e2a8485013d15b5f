//! Leadline HTTP server: configuration and application assembly.
//!
//! The binary in `main.rs` loads a [`ServerConfig`], opens the store, and
//! serves [`app`] until it receives a shutdown signal.

use std::path::PathBuf;

use axum::Router;
use leadline_core::{config::EngineConfig, store::LeadStore};
use leadline_engine::{Engine, TextUnderstanding, ai::AiServiceConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `leadline.toml` and
/// `LEADLINE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path: PathBuf,
  pub engine:     EngineConfig,
  pub ai:         AiServiceConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".into(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/leadline/leadline.db"),
      engine:     EngineConfig::default(),
      ai:         AiServiceConfig::default(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The full HTTP application: the API under `/api`, with request tracing.
pub fn app<S, T>(engine: Engine<S, T>) -> Router
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Router::new()
    .nest("/api", leadline_api::api_router(engine))
    .layer(TraceLayer::new_for_http())
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!(error = %e, "failed to listen for Ctrl+C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
    _ = terminate => tracing::info!("received SIGTERM, shutting down"),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use config::{Config, File, FileFormat};
  use leadline_core::clock::SystemClock;
  use leadline_engine::ai::DisabledTextService;
  use leadline_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let toml = r#"
      port = 9090

      [engine.tiers]
      hot = 80.0

      [ai]
      endpoint = "http://localhost:7000/analyze"
    "#;
    let cfg: ServerConfig = Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.address(), "127.0.0.1:9090");
    assert_eq!(cfg.engine.tiers.hot, 80.0);
    assert_eq!(cfg.engine.tiers.warm, 40.0);
    assert_eq!(cfg.ai.endpoint.as_deref(), Some("http://localhost:7000/analyze"));
    assert!(cfg.ai.api_key.is_none());
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let (engine, _worker) =
      Engine::new(store, DisabledTextService, EngineConfig::default(), Arc::new(SystemClock));
    let app = app(engine);

    let req = Request::builder()
      .uri("/api/leads")
      .header(leadline_api::AGENT_HEADER, "agent-1")
      .body(Body::empty())
      .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder().uri("/leads").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
