//! JSON REST API for Leadline.
//!
//! Exposes an axum [`Router`] backed by a [`leadline_engine::Engine`]. Every
//! route requires the `X-Agent-Id` header set by the identity provider; TLS
//! and authentication are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", leadline_api::api_router(engine.clone()))
//! ```

pub mod agent;
pub mod error;
pub mod etag;
pub mod interactions;
pub mod leads;
pub mod queue;
pub mod scores;
pub mod sequences;

use axum::{
  Router,
  routing::{get, post},
};
use leadline_core::store::LeadStore;
use leadline_engine::{Engine, TextUnderstanding};

pub use agent::{AGENT_HEADER, Agent};
pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, T>(engine: Engine<S, T>) -> Router<()>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Router::new()
    // Leads
    .route("/leads", get(leads::list::<S, T>).post(leads::create::<S, T>))
    .route("/leads/{id}", get(leads::get_one::<S, T>).patch(leads::patch::<S, T>))
    // Interactions
    .route(
      "/leads/{id}/interactions",
      get(interactions::timeline::<S, T>).post(interactions::record::<S, T>),
    )
    // Scores
    .route("/leads/{id}/rescore", post(scores::rescore::<S, T>))
    .route("/leads/{id}/score", get(scores::current::<S, T>))
    .route("/leads/{id}/scores", get(scores::history::<S, T>))
    // Sequences
    .route("/leads/{id}/sequence", get(sequences::current::<S, T>))
    .route("/leads/{id}/sequences", get(sequences::history::<S, T>))
    .route("/leads/{id}/sequence/advance", post(sequences::advance::<S, T>))
    .route("/leads/{id}/sequence/pause", post(sequences::pause::<S, T>))
    .route("/leads/{id}/sequence/resume", post(sequences::resume::<S, T>))
    .route("/followups/due", get(sequences::due::<S, T>))
    // Dashboard
    .route("/queue", get(queue::handler::<S, T>))
    .with_state(engine)
}

// ─── Integration tests ────────────────────────────────────────────────────────
