//! Handlers for `/leads/{id}/interactions`.
//!
//! Recording returns 202: the interaction is durable, while the rescore and
//! sequence advance it triggers run in the background.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use leadline_core::{
  interaction::{Interaction, NewInteraction},
  store::LeadStore,
};
use leadline_engine::{Engine, TextUnderstanding};
use uuid::Uuid;

use crate::{agent::Agent, error::ApiError};

/// `POST /leads/{id}/interactions`
pub async fn record<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
  Json(body): Json<NewInteraction>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let interaction = engine.record_interaction(&agent, id, body).await?;
  Ok((StatusCode::ACCEPTED, Json(interaction)))
}

/// `GET /leads/{id}/interactions`
pub async fn timeline<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Interaction>>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.interactions(&agent, id).await?))
}
