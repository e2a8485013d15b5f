//! Handlers for lead scores.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/leads/{id}/rescore` | Recompute now |
//! | `GET`  | `/leads/{id}/score` | Current score; recomputed first if stale |
//! | `GET`  | `/leads/{id}/scores` | History, newest first; optional `limit` |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use leadline_core::{score::Score, store::LeadStore};
use leadline_engine::{Engine, TextUnderstanding};
use serde::Deserialize;
use uuid::Uuid;

use crate::{agent::Agent, error::ApiError};

const DEFAULT_HISTORY: usize = 20;
const MAX_HISTORY: usize = 200;

/// `POST /leads/{id}/rescore`
pub async fn rescore<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<Score>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.rescore(&agent, id).await?))
}

/// `GET /leads/{id}/score`
pub async fn current<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<Score>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.current_score(&agent, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /leads/{id}/scores[?limit=N]`
pub async fn history<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Score>>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let limit = params.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
  Ok(Json(engine.score_history(&agent, id, limit).await?))
}
