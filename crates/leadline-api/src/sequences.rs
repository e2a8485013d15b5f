//! Handlers for follow-up sequences.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/leads/{id}/sequence` | Active sequence, or the latest closed one |
//! | `GET`  | `/leads/{id}/sequences` | Every sequence, newest first |
//! | `POST` | `/leads/{id}/sequence/advance` | 409 if the sequence is closed |
//! | `POST` | `/leads/{id}/sequence/pause` | |
//! | `POST` | `/leads/{id}/sequence/resume` | |
//! | `GET`  | `/followups/due` | Steps due for the agent |

use axum::{
  Json,
  extract::{Path, State},
};
use leadline_core::{sequence::FollowUpSequence, store::LeadStore};
use leadline_engine::{Engine, TextUnderstanding, sequencer::DueFollowUp};
use uuid::Uuid;

use crate::{agent::Agent, error::ApiError};

/// `GET /leads/{id}/sequence`
pub async fn current<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<FollowUpSequence>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.sequence(&agent, id).await?))
}

/// `GET /leads/{id}/sequences`
pub async fn history<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<FollowUpSequence>>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.sequence_history(&agent, id).await?))
}

/// `POST /leads/{id}/sequence/advance`
pub async fn advance<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<FollowUpSequence>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.advance_sequence(&agent, id).await?))
}

/// `POST /leads/{id}/sequence/pause`
pub async fn pause<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<FollowUpSequence>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.pause_sequence(&agent, id).await?))
}

/// `POST /leads/{id}/sequence/resume`
pub async fn resume<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<Json<FollowUpSequence>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.resume_sequence(&agent, id).await?))
}

/// `GET /followups/due`
pub async fn due<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
) -> Result<Json<Vec<DueFollowUp>>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  Ok(Json(engine.due_followups(&agent).await?))
}
