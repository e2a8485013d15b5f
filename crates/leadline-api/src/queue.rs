//! `GET /queue[?page=N][&page_size=M]`: the agent's priority queue.

use axum::{
  Json,
  extract::{Query, State},
};
use leadline_core::store::LeadStore;
use leadline_engine::{Engine, TextUnderstanding, dashboard::QueuePage};
use serde::Deserialize;

use crate::{agent::Agent, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueueParams {
  /// 1-based; defaults to the first page.
  pub page:      Option<usize>,
  pub page_size: Option<usize>,
}

pub async fn handler<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Query(params): Query<QueueParams>,
) -> Result<Json<QueuePage>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let page = engine.priority_queue(&agent, params.page.unwrap_or(1), params.page_size).await?;
  Ok(Json(page))
}
