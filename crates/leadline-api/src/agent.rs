//! The calling agent, taken from the `X-Agent-Id` header.
//!
//! The identity provider in front of the API authenticates the agent and sets
//! the header; it is trusted as-is.

use axum::{extract::FromRequestParts, http::request::Parts};
use leadline_core::lead::AgentId;

use crate::error::ApiError;

pub const AGENT_HEADER: &str = "x-agent-id";

/// Extractor for the agent every request is scoped to.
#[derive(Debug, Clone)]
pub struct Agent(pub AgentId);

impl<S: Send + Sync> FromRequestParts<S> for Agent {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let value = parts
      .headers
      .get(AGENT_HEADER)
      .ok_or_else(|| ApiError::Unauthorized(format!("{AGENT_HEADER} header is required")))?;
    let id = value
      .to_str()
      .map(str::trim)
      .map_err(|_| ApiError::Unauthorized(format!("{AGENT_HEADER} is not valid text")))?;
    if id.is_empty() {
      return Err(ApiError::Unauthorized(format!("{AGENT_HEADER} is blank")));
    }
    Ok(Agent(AgentId::new(id)))
  }
}
