//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use leadline_engine::Error as EngineError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The `X-Agent-Id` header is missing or blank.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Engine(#[from] EngineError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Engine(e) => match e {
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Conflict { .. } | EngineError::SequenceState { .. } => StatusCode::CONFLICT,
        EngineError::ScoringPersistFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      ApiError::Unauthorized(_) => "unauthorized",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Engine(e) => match e {
        EngineError::Validation(_) => "validation",
        EngineError::NotFound { .. } => "not_found",
        EngineError::Conflict { .. } => "conflict",
        EngineError::SequenceState { .. } => "sequence_state",
        EngineError::ScoringPersistFailed { .. } => "scoring_persist_failed",
        EngineError::Store(_) => "store",
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, kind = self.kind(), "request failed");
    }

    let mut body = json!({ "error": self.to_string(), "kind": self.kind() });
    if let ApiError::Engine(EngineError::Conflict { current_version }) = &self {
      body["current_version"] = json!(current_version);
    }
    (status, Json(body)).into_response()
  }
}
