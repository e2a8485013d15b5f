//! Error type for `leadline-engine`.

use thiserror::Error;
use uuid::Uuid;

use leadline_core::sequence::SequenceState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input or a forbidden status transition. Never retried.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("{what} not found for lead {lead_id}")]
  NotFound { what: &'static str, lead_id: Uuid },

  /// The caller's version token is stale.
  #[error("version conflict: record is at version {current_version}")]
  Conflict { current_version: u64 },

  /// Scoring succeeded but the result could not be stored. The score is
  /// queued and written by the background scan.
  #[error("score for lead {lead_id} could not be persisted")]
  ScoringPersistFailed {
    lead_id: Uuid,
    #[source]
    source:  BoxError,
  },

  #[error("sequence {sequence_id} is {state} and cannot change")]
  SequenceState { sequence_id: Uuid, state: SequenceState },

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub(crate) fn lead_not_found(lead_id: Uuid) -> Self { Self::NotFound { what: "lead", lead_id } }
}

impl From<leadline_core::Error> for Error {
  fn from(e: leadline_core::Error) -> Self {
    match e {
      leadline_core::Error::SequenceClosed { id, state } => {
        Self::SequenceState { sequence_id: id, state }
      }
      leadline_core::Error::Serialization(e) => Self::store(e),
      other => Self::Validation(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
