//! Error types for `leadline-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{lead::LeadStatus, sequence::SequenceState};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid lead: {0}")]
  InvalidLead(String),

  #[error("invalid interaction: {0}")]
  InvalidInteraction(String),

  #[error("status cannot move from {from} to {to}")]
  InvalidTransition { from: LeadStatus, to: LeadStatus },

  #[error("sequence {id} is {state} and cannot change")]
  SequenceClosed { id: Uuid, state: SequenceState },

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("invalid cursor: {0:?}")]
  InvalidCursor(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
