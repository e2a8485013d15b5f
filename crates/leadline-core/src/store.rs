//! The `LeadStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `leadline-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.
//!
//! Every method is scoped by [`AgentId`]; a row belonging to another agent is
//! indistinguishable from a missing one. Timestamps are supplied by the caller
//! so the engine's clock is the only source of time.

use std::{fmt, future::Future, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  interaction::{Interaction, NewInteraction},
  lead::{AgentId, Lead, LeadPatch, LeadStatus, NewLead, PatchOutcome},
  score::Score,
  sequence::FollowUpSequence,
};

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;

// ─── Lead listing ────────────────────────────────────────────────────────────

/// Sort key of a lead listing. Both orders are ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadOrder {
  #[default]
  Created,
  Updated,
}

/// Position in a listing: the sort key and id of the last lead returned.
///
/// Encodes to an opaque string so a consumer can restart from any page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadCursor {
  pub at:      DateTime<Utc>,
  pub lead_id: Uuid,
}

impl LeadCursor {
  pub fn after(lead: &Lead, order: LeadOrder) -> Self {
    let at = match order {
      LeadOrder::Created => lead.created_at,
      LeadOrder::Updated => lead.updated_at,
    };
    Self { at, lead_id: lead.lead_id }
  }

  pub fn encode(&self) -> String {
    format!("{}_{}", self.at.to_rfc3339_opts(SecondsFormat::Micros, true), self.lead_id.simple())
  }
}

impl fmt::Display for LeadCursor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.encode()) }
}

impl FromStr for LeadCursor {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Error> {
    let invalid = || Error::InvalidCursor(s.to_owned());
    let (at, id) = s.rsplit_once('_').ok_or_else(invalid)?;
    let at = DateTime::parse_from_rfc3339(at).map_err(|_| invalid())?.with_timezone(&Utc);
    let lead_id = Uuid::parse_str(id).map_err(|_| invalid())?;
    Ok(Self { at, lead_id })
  }
}

impl Serialize for LeadCursor {
  fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&self.encode())
  }
}

impl<'de> Deserialize<'de> for LeadCursor {
  fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// Parameters for [`LeadStore::list_leads`].
#[derive(Debug, Clone)]
pub struct LeadQuery {
  /// Empty means every status.
  pub statuses:       Vec<LeadStatus>,
  /// Inclusive lower bound on `created_at`.
  pub created_after:  Option<DateTime<Utc>>,
  /// Exclusive upper bound on `created_at`.
  pub created_before: Option<DateTime<Utc>>,
  pub order:          LeadOrder,
  /// Resume strictly after this position.
  pub after:          Option<LeadCursor>,
  pub limit:          usize,
}

impl Default for LeadQuery {
  fn default() -> Self {
    Self {
      statuses:       Vec::new(),
      created_after:  None,
      created_before: None,
      order:          LeadOrder::default(),
      after:          None,
      limit:          DEFAULT_PAGE_LIMIT,
    }
  }
}

impl LeadQuery {
  /// Page size actually used, between 1 and [`MAX_PAGE_LIMIT`].
  pub fn effective_limit(&self) -> usize { self.limit.clamp(1, MAX_PAGE_LIMIT) }
}

/// One page of a listing. `next` is `None` on the last page.
#[derive(Debug, Clone, Serialize)]
pub struct LeadPage {
  pub leads: Vec<Lead>,
  pub next:  Option<LeadCursor>,
}

// ─── Dashboard and scan views ────────────────────────────────────────────────

/// An open lead with its current score and active sequence, if any.
#[derive(Debug, Clone)]
pub struct QueueEntry {
  pub lead:     Lead,
  pub score:    Option<Score>,
  pub sequence: Option<FollowUpSequence>,
}

/// Identifies a lead whose sequence has a due time in the past.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DueKey {
  pub agent_id: AgentId,
  pub lead_id:  Uuid,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a lead store backend.
///
/// Interactions and scores are append-only. Leads change only through
/// [`LeadStore::update_lead`] (optimistic on `version`) and the denormalized
/// interaction counters maintained by [`LeadStore::append_interaction`].
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait LeadStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Leads ─────────────────────────────────────────────────────────────

  /// Persist a new lead with status `new` and version 1. The input is
  /// validated again here; invalid input never reaches storage.
  fn create_lead(
    &self,
    input: NewLead,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Lead, Self::Error>> + Send + '_;

  fn get_lead<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + 'a;

  /// Apply `patch` if the stored version equals `expected_version`, bumping
  /// the version and `updated_at`. Transition rules are the caller's concern.
  fn update_lead<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
    expected_version: u64,
    patch: LeadPatch,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<PatchOutcome, Self::Error>> + Send + 'a;

  fn list_leads<'a>(
    &'a self,
    agent: &'a AgentId,
    query: &'a LeadQuery,
  ) -> impl Future<Output = Result<LeadPage, Self::Error>> + Send + 'a;

  // ── Interactions ──────────────────────────────────────────────────────

  /// Append an interaction, assigning the next per-lead `seq` and updating
  /// the lead's `last_interaction_at` and `interaction_count` in the same
  /// transaction. Returns `None` if the lead does not exist.
  fn append_interaction<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
    input: NewInteraction,
    recorded_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Interaction>, Self::Error>> + Send + 'a;

  /// Interactions with `seq > after_seq`, ordered by `occurred_at` then `seq`.
  fn list_interactions<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
    after_seq: u64,
  ) -> impl Future<Output = Result<Vec<Interaction>, Self::Error>> + Send + 'a;

  // ── Scores ────────────────────────────────────────────────────────────

  /// Append a score to the lead's history and touch the lead's `updated_at`.
  fn append_score<'a>(
    &'a self,
    score: &'a Score,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The score with the greatest `computed_at`.
  fn latest_score<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Option<Score>, Self::Error>> + Send + 'a;

  /// Newest first, at most `limit` entries.
  fn score_history<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Score>, Self::Error>> + Send + 'a;

  // ── Sequences ─────────────────────────────────────────────────────────

  /// Insert a sequence. Returns `None` if the lead already has an active one.
  fn create_sequence<'a>(
    &'a self,
    sequence: &'a FollowUpSequence,
  ) -> impl Future<Output = Result<Option<FollowUpSequence>, Self::Error>> + Send + 'a;

  fn active_sequence<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Option<FollowUpSequence>, Self::Error>> + Send + 'a;

  /// Every sequence the lead has had, newest first.
  fn sequence_history<'a>(
    &'a self,
    agent: &'a AgentId,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FollowUpSequence>, Self::Error>> + Send + 'a;

  /// Overwrite a sequence whose stored version equals `sequence.version`.
  /// Returns the saved copy with its new version, or `None` on conflict.
  /// Terminal sequences are never overwritten.
  fn save_sequence<'a>(
    &'a self,
    sequence: &'a FollowUpSequence,
  ) -> impl Future<Output = Result<Option<FollowUpSequence>, Self::Error>> + Send + 'a;

  /// Active sequences, across all agents, whose `next_due_at` is at or before
  /// `now`.
  fn due_sequences(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DueKey>, Self::Error>> + Send + '_;

  /// The agent's sequences currently in state `due`, oldest anchor first.
  fn due_followups<'a>(
    &'a self,
    agent: &'a AgentId,
  ) -> impl Future<Output = Result<Vec<FollowUpSequence>, Self::Error>> + Send + 'a;

  // ── Dashboard ─────────────────────────────────────────────────────────

  /// Every open (`won`/`lost` excluded) lead of the agent with its latest
  /// score and active sequence. Unordered.
  fn queue_entries<'a>(
    &'a self,
    agent: &'a AgentId,
  ) -> impl Future<Output = Result<Vec<QueueEntry>, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn cursor_survives_encoding() {
    let cursor = LeadCursor {
      at:      Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
      lead_id: Uuid::new_v4(),
    };
    let parsed: LeadCursor = cursor.encode().parse().unwrap();
    assert_eq!(parsed, cursor);
  }

  #[test]
  fn garbage_cursor_is_rejected() {
    assert!(matches!("nope".parse::<LeadCursor>(), Err(Error::InvalidCursor(_))));
    assert!("2026-03-01T09:30:00Z_xyz".parse::<LeadCursor>().is_err());
  }

  #[test]
  fn limit_is_bounded() {
    let q = LeadQuery { limit: 0, ..LeadQuery::default() };
    assert_eq!(q.effective_limit(), 1);
    let q = LeadQuery { limit: 10_000, ..LeadQuery::default() };
    assert_eq!(q.effective_limit(), MAX_PAGE_LIMIT);
  }
}
