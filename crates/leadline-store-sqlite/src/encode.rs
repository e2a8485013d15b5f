//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`),
//! so comparing the text compares the instants. Structured fields (contact,
//! interest, source, factors, steps) are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings. Counters are `INTEGER` columns.

use chrono::{DateTime, SecondsFormat, Utc};
use leadline_core::{
  interaction::Interaction,
  lead::{AgentId, Lead},
  score::Score,
  sequence::FollowUpSequence,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> { s.map(decode_dt).transpose() }

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

fn decode_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> { Ok(serde_json::from_str(s)?) }

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Leads ───────────────────────────────────────────────────────────────────

/// Raw strings read directly from a `leads` row.
pub struct RawLead {
  pub lead_id:             String,
  pub agent_id:            String,
  pub name:                String,
  pub contact:             String,
  pub notes:               String,
  pub interest:            String,
  pub source:              String,
  pub status:              String,
  pub version:             i64,
  pub created_at:          String,
  pub updated_at:          String,
  pub last_interaction_at: Option<String>,
  pub interaction_count:   i64,
}

impl RawLead {
  pub const COLUMNS: &'static str = "lead_id, agent_id, name, contact, notes, interest, source, \
     status, version, created_at, updated_at, last_interaction_at, interaction_count";

  /// Read a row selected with [`Self::COLUMNS`], starting at `offset`.
  pub fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      lead_id:             row.get(offset)?,
      agent_id:            row.get(offset + 1)?,
      name:                row.get(offset + 2)?,
      contact:             row.get(offset + 3)?,
      notes:               row.get(offset + 4)?,
      interest:            row.get(offset + 5)?,
      source:              row.get(offset + 6)?,
      status:              row.get(offset + 7)?,
      version:             row.get(offset + 8)?,
      created_at:          row.get(offset + 9)?,
      updated_at:          row.get(offset + 10)?,
      last_interaction_at: row.get(offset + 11)?,
      interaction_count:   row.get(offset + 12)?,
    })
  }

  pub fn into_lead(self) -> Result<Lead> {
    Ok(Lead {
      lead_id:             decode_uuid(&self.lead_id)?,
      agent_id:            AgentId::new(self.agent_id),
      name:                self.name,
      contact:             decode_json(&self.contact)?,
      notes:               self.notes,
      interest:            decode_json(&self.interest)?,
      source:              decode_json(&self.source)?,
      status:              self.status.parse()?,
      version:             decode_count(self.version),
      created_at:          decode_dt(&self.created_at)?,
      updated_at:          decode_dt(&self.updated_at)?,
      last_interaction_at: decode_opt_dt(self.last_interaction_at.as_deref())?,
      interaction_count:   decode_count(self.interaction_count),
    })
  }
}

// ─── Interactions ────────────────────────────────────────────────────────────

pub struct RawInteraction {
  pub interaction_id: String,
  pub lead_id:        String,
  pub agent_id:       String,
  pub seq:            i64,
  pub channel:        String,
  pub direction:      String,
  pub occurred_at:    String,
  pub summary:        Option<String>,
  pub outcome:        Option<String>,
  pub recorded_at:    String,
}

impl RawInteraction {
  pub const COLUMNS: &'static str = "interaction_id, lead_id, agent_id, seq, channel, direction, \
     occurred_at, summary, outcome, recorded_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      interaction_id: row.get(0)?,
      lead_id:        row.get(1)?,
      agent_id:       row.get(2)?,
      seq:            row.get(3)?,
      channel:        row.get(4)?,
      direction:      row.get(5)?,
      occurred_at:    row.get(6)?,
      summary:        row.get(7)?,
      outcome:        row.get(8)?,
      recorded_at:    row.get(9)?,
    })
  }

  pub fn into_interaction(self) -> Result<Interaction> {
    Ok(Interaction {
      interaction_id: decode_uuid(&self.interaction_id)?,
      lead_id:        decode_uuid(&self.lead_id)?,
      agent_id:       AgentId::new(self.agent_id),
      seq:            decode_count(self.seq),
      channel:        self.channel.parse()?,
      direction:      self.direction.parse()?,
      occurred_at:    decode_dt(&self.occurred_at)?,
      summary:        self.summary,
      outcome:        self.outcome.as_deref().map(str::parse).transpose()?,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

// ─── Scores ──────────────────────────────────────────────────────────────────

pub struct RawScore {
  pub score_id:           String,
  pub lead_id:            String,
  pub agent_id:           String,
  pub value:              f64,
  pub confidence:         f64,
  pub tier:               String,
  pub factors:            String,
  pub recommendations:    String,
  pub method:             String,
  pub lead_version:       i64,
  pub basis_interactions: i64,
  pub computed_at:        String,
}

impl RawScore {
  pub const COLUMNS: &'static str = "score_id, lead_id, agent_id, value, confidence, tier, \
     factors, recommendations, method, lead_version, basis_interactions, computed_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      score_id:           row.get(0)?,
      lead_id:            row.get(1)?,
      agent_id:           row.get(2)?,
      value:              row.get(3)?,
      confidence:         row.get(4)?,
      tier:               row.get(5)?,
      factors:            row.get(6)?,
      recommendations:    row.get(7)?,
      method:             row.get(8)?,
      lead_version:       row.get(9)?,
      basis_interactions: row.get(10)?,
      computed_at:        row.get(11)?,
    })
  }

  pub fn into_score(self) -> Result<Score> {
    Ok(Score {
      score_id:           decode_uuid(&self.score_id)?,
      lead_id:            decode_uuid(&self.lead_id)?,
      agent_id:           AgentId::new(self.agent_id),
      value:              self.value,
      confidence:         self.confidence,
      tier:               self.tier.parse()?,
      factors:            decode_json(&self.factors)?,
      recommendations:    decode_json(&self.recommendations)?,
      method:             self.method.parse()?,
      lead_version:       decode_count(self.lead_version),
      basis_interactions: decode_count(self.basis_interactions),
      computed_at:        decode_dt(&self.computed_at)?,
    })
  }
}

// ─── Sequences ───────────────────────────────────────────────────────────────

pub struct RawSequence {
  pub sequence_id:      String,
  pub lead_id:          String,
  pub agent_id:         String,
  pub tier:             String,
  pub steps:            String,
  pub current_step:     i64,
  pub state:            String,
  pub anchor_at:        String,
  pub next_due_at:      Option<String>,
  pub escalated:        bool,
  pub last_applied_seq: i64,
  pub proposed_status:  Option<String>,
  pub closed_reason:    Option<String>,
  pub version:          i64,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawSequence {
  pub const COLUMNS: &'static str = "sequence_id, lead_id, agent_id, tier, steps, current_step, \
     state, anchor_at, next_due_at, escalated, last_applied_seq, proposed_status, closed_reason, \
     version, created_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence_id:      row.get(0)?,
      lead_id:          row.get(1)?,
      agent_id:         row.get(2)?,
      tier:             row.get(3)?,
      steps:            row.get(4)?,
      current_step:     row.get(5)?,
      state:            row.get(6)?,
      anchor_at:        row.get(7)?,
      next_due_at:      row.get(8)?,
      escalated:        row.get(9)?,
      last_applied_seq: row.get(10)?,
      proposed_status:  row.get(11)?,
      closed_reason:    row.get(12)?,
      version:          row.get(13)?,
      created_at:       row.get(14)?,
      updated_at:       row.get(15)?,
    })
  }

  pub fn into_sequence(self) -> Result<FollowUpSequence> {
    Ok(FollowUpSequence {
      sequence_id:      decode_uuid(&self.sequence_id)?,
      lead_id:          decode_uuid(&self.lead_id)?,
      agent_id:         AgentId::new(self.agent_id),
      tier:             self.tier.parse()?,
      steps:            decode_json(&self.steps)?,
      current_step:     usize::try_from(self.current_step).unwrap_or(0),
      state:            self.state.parse()?,
      anchor_at:        decode_dt(&self.anchor_at)?,
      next_due_at:      decode_opt_dt(self.next_due_at.as_deref())?,
      escalated:        self.escalated,
      last_applied_seq: decode_count(self.last_applied_seq),
      proposed_status:  self.proposed_status.as_deref().map(str::parse).transpose()?,
      closed_reason:    self.closed_reason,
      version:          decode_count(self.version),
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// Column values of a sequence in [`RawSequence::COLUMNS`] order, ready to
/// bind.
pub struct SequenceParams {
  pub sequence_id:      String,
  pub lead_id:          String,
  pub agent_id:         String,
  pub tier:             &'static str,
  pub steps:            String,
  pub current_step:     i64,
  pub state:            &'static str,
  pub anchor_at:        String,
  pub next_due_at:      Option<String>,
  pub escalated:        bool,
  pub last_applied_seq: i64,
  pub proposed_status:  Option<&'static str>,
  pub closed_reason:    Option<String>,
  pub version:          i64,
  pub created_at:       String,
  pub updated_at:       String,
}

impl SequenceParams {
  pub fn encode(s: &FollowUpSequence) -> Result<Self> {
    Ok(Self {
      sequence_id:      encode_uuid(s.sequence_id),
      lead_id:          encode_uuid(s.lead_id),
      agent_id:         s.agent_id.as_str().to_owned(),
      tier:             s.tier.as_str(),
      steps:            encode_json(&s.steps)?,
      current_step:     i64::try_from(s.current_step).unwrap_or(i64::MAX),
      state:            s.state.as_str(),
      anchor_at:        encode_dt(s.anchor_at),
      next_due_at:      s.next_due_at.map(encode_dt),
      escalated:        s.escalated,
      last_applied_seq: encode_count(s.last_applied_seq),
      proposed_status:  s.proposed_status.map(|st| st.as_str()),
      closed_reason:    s.closed_reason.clone(),
      version:          encode_count(s.version),
      created_at:       encode_dt(s.created_at),
      updated_at:       encode_dt(s.updated_at),
    })
  }
}
