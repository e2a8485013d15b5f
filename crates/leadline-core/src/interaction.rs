//! Interaction events: the append-only timeline of contact with a lead.
//!
//! Interactions are never updated or deleted. Ordering is by `occurred_at`,
//! with the per-lead insertion `seq` breaking ties.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, lead::AgentId};

/// Longest accepted free-text summary, in characters.
pub const MAX_SUMMARY_CHARS: usize = 4000;

/// How far into the future an `occurred_at` may lie before it is rejected.
pub const MAX_FUTURE_SKEW_SECS: i64 = 60;

// ─── Enumerations ────────────────────────────────────────────────────────────

macro_rules! wire_enum {
  ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum $name {
      $(#[serde(rename = $wire)] $variant),+
    }

    impl $name {
      pub const ALL: &'static [$name] = &[$(Self::$variant),+];

      pub fn as_str(self) -> &'static str {
        match self { $(Self::$variant => $wire),+ }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
    }

    impl FromStr for $name {
      type Err = Error;

      fn from_str(s: &str) -> Result<Self> {
        Self::ALL
          .iter()
          .copied()
          .find(|v| v.as_str() == s)
          .ok_or_else(|| Error::UnknownVariant { kind: $kind, value: s.to_owned() })
      }
    }
  };
}

wire_enum! {
  /// Medium the contact happened over.
  Channel, "channel" {
    Call => "call",
    Message => "message",
    Email => "email",
    Visit => "visit",
    SystemNote => "system-note",
  }
}

wire_enum! {
  Direction, "direction" {
    Inbound => "inbound",
    Outbound => "outbound",
  }
}

wire_enum! {
  /// What came of the contact, when the agent tagged it.
  Outcome, "outcome" {
    NoAnswer => "no-answer",
    Interested => "interested",
    NotInterested => "not-interested",
    Scheduled => "scheduled",
  }
}

impl Channel {
  /// A system note documents something; it is not contact with the lead.
  pub fn is_contact(self) -> bool { !matches!(self, Self::SystemNote) }
}

impl Outcome {
  /// Outcomes that shorten the remaining follow-up cadence.
  pub fn escalates(self) -> bool { matches!(self, Self::Interested | Self::Scheduled) }
}

// ─── Interaction ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
  pub interaction_id: Uuid,
  pub lead_id:        Uuid,
  pub agent_id:       AgentId,
  /// Per-lead insertion sequence, starting at 1.
  pub seq:            u64,
  pub channel:        Channel,
  pub direction:      Direction,
  /// When the contact happened in the real world.
  pub occurred_at:    DateTime<Utc>,
  pub summary:        Option<String>,
  pub outcome:        Option<Outcome>,
  /// Server-assigned; never changes after creation.
  pub recorded_at:    DateTime<Utc>,
}

impl Interaction {
  /// The timestamp used for recency and sequencing. A contact cannot have
  /// happened after it was recorded, so the allowed clock skew is clipped.
  pub fn effective_at(&self) -> DateTime<Utc> { self.occurred_at.min(self.recorded_at) }
}

/// Input to [`crate::store::LeadStore::append_interaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInteraction {
  pub channel:     Channel,
  pub direction:   Direction,
  pub occurred_at: DateTime<Utc>,
  #[serde(default)]
  pub summary:     Option<String>,
  #[serde(default)]
  pub outcome:     Option<Outcome>,
}

impl NewInteraction {
  pub fn new(channel: Channel, direction: Direction, occurred_at: DateTime<Utc>) -> Self {
    Self { channel, direction, occurred_at, summary: None, outcome: None }
  }

  pub fn with_outcome(mut self, outcome: Outcome) -> Self {
    self.outcome = Some(outcome);
    self
  }

  pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
    self.summary = Some(summary.into());
    self
  }

  /// Reject malformed input before anything is written.
  pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
    if self.occurred_at > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
      return Err(Error::InvalidInteraction(format!(
        "occurred_at {} is in the future",
        self.occurred_at
      )));
    }
    if let Some(summary) = &self.summary
      && summary.chars().count() > MAX_SUMMARY_CHARS
    {
      return Err(Error::InvalidInteraction(format!(
        "summary exceeds {MAX_SUMMARY_CHARS} characters"
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_names_match_serde() {
    assert_eq!(serde_json::to_string(&Channel::SystemNote).unwrap(), "\"system-note\"");
    assert_eq!(serde_json::to_string(&Outcome::NotInterested).unwrap(), "\"not-interested\"");
    for outcome in Outcome::ALL {
      let json = serde_json::to_string(outcome).unwrap();
      assert_eq!(json.trim_matches('"'), outcome.as_str());
      assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), *outcome);
    }
  }

  #[test]
  fn unknown_channel_is_rejected_by_serde() {
    let body = r#"{"channel":"fax","direction":"inbound","occurred_at":"2026-01-01T00:00:00Z"}"#;
    assert!(serde_json::from_str::<NewInteraction>(body).is_err());
  }

  #[test]
  fn future_interactions_are_invalid() {
    let now = Utc::now();
    let ok = NewInteraction::new(Channel::Call, Direction::Outbound, now + Duration::seconds(30));
    assert!(ok.validate(now).is_ok());

    let late = NewInteraction::new(Channel::Call, Direction::Outbound, now + Duration::hours(1));
    assert!(matches!(late.validate(now), Err(Error::InvalidInteraction(_))));
  }

  #[test]
  fn oversized_summary_is_invalid() {
    let now = Utc::now();
    let input = NewInteraction::new(Channel::Email, Direction::Inbound, now)
      .with_summary("x".repeat(MAX_SUMMARY_CHARS + 1));
    assert!(input.validate(now).is_err());
  }
}
