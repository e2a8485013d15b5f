//! Lead types: the prospect record every other entity hangs off.
//!
//! A lead is never physically deleted. It is soft-closed through the `won` and
//! `lost` statuses. Only `status`, `notes` and `interest` are patchable, and
//! every successful patch bumps the optimistic `version` token.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Agent identity ──────────────────────────────────────────────────────────

/// Opaque agent identifier supplied by the identity provider. The engine trusts
/// it as the scoping key for every read and write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AgentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Pipeline position of a lead. Declaration order is the forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
  New,
  Contacted,
  Qualified,
  Negotiating,
  Won,
  Lost,
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
  Agent,
  Engine,
}

impl LeadStatus {
  pub const ALL: [LeadStatus; 6] = [
    Self::New,
    Self::Contacted,
    Self::Qualified,
    Self::Negotiating,
    Self::Won,
    Self::Lost,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::New => "new",
      Self::Contacted => "contacted",
      Self::Qualified => "qualified",
      Self::Negotiating => "negotiating",
      Self::Won => "won",
      Self::Lost => "lost",
    }
  }

  fn rank(self) -> u8 {
    match self {
      Self::New => 0,
      Self::Contacted => 1,
      Self::Qualified => 2,
      Self::Negotiating => 3,
      Self::Won | Self::Lost => 4,
    }
  }

  /// `won` and `lost` are terminal for the pipeline.
  pub fn is_closed(self) -> bool { matches!(self, Self::Won | Self::Lost) }

  /// Validate a transition from `self` to `next`.
  ///
  /// Transitions are forward-only. The single exception is reopening a lost
  /// lead (`lost` → `new`), which only an agent may do. Setting the current
  /// status again is accepted as a no-op.
  pub fn check_transition(self, next: LeadStatus, actor: Actor) -> Result<()> {
    let allowed = if self == next {
      true
    } else if self == Self::Lost && next == Self::New {
      actor == Actor::Agent
    } else {
      !self.is_closed() && next.rank() > self.rank()
    };

    if allowed {
      Ok(())
    } else {
      Err(Error::InvalidTransition { from: self, to: next })
    }
  }
}

impl fmt::Display for LeadStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for LeadStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|st| st.as_str() == s)
      .ok_or_else(|| Error::UnknownVariant { kind: "lead status", value: s.to_owned() })
  }
}

// ─── Contact and interest ────────────────────────────────────────────────────

/// How the lead can be reached. At least one channel is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChannels {
  pub phone: Option<String>,
  pub email: Option<String>,
}

impl ContactChannels {
  fn phone(&self) -> Option<&str> { non_blank(self.phone.as_deref()) }

  fn email(&self) -> Option<&str> { non_blank(self.email.as_deref()) }

  pub fn is_reachable(&self) -> bool { self.phone().is_some() || self.email().is_some() }
}

/// Budget bounds in the smallest whole currency unit the agent works in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
  pub min: Option<u64>,
  pub max: Option<u64>,
}

impl BudgetRange {
  /// True when either bound carries a real number.
  pub fn is_explicit(&self) -> bool {
    self.min.is_some_and(|v| v > 0) || self.max.is_some_and(|v| v > 0)
  }
}

/// What the prospect is looking for. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInterest {
  pub property_type: Option<String>,
  pub budget:        Option<BudgetRange>,
  pub location:      Option<String>,
}

impl PropertyInterest {
  pub fn has_property_type(&self) -> bool { non_blank(self.property_type.as_deref()).is_some() }

  pub fn has_budget(&self) -> bool { self.budget.as_ref().is_some_and(BudgetRange::is_explicit) }

  pub fn has_location(&self) -> bool { non_blank(self.location.as_deref()).is_some() }
}

/// How the lead entered the system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeadSource {
  /// Typed in by the agent.
  #[default]
  Manual,
  /// Bulk import from a portal, spreadsheet or another CRM.
  Imported {
    source_name:  String,
    /// Identifier of the record in the originating system, if known.
    external_ref: Option<String>,
  },
}

// ─── Lead ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
  pub lead_id:             Uuid,
  pub agent_id:            AgentId,
  pub name:                String,
  pub contact:             ContactChannels,
  pub notes:               String,
  pub interest:            PropertyInterest,
  pub source:              LeadSource,
  pub status:              LeadStatus,
  /// Optimistic concurrency token; starts at 1 and is bumped by every patch.
  pub version:             u64,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
  pub last_interaction_at: Option<DateTime<Utc>>,
  pub interaction_count:   u64,
}

// ─── NewLead ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::LeadStore::create_lead`]. Identity, status and
/// timestamps are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
  pub agent_id: AgentId,
  pub name:     String,
  #[serde(default)]
  pub contact:  ContactChannels,
  #[serde(default)]
  pub notes:    String,
  #[serde(default)]
  pub interest: PropertyInterest,
  #[serde(default)]
  pub source:   LeadSource,
}

impl NewLead {
  /// Convenience constructor with empty notes and interest.
  pub fn new(agent_id: AgentId, name: impl Into<String>, contact: ContactChannels) -> Self {
    Self {
      agent_id,
      name: name.into(),
      contact,
      notes: String::new(),
      interest: PropertyInterest::default(),
      source: LeadSource::default(),
    }
  }

  pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = notes.into();
    self
  }

  pub fn with_interest(mut self, interest: PropertyInterest) -> Self {
    self.interest = interest;
    self
  }

  /// Reject input that must never reach storage.
  pub fn validate(&self) -> Result<()> {
    if self.agent_id.as_str().trim().is_empty() {
      return Err(Error::InvalidLead("agent id is empty".into()));
    }
    if self.name.trim().is_empty() {
      return Err(Error::InvalidLead("name is empty".into()));
    }
    if !self.contact.is_reachable() {
      return Err(Error::InvalidLead("at least one of phone or email is required".into()));
    }
    if let Some(email) = self.contact.email()
      && !email.contains('@')
    {
      return Err(Error::InvalidLead(format!("email {email:?} is not an address")));
    }
    if let Some(phone) = self.contact.phone()
      && phone.chars().filter(char::is_ascii_digit).count() < 6
    {
      return Err(Error::InvalidLead(format!("phone {phone:?} has too few digits")));
    }
    if let Some(BudgetRange { min: Some(min), max: Some(max) }) = &self.interest.budget
      && min > max
    {
      return Err(Error::InvalidLead("budget minimum exceeds maximum".into()));
    }
    Ok(())
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// The patchable subset of a lead. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadPatch {
  pub status:   Option<LeadStatus>,
  pub notes:    Option<String>,
  pub interest: Option<PropertyInterest>,
}

impl LeadPatch {
  pub fn is_empty(&self) -> bool {
    self.status.is_none() && self.notes.is_none() && self.interest.is_none()
  }

  pub fn status(status: LeadStatus) -> Self { Self { status: Some(status), ..Self::default() } }
}

/// Result of an optimistic update.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
  Updated(Lead),
  NotFound,
  /// The stored version no longer matches the caller's token.
  Conflict { current_version: u64 },
}

fn non_blank(s: Option<&str>) -> Option<&str> { s.map(str::trim).filter(|s| !s.is_empty()) }

#[cfg(test)]
mod tests {
  use super::*;

  fn contact(phone: Option<&str>, email: Option<&str>) -> ContactChannels {
    ContactChannels { phone: phone.map(Into::into), email: email.map(Into::into) }
  }

  #[test]
  fn forward_transitions_are_allowed() {
    use LeadStatus::*;
    assert!(New.check_transition(Contacted, Actor::Agent).is_ok());
    assert!(New.check_transition(Negotiating, Actor::Agent).is_ok());
    assert!(Qualified.check_transition(Lost, Actor::Agent).is_ok());
    assert!(Negotiating.check_transition(Won, Actor::Agent).is_ok());
    assert!(Contacted.check_transition(Contacted, Actor::Agent).is_ok());
  }

  #[test]
  fn backward_and_terminal_transitions_are_rejected() {
    use LeadStatus::*;
    assert!(Qualified.check_transition(Contacted, Actor::Agent).is_err());
    assert!(Won.check_transition(Lost, Actor::Agent).is_err());
    assert!(Lost.check_transition(Won, Actor::Agent).is_err());
    assert!(Won.check_transition(New, Actor::Agent).is_err());
  }

  #[test]
  fn only_agents_reopen_lost_leads() {
    assert!(LeadStatus::Lost.check_transition(LeadStatus::New, Actor::Agent).is_ok());
    assert!(matches!(
      LeadStatus::Lost.check_transition(LeadStatus::New, Actor::Engine),
      Err(Error::InvalidTransition { .. })
    ));
  }

  #[test]
  fn status_parses_from_wire_names() {
    for status in LeadStatus::ALL {
      assert_eq!(status.as_str().parse::<LeadStatus>().unwrap(), status);
    }
    assert!("closed".parse::<LeadStatus>().is_err());
  }

  #[test]
  fn new_lead_requires_some_contact() {
    let agent = AgentId::new("agent-1");
    assert!(NewLead::new(agent.clone(), "Asha", contact(None, None)).validate().is_err());
    assert!(NewLead::new(agent.clone(), "Asha", contact(Some("  "), Some(""))).validate().is_err());
    assert!(NewLead::new(agent.clone(), "Asha", contact(Some("+91 98200 12345"), None)).validate().is_ok());
    assert!(NewLead::new(agent, "Asha", contact(None, Some("asha@example.com"))).validate().is_ok());
  }

  #[test]
  fn new_lead_rejects_malformed_fields() {
    let agent = AgentId::new("agent-1");
    assert!(NewLead::new(agent.clone(), " ", contact(Some("9820012345"), None)).validate().is_err());
    assert!(NewLead::new(agent.clone(), "Ravi", contact(None, Some("ravi"))).validate().is_err());
    assert!(NewLead::new(agent.clone(), "Ravi", contact(Some("12-3"), None)).validate().is_err());

    let inverted = NewLead::new(agent, "Ravi", contact(Some("9820012345"), None)).with_interest(
      PropertyInterest {
        budget: Some(BudgetRange { min: Some(90), max: Some(10) }),
        ..PropertyInterest::default()
      },
    );
    assert!(inverted.validate().is_err());
  }
}
