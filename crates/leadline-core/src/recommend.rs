//! Rule-based next-action suggestions attached to heuristic scores.

use crate::{
  heuristic::{InterestCoverage, latest},
  interaction::{Interaction, Outcome},
  lead::{Lead, LeadStatus},
  score::Tier,
};

/// Suggest next actions for `lead`, most pressing first.
pub fn recommend(lead: &Lead, interactions: &[Interaction], tier: Tier) -> Vec<String> {
  let mut out = Vec::new();

  if lead.status.is_closed() {
    return out;
  }

  let last_outcome = latest(interactions.iter().filter(|i| i.outcome.is_some())).and_then(|i| i.outcome);
  if last_outcome == Some(Outcome::NotInterested) {
    out.push("Confirm with the prospect before closing this lead as lost".to_owned());
    return out;
  }

  let contacted = interactions.iter().any(|i| i.channel.is_contact());
  match (tier, contacted) {
    (Tier::Hot, false) => out.push("Call today: high-intent lead not yet contacted".to_owned()),
    (_, false) => out.push("Make first contact".to_owned()),
    (Tier::Hot, true) if lead.status != LeadStatus::Negotiating => {
      out.push("Propose a site visit".to_owned());
    }
    _ => {}
  }

  if matches!(last_outcome, Some(Outcome::Interested | Outcome::Scheduled)) {
    out.push("Share matching listings before the next conversation".to_owned());
  }

  let coverage = InterestCoverage::of(lead);
  if !coverage.budget {
    out.push("Confirm the budget range".to_owned());
  }
  if !coverage.property_type {
    out.push("Ask which property type they want".to_owned());
  }
  if !coverage.location {
    out.push("Ask for preferred locations".to_owned());
  }

  if tier == Tier::Cold {
    out.push("Keep on a low-frequency nurture cadence".to_owned());
  }

  out
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::{
    interaction::{Channel, Direction},
    lead::{AgentId, ContactChannels, LeadSource, PropertyInterest},
  };

  fn lead(notes: &str, status: LeadStatus) -> Lead {
    let at = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
    Lead {
      lead_id: Uuid::nil(),
      agent_id: AgentId::new("agent"),
      name: "Kiran".into(),
      contact: ContactChannels { phone: None, email: Some("k@example.com".into()) },
      notes: notes.into(),
      interest: PropertyInterest::default(),
      source: LeadSource::Manual,
      status,
      version: 1,
      created_at: at,
      updated_at: at,
      last_interaction_at: None,
      interaction_count: 0,
    }
  }

  fn call(outcome: Outcome) -> Interaction {
    let at = Utc.with_ymd_and_hms(2026, 5, 4, 13, 0, 0).unwrap();
    Interaction {
      interaction_id: Uuid::new_v4(),
      lead_id: Uuid::nil(),
      agent_id: AgentId::new("agent"),
      seq: 1,
      channel: Channel::Call,
      direction: Direction::Outbound,
      occurred_at: at,
      summary: None,
      outcome: Some(outcome),
      recorded_at: at,
    }
  }

  #[test]
  fn uncontacted_hot_lead_gets_a_call_first() {
    let recs = recommend(&lead("3bhk, budget 1.5 cr", LeadStatus::New), &[], Tier::Hot);
    assert!(recs[0].starts_with("Call today"));
    assert!(recs.iter().any(|r| r.contains("locations")));
    assert!(!recs.iter().any(|r| r.contains("budget")));
  }

  #[test]
  fn not_interested_short_circuits() {
    let recs = recommend(&lead("", LeadStatus::Contacted), &[call(Outcome::NotInterested)], Tier::Warm);
    assert_eq!(recs.len(), 1);
  }

  #[test]
  fn closed_leads_get_nothing() {
    assert!(recommend(&lead("", LeadStatus::Won), &[], Tier::Hot).is_empty());
  }

  #[test]
  fn cold_leads_are_nurtured() {
    let recs = recommend(&lead("", LeadStatus::Contacted), &[call(Outcome::NoAnswer)], Tier::Cold);
    assert_eq!(recs.last().map(String::as_str), Some("Keep on a low-frequency nurture cadence"));
  }
}
