//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use leadline_core::{
  config::{CadenceConfig, TierThresholds},
  interaction::{Channel, Direction, NewInteraction, Outcome},
  lead::{AgentId, ContactChannels, LeadPatch, LeadStatus, NewLead, PatchOutcome},
  score::{Assessment, Factor, Score, ScoringMethod, Tier},
  sequence::{FollowUpSequence, SequenceState},
  store::{LeadOrder, LeadQuery, LeadStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap() }

fn agent() -> AgentId { AgentId::new("agent-1") }

fn new_lead(agent: &AgentId, name: &str) -> NewLead {
  NewLead::new(
    agent.clone(),
    name,
    ContactChannels { phone: Some("+91 98200 12345".into()), email: None },
  )
}

fn call(at: DateTime<Utc>) -> NewInteraction {
  NewInteraction::new(Channel::Call, Direction::Inbound, at)
}

fn score_for(lead: &leadline_core::lead::Lead, value: f64, at: DateTime<Utc>) -> Score {
  Score::from_assessment(
    lead,
    Assessment {
      value,
      confidence: 0.6,
      factors: vec![Factor::positive("explicit_budget", 30.0)],
      recommendations: vec!["Make first contact".into()],
    },
    ScoringMethod::HeuristicFallback,
    &TierThresholds::default(),
    at,
  )
}

fn sequence_for(lead: &leadline_core::lead::Lead, tier: Tier, at: DateTime<Utc>) -> FollowUpSequence {
  FollowUpSequence::start(
    lead.agent_id.clone(),
    lead.lead_id,
    tier,
    CadenceConfig::default().for_tier(tier).to_vec(),
    at,
    lead.interaction_count,
    at,
  )
}

// ─── Leads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_lead() {
  let s = store().await;
  let lead = s
    .create_lead(new_lead(&agent(), "  Asha  ").with_notes("2bhk near metro"), t0())
    .await
    .unwrap();

  assert_eq!(lead.status, LeadStatus::New);
  assert_eq!(lead.version, 1);
  assert_eq!(lead.name, "Asha");

  let fetched = s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap();
  assert_eq!(fetched, lead);
}

#[tokio::test]
async fn invalid_lead_never_reaches_storage() {
  let s = store().await;
  let err = s
    .create_lead(NewLead::new(agent(), "Asha", ContactChannels::default()), t0())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(leadline_core::Error::InvalidLead(_))));

  let page = s.list_leads(&agent(), &LeadQuery::default()).await.unwrap();
  assert!(page.leads.is_empty());
}

#[tokio::test]
async fn leads_are_scoped_to_their_agent() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let other = AgentId::new("agent-2");

  assert!(s.get_lead(&other, lead.lead_id).await.unwrap().is_none());
  assert_eq!(
    s.update_lead(&other, lead.lead_id, 1, LeadPatch::status(LeadStatus::Contacted), t0())
      .await
      .unwrap(),
    PatchOutcome::NotFound
  );
  assert!(s.append_interaction(&other, lead.lead_id, call(t0()), t0()).await.unwrap().is_none());
  assert!(s.list_leads(&other, &LeadQuery::default()).await.unwrap().leads.is_empty());
}

#[tokio::test]
async fn patch_round_trips_and_bumps_version() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let later = t0() + Duration::hours(1);

  let patch = LeadPatch {
    status: Some(LeadStatus::Contacted),
    notes:  Some("wants a villa".into()),
    ..LeadPatch::default()
  };
  let PatchOutcome::Updated(updated) =
    s.update_lead(&agent(), lead.lead_id, 1, patch, later).await.unwrap()
  else {
    panic!("expected update");
  };

  assert_eq!(updated.version, 2);
  assert_eq!(updated.status, LeadStatus::Contacted);
  assert_eq!(updated.notes, "wants a villa");
  assert_eq!(updated.interest, lead.interest);
  assert_eq!(updated.updated_at, later);
  assert_eq!(s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap(), updated);
}

#[tokio::test]
async fn stale_version_conflicts_and_leaves_record_unchanged() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  s.update_lead(&agent(), lead.lead_id, 1, LeadPatch::status(LeadStatus::Contacted), t0())
    .await
    .unwrap();
  let before = s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap();

  let outcome = s
    .update_lead(&agent(), lead.lead_id, 1, LeadPatch::status(LeadStatus::Qualified), t0())
    .await
    .unwrap();

  assert_eq!(outcome, PatchOutcome::Conflict { current_version: 2 });
  assert_eq!(s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap(), before);
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_by_status_and_date() {
  let s = store().await;
  let mut ids = Vec::new();
  for i in 0..4 {
    let lead = s
      .create_lead(new_lead(&agent(), &format!("Lead {i}")), t0() + Duration::days(i))
      .await
      .unwrap();
    ids.push(lead.lead_id);
  }
  s.update_lead(&agent(), ids[1], 1, LeadPatch::status(LeadStatus::Qualified), t0())
    .await
    .unwrap();

  let qualified = LeadQuery { statuses: vec![LeadStatus::Qualified], ..LeadQuery::default() };
  let page = s.list_leads(&agent(), &qualified).await.unwrap();
  assert_eq!(page.leads.len(), 1);
  assert_eq!(page.leads[0].lead_id, ids[1]);

  let window = LeadQuery {
    created_after: Some(t0() + Duration::days(1)),
    created_before: Some(t0() + Duration::days(3)),
    ..LeadQuery::default()
  };
  let page = s.list_leads(&agent(), &window).await.unwrap();
  let got: Vec<_> = page.leads.iter().map(|l| l.lead_id).collect();
  assert_eq!(got, [ids[1], ids[2]]);
}

#[tokio::test]
async fn cursor_restarts_listing_without_gaps() {
  let s = store().await;
  // Same creation instant for all: the id tiebreak has to carry the order.
  for i in 0..5 {
    s.create_lead(new_lead(&agent(), &format!("Lead {i}")), t0()).await.unwrap();
  }

  let mut query = LeadQuery { limit: 2, order: LeadOrder::Created, ..LeadQuery::default() };
  let mut seen = Vec::new();
  loop {
    let page = s.list_leads(&agent(), &query).await.unwrap();
    seen.extend(page.leads.iter().map(|l| l.lead_id));
    match page.next {
      // Round-trip the cursor through its text form, as an HTTP client would.
      Some(cursor) => query.after = Some(cursor.encode().parse().unwrap()),
      None => break,
    }
  }

  assert_eq!(seen.len(), 5);
  let mut sorted = seen.clone();
  sorted.sort();
  assert_eq!(seen, sorted);
}

// ─── Interactions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_updates_lead_counters() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();

  let late = t0() + Duration::hours(2);
  let early = t0() + Duration::hours(1);
  let a = s.append_interaction(&agent(), lead.lead_id, call(late), late).await.unwrap().unwrap();
  let b = s.append_interaction(&agent(), lead.lead_id, call(early), late).await.unwrap().unwrap();
  assert_eq!((a.seq, b.seq), (1, 2));

  let lead = s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap();
  assert_eq!(lead.interaction_count, 2);
  assert_eq!(lead.last_interaction_at, Some(late));
  assert_eq!(lead.version, 1);

  let timeline = s.list_interactions(&agent(), lead.lead_id, 0).await.unwrap();
  let seqs: Vec<_> = timeline.iter().map(|i| i.seq).collect();
  assert_eq!(seqs, [2, 1]);

  let after_first = s.list_interactions(&agent(), lead.lead_id, 1).await.unwrap();
  assert_eq!(after_first.len(), 1);
  assert_eq!(after_first[0].seq, 2);
}

#[tokio::test]
async fn future_interaction_is_rejected() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let err = s
    .append_interaction(&agent(), lead.lead_id, call(t0() + Duration::hours(1)), t0())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(leadline_core::Error::InvalidInteraction(_))));
  assert_eq!(s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap().interaction_count, 0);
}

#[tokio::test]
async fn concurrent_appends_are_all_persisted_in_order() {
  let s = Arc::new(store().await);
  let lead_id = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap().lead_id;

  let handles: Vec<_> = (0..8)
    .map(|i| {
      let s = Arc::clone(&s);
      let at = t0() + Duration::minutes(i);
      tokio::spawn(async move {
        s.append_interaction(&agent(), lead_id, call(at), t0() + Duration::hours(1))
          .await
          .unwrap()
          .unwrap()
      })
    })
    .collect();
  for h in handles {
    h.await.unwrap();
  }

  let timeline = s.list_interactions(&agent(), lead_id, 0).await.unwrap();
  assert_eq!(timeline.len(), 8);
  assert!(timeline.windows(2).all(|w| w[0].occurred_at < w[1].occurred_at));

  let mut seqs: Vec<_> = timeline.iter().map(|i| i.seq).collect();
  seqs.sort();
  assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
}

// ─── Scores ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_score_is_max_computed_at() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();

  let newer = score_for(&lead, 82.0, t0() + Duration::minutes(10));
  let older = score_for(&lead, 35.0, t0() + Duration::minutes(5));
  s.append_score(&newer).await.unwrap();
  // A late write of an older computation must not shadow the newer one.
  s.append_score(&older).await.unwrap();

  let latest = s.latest_score(&agent(), lead.lead_id).await.unwrap().unwrap();
  assert_eq!(latest, newer);
  assert_eq!(latest.tier, Tier::Hot);

  let history = s.score_history(&agent(), lead.lead_id, 10).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[1], older);

  let lead_after = s.get_lead(&agent(), lead.lead_id).await.unwrap().unwrap();
  assert_eq!(lead_after.updated_at, newer.computed_at);
  assert_eq!(lead_after.version, 1);
}

#[tokio::test]
async fn score_for_missing_lead_is_an_error() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let mut score = score_for(&lead, 50.0, t0());
  score.lead_id = Uuid::new_v4();
  assert!(matches!(s.append_score(&score).await, Err(Error::LeadNotFound(_))));
}

// ─── Sequences ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_one_active_sequence_per_lead() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();

  let first = sequence_for(&lead, Tier::Warm, t0());
  assert!(s.create_sequence(&first).await.unwrap().is_some());
  assert!(s.create_sequence(&sequence_for(&lead, Tier::Hot, t0())).await.unwrap().is_none());

  let active = s.active_sequence(&agent(), lead.lead_id).await.unwrap().unwrap();
  assert_eq!(active, first);

  // Once the first is closed a new one may start.
  let mut closed = active.clone();
  closed.on_lead_status(LeadStatus::Lost, t0()).unwrap();
  s.save_sequence(&closed).await.unwrap().unwrap();
  assert!(s.create_sequence(&sequence_for(&lead, Tier::Cold, t0())).await.unwrap().is_some());

  let history = s.sequence_history(&agent(), lead.lead_id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history.iter().filter(|q| q.is_active()).count(), 1);
}

#[tokio::test]
async fn save_sequence_is_optimistic() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let seq = s.create_sequence(&sequence_for(&lead, Tier::Warm, t0())).await.unwrap().unwrap();

  let mut a = seq.clone();
  a.pause(t0()).unwrap();
  let saved = s.save_sequence(&a).await.unwrap().unwrap();
  assert_eq!(saved.version, 2);

  let mut stale = seq.clone();
  stale.advance(t0() + Duration::days(2)).unwrap();
  assert!(s.save_sequence(&stale).await.unwrap().is_none());

  let stored = s.active_sequence(&agent(), lead.lead_id).await.unwrap().unwrap();
  assert_eq!(stored.state, SequenceState::Paused);
}

#[tokio::test]
async fn terminal_sequences_are_never_overwritten() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let mut seq = s.create_sequence(&sequence_for(&lead, Tier::Warm, t0())).await.unwrap().unwrap();
  seq.on_lead_status(LeadStatus::Won, t0()).unwrap();
  let mut closed = s.save_sequence(&seq).await.unwrap().unwrap();

  closed.state = SequenceState::Pending;
  assert!(s.save_sequence(&closed).await.unwrap().is_none());
}

#[tokio::test]
async fn due_scan_finds_past_due_sequences_across_agents() {
  let s = store().await;
  let other = AgentId::new("agent-2");
  let a = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let b = s.create_lead(new_lead(&other, "Bala"), t0()).await.unwrap();
  s.create_sequence(&sequence_for(&a, Tier::Hot, t0())).await.unwrap();
  s.create_sequence(&sequence_for(&b, Tier::Cold, t0())).await.unwrap();

  let due = s.due_sequences(t0() + Duration::hours(2)).await.unwrap();
  assert_eq!(due.len(), 1);
  assert_eq!(due[0].lead_id, a.lead_id);

  let due = s.due_sequences(t0() + Duration::days(4)).await.unwrap();
  assert_eq!(due.len(), 2);

  let mut seq = s.active_sequence(&agent(), a.lead_id).await.unwrap().unwrap();
  seq.advance(t0() + Duration::hours(2)).unwrap();
  s.save_sequence(&seq).await.unwrap().unwrap();
  let listed = s.due_followups(&agent()).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert!(s.due_followups(&other).await.unwrap().is_empty());
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn queue_entries_skip_closed_leads_and_join_latest_state() {
  let s = store().await;
  let open = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let won = s.create_lead(new_lead(&agent(), "Bala"), t0()).await.unwrap();
  let bare = s.create_lead(new_lead(&agent(), "Chitra"), t0()).await.unwrap();
  s.update_lead(&agent(), won.lead_id, 1, LeadPatch::status(LeadStatus::Won), t0())
    .await
    .unwrap();

  s.append_score(&score_for(&open, 30.0, t0())).await.unwrap();
  s.append_score(&score_for(&open, 90.0, t0() + Duration::minutes(1))).await.unwrap();
  s.create_sequence(&sequence_for(&open, Tier::Hot, t0())).await.unwrap();

  let entries = s.queue_entries(&agent()).await.unwrap();
  assert_eq!(entries.len(), 2);

  let open_entry = entries.iter().find(|e| e.lead.lead_id == open.lead_id).unwrap();
  assert_eq!(open_entry.score.as_ref().map(|s| s.value), Some(90.0));
  assert!(open_entry.sequence.is_some());

  let bare_entry = entries.iter().find(|e| e.lead.lead_id == bare.lead_id).unwrap();
  assert!(bare_entry.score.is_none());
  assert!(bare_entry.sequence.is_none());
}

#[tokio::test]
async fn reopening_a_file_keeps_data() {
  let dir = std::env::temp_dir().join(format!("leadline-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("leads.db");

  let id = {
    let s = SqliteStore::open(&path).await.unwrap();
    s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap().lead_id
  };
  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_lead(&agent(), id).await.unwrap().is_some());

  drop(s);
  let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn outcome_is_stored() {
  let s = store().await;
  let lead = s.create_lead(new_lead(&agent(), "Asha"), t0()).await.unwrap();
  let input = call(t0()).with_outcome(Outcome::Scheduled).with_summary("site visit sat");
  s.append_interaction(&agent(), lead.lead_id, input, t0()).await.unwrap();

  let stored = s.list_interactions(&agent(), lead.lead_id, 0).await.unwrap();
  assert_eq!(stored[0].outcome, Some(Outcome::Scheduled));
  assert_eq!(stored[0].summary.as_deref(), Some("site visit sat"));
}
