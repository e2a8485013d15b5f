//! Follow-up sequences: the per-lead outreach plan.
//!
//! There are no timers. A sequence stores an explicit `next_due_at` and is
//! moved forward by [`FollowUpSequence::advance`] whenever someone looks at it
//! (an interaction trigger, an agent request, or the periodic due scan). After
//! downtime, anything whose due time has passed is simply due.
//!
//! Step delays are offsets from `anchor_at`, the last qualifying interaction
//! (or the moment the sequence was armed). Due times never drift from wall
//! clock progress, so an idle lead cannot accumulate a cascade of overdue
//! steps.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  interaction::{Channel, Interaction, Outcome},
  lead::{AgentId, LeadStatus},
  score::Tier,
};

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceState {
  /// Waiting for the current step's due time.
  Pending,
  /// The current step is ready for the agent or the dispatch channel.
  Due,
  /// A human has taken over; resumed only by an explicit agent action.
  Paused,
  Completed,
  Abandoned,
}

impl SequenceState {
  pub const ALL: [SequenceState; 5] =
    [Self::Pending, Self::Due, Self::Paused, Self::Completed, Self::Abandoned];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Due => "due",
      Self::Paused => "paused",
      Self::Completed => "completed",
      Self::Abandoned => "abandoned",
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Abandoned) }
}

impl fmt::Display for SequenceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SequenceState {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|st| st.as_str() == s)
      .ok_or_else(|| Error::UnknownVariant { kind: "sequence state", value: s.to_owned() })
  }
}

// ─── Steps ───────────────────────────────────────────────────────────────────

/// One planned outreach action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpStep {
  /// Offset from the anchor (last interaction), in seconds.
  pub delay_secs: i64,
  pub channel:    Channel,
  /// Reference to a message template owned by the content layer.
  pub template:   String,
}

impl FollowUpStep {
  pub fn new(delay_secs: i64, channel: Channel, template: impl Into<String>) -> Self {
    Self { delay_secs, channel, template: template.into() }
  }

  pub fn delay(&self) -> Duration { Duration::seconds(self.delay_secs.max(0)) }
}

// ─── Sequence ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpSequence {
  pub sequence_id:      Uuid,
  pub lead_id:          Uuid,
  pub agent_id:         AgentId,
  /// Tier whose cadence the sequence was built from.
  pub tier:             Tier,
  pub steps:            Vec<FollowUpStep>,
  pub current_step:     usize,
  pub state:            SequenceState,
  /// Reference point for step delays.
  pub anchor_at:        DateTime<Utc>,
  /// `pending`: due time of the current step. `due`: due time of the step
  /// after it. `None` when nothing further is scheduled.
  pub next_due_at:      Option<DateTime<Utc>>,
  /// Whether the escalation cadence has replaced the remaining steps.
  pub escalated:        bool,
  /// Highest interaction `seq` already folded into this sequence.
  pub last_applied_seq: u64,
  /// Status the engine recommends; never applied without an agent.
  pub proposed_status:  Option<LeadStatus>,
  pub closed_reason:    Option<String>,
  /// Optimistic concurrency token maintained by the store.
  pub version:          u64,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// What a call to [`FollowUpSequence::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advance {
  /// Nothing was due, or the sequence is paused.
  Unchanged,
  /// A step became due.
  StepDue { step: usize },
}

impl FollowUpSequence {
  /// Arm a new sequence. `anchor` is the lead's last interaction, or now if it
  /// has none. Interactions with `seq <= applied_through` are never folded in;
  /// pass 0 to have every existing interaction applied.
  pub fn start(
    agent_id: AgentId,
    lead_id: Uuid,
    tier: Tier,
    steps: Vec<FollowUpStep>,
    anchor: DateTime<Utc>,
    applied_through: u64,
    now: DateTime<Utc>,
  ) -> Self {
    let mut seq = Self {
      sequence_id: Uuid::new_v4(),
      lead_id,
      agent_id,
      tier,
      steps,
      current_step: 0,
      state: SequenceState::Pending,
      anchor_at: anchor,
      next_due_at: None,
      escalated: false,
      last_applied_seq: applied_through,
      proposed_status: None,
      closed_reason: None,
      version: 1,
      created_at: now,
      updated_at: now,
    };
    if seq.steps.is_empty() {
      seq.finish(SequenceState::Completed, "cadence has no steps", now);
    } else {
      seq.arm_current();
    }
    seq
  }

  pub fn is_active(&self) -> bool { !self.state.is_terminal() }

  /// The step currently waiting for action, if the sequence is `due`.
  pub fn due_step(&self) -> Option<&FollowUpStep> {
    (self.state == SequenceState::Due).then(|| self.steps.get(self.current_step)).flatten()
  }

  /// When the current step is (or was) due.
  pub fn current_due_at(&self) -> Option<DateTime<Utc>> {
    self.steps.get(self.current_step).map(|s| self.anchor_at + s.delay())
  }

  fn ensure_open(&self) -> Result<()> {
    if self.state.is_terminal() {
      Err(Error::SequenceClosed { id: self.sequence_id, state: self.state })
    } else {
      Ok(())
    }
  }

  fn arm_current(&mut self) {
    self.next_due_at = if self.state == SequenceState::Paused {
      None
    } else {
      self.current_due_at()
    };
  }

  fn finish(&mut self, state: SequenceState, reason: &str, now: DateTime<Utc>) {
    self.state = state;
    self.next_due_at = None;
    self.closed_reason = Some(reason.to_owned());
    self.updated_at = now;
  }

  /// Fold one interaction into the sequence. Interactions at or below
  /// `last_applied_seq` are ignored, which makes replays harmless.
  ///
  /// - Contact after the current step was armed moves the anchor. If the step
  ///   was `due`, the contact counts as acting on it and the sequence moves to
  ///   the next step, or completes after the last one.
  /// - `interested` / `scheduled` replace the remaining steps with
  ///   `escalation` (once per sequence).
  /// - `not-interested` proposes `lost` and abandons the sequence.
  pub fn apply_interaction(
    &mut self,
    interaction: &Interaction,
    escalation: &[FollowUpStep],
    now: DateTime<Utc>,
  ) -> Result<()> {
    self.ensure_open()?;
    if interaction.seq <= self.last_applied_seq {
      return Ok(());
    }
    self.last_applied_seq = interaction.seq;
    self.updated_at = now;

    if interaction.outcome == Some(Outcome::NotInterested) {
      self.proposed_status = Some(LeadStatus::Lost);
      self.finish(SequenceState::Abandoned, "lead reported not interested", now);
      return Ok(());
    }

    let at = interaction.effective_at();
    if interaction.channel.is_contact() && at >= self.anchor_at {
      if self.state == SequenceState::Due {
        self.current_step += 1;
      }
      self.anchor_at = at;
      if self.state != SequenceState::Paused {
        self.state = SequenceState::Pending;
      }
    }

    if interaction.outcome.is_some_and(Outcome::escalates) && !self.escalated && !escalation.is_empty() {
      self.steps.truncate(self.current_step);
      self.steps.extend_from_slice(escalation);
      self.escalated = true;
    }

    if self.current_step >= self.steps.len() {
      self.finish(SequenceState::Completed, "all follow-up steps exhausted", now);
    } else {
      self.arm_current();
    }
    Ok(())
  }

  /// Move the sequence forward in time. At most one step is ever `due`; if the
  /// following step's time arrives while one is still due, the unattended
  /// step is skipped in favour of the newer one.
  pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Advance> {
    self.ensure_open()?;
    if self.state == SequenceState::Paused {
      return Ok(Advance::Unchanged);
    }

    let mut outcome = Advance::Unchanged;
    while let Some(due_at) = self.next_due_at
      && now >= due_at
    {
      match self.state {
        SequenceState::Pending => self.state = SequenceState::Due,
        _ => self.current_step += 1,
      }
      self.next_due_at = self
        .steps
        .get(self.current_step + 1)
        .map(|s| self.anchor_at + s.delay());
      outcome = Advance::StepDue { step: self.current_step };
    }

    if outcome != Advance::Unchanged {
      self.updated_at = now;
    }
    Ok(outcome)
  }

  /// Hand the lead to a human. Returns `false` if it was already paused.
  pub fn pause(&mut self, now: DateTime<Utc>) -> Result<bool> {
    self.ensure_open()?;
    if self.state == SequenceState::Paused {
      return Ok(false);
    }
    self.state = SequenceState::Paused;
    self.next_due_at = None;
    self.updated_at = now;
    Ok(true)
  }

  /// Resume a paused sequence, re-arming the current step from `now`.
  /// Returns `false` if it was not paused.
  pub fn resume(&mut self, now: DateTime<Utc>) -> Result<bool> {
    self.ensure_open()?;
    if self.state != SequenceState::Paused {
      return Ok(false);
    }
    self.state = SequenceState::Pending;
    self.anchor_at = self.anchor_at.max(now);
    self.updated_at = now;
    self.arm_current();
    Ok(true)
  }

  /// React to an agent-driven lead status change. Returns `true` if the
  /// sequence changed.
  pub fn on_lead_status(&mut self, status: LeadStatus, now: DateTime<Utc>) -> Result<bool> {
    self.ensure_open()?;
    match status {
      LeadStatus::Won => {
        self.finish(SequenceState::Completed, "lead won", now);
        Ok(true)
      }
      LeadStatus::Lost => {
        self.finish(SequenceState::Abandoned, "lead closed as lost", now);
        Ok(true)
      }
      LeadStatus::Negotiating => self.pause(now),
      _ => Ok(false),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{config::CadenceConfig, interaction::Direction};

  const HOUR: i64 = 3600;
  const DAY: i64 = 24 * HOUR;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() }

  fn sequence(tier: Tier) -> FollowUpSequence {
    let steps = CadenceConfig::default().for_tier(tier).to_vec();
    FollowUpSequence::start(AgentId::new("a"), Uuid::nil(), tier, steps, t0(), 0, t0())
  }

  fn interaction(seq: u64, at: DateTime<Utc>, outcome: Option<Outcome>) -> Interaction {
    Interaction {
      interaction_id: Uuid::new_v4(),
      lead_id: Uuid::nil(),
      agent_id: AgentId::new("a"),
      seq,
      channel: Channel::Call,
      direction: Direction::Outbound,
      occurred_at: at,
      summary: None,
      outcome,
      recorded_at: at,
    }
  }

  fn escalation() -> Vec<FollowUpStep> { CadenceConfig::default().escalated }

  #[test]
  fn cold_sequence_is_still_pending_after_two_days() {
    let mut s = sequence(Tier::Cold);
    assert_eq!(s.next_due_at, Some(t0() + Duration::days(3)));

    assert_eq!(s.advance(t0() + Duration::days(2)).unwrap(), Advance::Unchanged);
    assert_eq!(s.state, SequenceState::Pending);
  }

  #[test]
  fn step_becomes_due_and_next_due_is_anchored() {
    let mut s = sequence(Tier::Cold);
    let out = s.advance(t0() + Duration::days(4)).unwrap();

    assert_eq!(out, Advance::StepDue { step: 0 });
    assert_eq!(s.state, SequenceState::Due);
    // Second step is +14d from the anchor, not from when the first was noticed.
    assert_eq!(s.next_due_at, Some(t0() + Duration::days(14)));
  }

  #[test]
  fn idle_lead_never_has_two_due_steps() {
    let mut s = sequence(Tier::Hot);
    s.advance(t0() + Duration::days(30)).unwrap();

    assert_eq!(s.state, SequenceState::Due);
    assert_eq!(s.current_step, 2);
    assert_eq!(s.next_due_at, None);
    assert!(s.due_step().is_some());
  }

  #[test]
  fn contact_before_due_rearms_current_step() {
    let mut s = sequence(Tier::Warm);
    let contact_at = t0() + Duration::hours(20);
    s.apply_interaction(&interaction(1, contact_at, None), &escalation(), contact_at).unwrap();

    assert_eq!(s.current_step, 0);
    assert_eq!(s.anchor_at, contact_at);
    assert_eq!(s.next_due_at, Some(contact_at + Duration::seconds(DAY)));
    assert_eq!(s.advance(t0() + Duration::days(1)).unwrap(), Advance::Unchanged);
  }

  #[test]
  fn acting_on_due_step_moves_to_next() {
    let mut s = sequence(Tier::Warm);
    s.advance(t0() + Duration::days(2)).unwrap();
    assert_eq!(s.state, SequenceState::Due);

    let at = t0() + Duration::days(2);
    s.apply_interaction(&interaction(1, at, Some(Outcome::NoAnswer)), &escalation(), at).unwrap();
    assert_eq!(s.state, SequenceState::Pending);
    assert_eq!(s.current_step, 1);
    assert_eq!(s.next_due_at, Some(at + Duration::days(3)));
  }

  #[test]
  fn exhausting_steps_completes_without_status_change() {
    let mut s = sequence(Tier::Cold);

    let first = t0() + Duration::days(4);
    assert_eq!(s.advance(first).unwrap(), Advance::StepDue { step: 0 });
    s.apply_interaction(&interaction(1, first, None), &escalation(), first).unwrap();
    assert_eq!(s.next_due_at, Some(first + Duration::days(14)));

    let now = first + Duration::days(15);
    assert_eq!(s.advance(now).unwrap(), Advance::StepDue { step: 1 });
    s.apply_interaction(&interaction(2, now, None), &escalation(), now).unwrap();

    assert_eq!(s.state, SequenceState::Completed);
    assert_eq!(s.proposed_status, None);
    assert!(s.advance(now).is_err());
  }

  #[test]
  fn positive_outcome_escalates_once() {
    let mut s = sequence(Tier::Cold);
    let at = t0() + Duration::hours(1);
    s.apply_interaction(&interaction(1, at, Some(Outcome::Interested)), &escalation(), at).unwrap();

    assert!(s.escalated);
    assert_eq!(s.steps, escalation());
    assert_eq!(s.next_due_at, Some(at + Duration::seconds(2 * HOUR)));

    let later = at + Duration::hours(1);
    s.apply_interaction(&interaction(2, later, Some(Outcome::Scheduled)), &escalation(), later)
      .unwrap();
    assert_eq!(s.steps.len(), escalation().len());
  }

  #[test]
  fn not_interested_abandons_and_blocks_advance() {
    let mut s = sequence(Tier::Warm);
    let at = t0() + Duration::hours(3);
    s.apply_interaction(&interaction(1, at, Some(Outcome::NotInterested)), &escalation(), at)
      .unwrap();

    assert_eq!(s.state, SequenceState::Abandoned);
    assert_eq!(s.proposed_status, Some(LeadStatus::Lost));
    let err = s.advance(at + Duration::days(30)).unwrap_err();
    assert!(matches!(err, Error::SequenceClosed { state: SequenceState::Abandoned, .. }));
    assert_eq!(s.due_step(), None);
  }

  #[test]
  fn replayed_interactions_are_ignored() {
    let mut s = sequence(Tier::Warm);
    let at = t0() + Duration::hours(2);
    let i = interaction(1, at, Some(Outcome::Interested));
    s.apply_interaction(&i, &escalation(), at).unwrap();
    let snapshot = s.clone();
    s.apply_interaction(&i, &escalation(), at + Duration::hours(1)).unwrap();
    assert_eq!(s, snapshot);
  }

  #[test]
  fn negotiating_pauses_until_resumed() {
    let mut s = sequence(Tier::Hot);
    assert!(s.on_lead_status(LeadStatus::Negotiating, t0()).unwrap());
    assert_eq!(s.state, SequenceState::Paused);
    assert_eq!(s.advance(t0() + Duration::days(10)).unwrap(), Advance::Unchanged);

    let resume_at = t0() + Duration::days(10);
    assert!(s.resume(resume_at).unwrap());
    assert_eq!(s.state, SequenceState::Pending);
    assert_eq!(s.next_due_at, Some(resume_at + Duration::seconds(HOUR)));
  }

  #[test]
  fn won_and_lost_close_the_sequence() {
    let mut won = sequence(Tier::Hot);
    won.on_lead_status(LeadStatus::Won, t0()).unwrap();
    assert_eq!(won.state, SequenceState::Completed);

    let mut lost = sequence(Tier::Hot);
    lost.on_lead_status(LeadStatus::Lost, t0()).unwrap();
    assert_eq!(lost.state, SequenceState::Abandoned);
    assert!(lost.pause(t0()).is_err());
  }

  #[test]
  fn system_notes_do_not_count_as_contact() {
    let mut s = sequence(Tier::Cold);
    let at = t0() + Duration::days(1);
    let mut note = interaction(1, at, None);
    note.channel = Channel::SystemNote;
    s.apply_interaction(&note, &escalation(), at).unwrap();

    assert_eq!(s.anchor_at, t0());
    assert_eq!(s.last_applied_seq, 1);
  }
}
