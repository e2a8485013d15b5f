//! Follow-up sequencer: loads a lead's active sequence, folds in unprocessed
//! interactions, moves it forward in time and saves it optimistically.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadline_core::{
  interaction::Channel,
  lead::{AgentId, Lead, LeadStatus},
  sequence::{Advance, FollowUpSequence},
  store::LeadStore,
};

use crate::{Engine, Error, Result, TextUnderstanding};

/// Attempts before a contended sequence save gives up.
const SAVE_ATTEMPTS: usize = 3;

/// A step waiting for the agent or the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueFollowUp {
  pub sequence_id: Uuid,
  pub lead_id:     Uuid,
  pub step:        usize,
  pub channel:     Channel,
  pub template:    String,
  pub due_at:      Option<DateTime<Utc>>,
}

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Bring the lead's active sequence up to date: apply interactions recorded
  /// since it last looked, then mark the current step due if its time has
  /// passed. Terminal sequences are rejected.
  pub async fn advance_sequence(&self, agent: &AgentId, lead_id: Uuid) -> Result<FollowUpSequence> {
    self.load_lead(agent, lead_id).await?;
    let escalation = &self.config().cadences.escalated;

    for _ in 0..SAVE_ATTEMPTS {
      let mut sequence = self.require_active(agent, lead_id).await?;
      let before = sequence.clone();

      let mut pending = self
        .store()
        .list_interactions(agent, lead_id, sequence.last_applied_seq)
        .await
        .map_err(Error::store)?;
      pending.sort_by_key(|i| i.seq);

      let now = self.now();
      for interaction in &pending {
        if !sequence.is_active() {
          break;
        }
        sequence.apply_interaction(interaction, escalation, now)?;
      }

      let step = if sequence.is_active() { sequence.advance(now)? } else { Advance::Unchanged };

      if sequence == before {
        return Ok(sequence);
      }

      if let Some(saved) = self.store().save_sequence(&sequence).await.map_err(Error::store)? {
        self.wrote(agent);
        if let Advance::StepDue { step } = step {
          info!(%lead_id, sequence_id = %saved.sequence_id, step, "follow-up step due");
        }
        if !saved.is_active() {
          info!(
            %lead_id,
            sequence_id = %saved.sequence_id,
            state = saved.state.as_str(),
            proposed_status = saved.proposed_status.map(LeadStatus::as_str),
            "follow-up sequence closed"
          );
        }
        return Ok(saved);
      }
      debug!(%lead_id, "sequence changed concurrently; reloading");
    }

    let current = self.require_active(agent, lead_id).await?;
    Err(Error::Conflict { current_version: current.version })
  }

  /// Hand the lead to a human; the sequence stops until resumed.
  pub async fn pause_sequence(&self, agent: &AgentId, lead_id: Uuid) -> Result<FollowUpSequence> {
    self.modify_active(agent, lead_id, |seq, now| seq.pause(now)).await
  }

  /// Resume a paused sequence, re-arming its current step from now.
  pub async fn resume_sequence(&self, agent: &AgentId, lead_id: Uuid) -> Result<FollowUpSequence> {
    self.modify_active(agent, lead_id, |seq, now| seq.resume(now)).await
  }

  /// The active sequence, or the most recent closed one.
  pub async fn sequence(&self, agent: &AgentId, lead_id: Uuid) -> Result<FollowUpSequence> {
    self.load_lead(agent, lead_id).await?;
    if let Some(active) = self.store().active_sequence(agent, lead_id).await.map_err(Error::store)? {
      return Ok(active);
    }
    self
      .store()
      .sequence_history(agent, lead_id)
      .await
      .map_err(Error::store)?
      .into_iter()
      .next()
      .ok_or(Error::NotFound { what: "sequence", lead_id })
  }

  pub async fn sequence_history(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
  ) -> Result<Vec<FollowUpSequence>> {
    self.load_lead(agent, lead_id).await?;
    self.store().sequence_history(agent, lead_id).await.map_err(Error::store)
  }

  /// Steps currently due for the agent.
  pub async fn due_followups(&self, agent: &AgentId) -> Result<Vec<DueFollowUp>> {
    let sequences = self.store().due_followups(agent).await.map_err(Error::store)?;
    Ok(
      sequences
        .iter()
        .filter_map(|seq| {
          let step = seq.due_step()?;
          Some(DueFollowUp {
            sequence_id: seq.sequence_id,
            lead_id:     seq.lead_id,
            step:        seq.current_step,
            channel:     step.channel,
            template:    step.template.clone(),
            due_at:      seq.current_due_at(),
          })
        })
        .collect(),
    )
  }

  /// Advance every sequence whose due time has passed. Returns how many were
  /// advanced; individual failures are logged and skipped.
  pub async fn scan_due(&self) -> usize {
    let due = match self.store().due_sequences(self.now()).await {
      Ok(due) => due,
      Err(e) => {
        warn!(error = %e, "due scan failed");
        return 0;
      }
    };

    let mut advanced = 0;
    for key in due {
      match self.advance_sequence(&key.agent_id, key.lead_id).await {
        Ok(_) => advanced += 1,
        Err(e) => warn!(lead_id = %key.lead_id, agent_id = %key.agent_id, error = %e, "due advance failed"),
      }
    }
    advanced
  }

  /// Keep the active sequence in line with an agent-driven status change.
  pub(crate) async fn sync_sequence_status(&self, lead: &Lead) -> Result<()> {
    if !matches!(lead.status, LeadStatus::Won | LeadStatus::Lost | LeadStatus::Negotiating) {
      return Ok(());
    }
    match self.modify_active(&lead.agent_id, lead.lead_id, |seq, now| seq.on_lead_status(lead.status, now)).await {
      Ok(_) | Err(Error::NotFound { .. } | Error::SequenceState { .. }) => Ok(()),
      Err(e) => Err(e),
    }
  }

  // ─── Internals ─────────────────────────────────────────────────────────────

  /// Apply `change` to the active sequence and save it, retrying on a
  /// concurrent save. `change` reports whether it altered anything.
  async fn modify_active<F>(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    mut change: F,
  ) -> Result<FollowUpSequence>
  where
    F: FnMut(&mut FollowUpSequence, DateTime<Utc>) -> leadline_core::Result<bool> + Send,
  {
    self.load_lead(agent, lead_id).await?;

    for _ in 0..SAVE_ATTEMPTS {
      let mut sequence = self.require_active(agent, lead_id).await?;
      if !change(&mut sequence, self.now())? {
        return Ok(sequence);
      }
      if let Some(saved) = self.store().save_sequence(&sequence).await.map_err(Error::store)? {
        self.wrote(agent);
        info!(%lead_id, sequence_id = %saved.sequence_id, state = saved.state.as_str(), "sequence updated");
        return Ok(saved);
      }
    }

    let current = self.require_active(agent, lead_id).await?;
    Err(Error::Conflict { current_version: current.version })
  }

  /// The active sequence; a lead whose last sequence is closed yields
  /// [`Error::SequenceState`].
  async fn require_active(&self, agent: &AgentId, lead_id: Uuid) -> Result<FollowUpSequence> {
    if let Some(active) = self.store().active_sequence(agent, lead_id).await.map_err(Error::store)? {
      return Ok(active);
    }
    let history = self.store().sequence_history(agent, lead_id).await.map_err(Error::store)?;
    match history.first() {
      Some(last) => Err(Error::SequenceState { sequence_id: last.sequence_id, state: last.state }),
      None => Err(Error::NotFound { what: "sequence", lead_id }),
    }
  }
}
