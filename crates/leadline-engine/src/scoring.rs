//! Scoring engine: AI first, heuristic on any scorer failure, one `Score`
//! shape either way.

use std::{sync::atomic::Ordering as AtomicOrdering, time::Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use leadline_core::{
  heuristic,
  interaction::Interaction,
  lead::{AgentId, Lead},
  recommend::recommend,
  score::{Score, ScoringMethod},
  sequence::FollowUpSequence,
  store::LeadStore,
};

use crate::{Engine, Error, Result, TextUnderstanding};

/// When a rescore may arm a follow-up sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SequencePolicy {
  /// Only if the lead has never had one.
  FirstOnly,
  /// Whenever the lead has no active one (used after a lead is reopened).
  Restart,
}

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Recompute and persist the lead's score from its stored state.
  pub async fn rescore(&self, agent: &AgentId, lead_id: Uuid) -> Result<Score> {
    self.rescore_with(agent, lead_id, SequencePolicy::FirstOnly).await
  }

  pub(crate) async fn rescore_with(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    policy: SequencePolicy,
  ) -> Result<Score> {
    let generation = self.begin_generation(lead_id);
    let result = self.rescore_generation(agent, lead_id, generation, policy).await;
    self.end_generation(lead_id, generation);
    result
  }

  async fn rescore_generation(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    generation: u64,
    policy: SequencePolicy,
  ) -> Result<Score> {
    let started = Instant::now();

    let lead = self.load_lead(agent, lead_id).await?;
    let interactions = self
      .store()
      .list_interactions(agent, lead_id, 0)
      .await
      .map_err(Error::store)?;

    let score = self.compute(&lead, &interactions).await;

    if !self.is_current_generation(lead_id, generation) {
      debug!(%lead_id, generation, "newer rescore in flight; discarding result");
      return Ok(score);
    }

    self.persist(&score).await?;
    self.wrote(agent);

    info!(
      %lead_id,
      agent_id = %agent,
      method = score.method.as_str(),
      tier = score.tier.as_str(),
      value = score.value,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "lead scored"
    );

    self.ensure_sequence(&lead, &score, &interactions, policy).await?;
    Ok(score)
  }

  /// The lead's current score. A stale score (interactions recorded since it
  /// was computed) is recomputed before returning.
  pub async fn current_score(&self, agent: &AgentId, lead_id: Uuid) -> Result<Score> {
    let lead = self.load_lead(agent, lead_id).await?;
    let latest = self.store().latest_score(agent, lead_id).await.map_err(Error::store)?;

    match latest {
      Some(score) if score.is_fresh_for(&lead) => Ok(score),
      _ => self.rescore(agent, lead_id).await,
    }
  }

  /// Newest first.
  pub async fn score_history(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    limit: usize,
  ) -> Result<Vec<Score>> {
    self.load_lead(agent, lead_id).await?;
    self.store().score_history(agent, lead_id, limit).await.map_err(Error::store)
  }

  /// Retry queued score writes. Returns how many were written.
  ///
  /// A lead whose first score only lands here gets its follow-up sequence
  /// now.
  pub async fn flush_pending_scores(&self) -> usize {
    let queued = std::mem::take(&mut *self.inner.pending.lock());
    if queued.is_empty() {
      return 0;
    }

    let mut written = 0;
    for score in queued.into_values() {
      match self.store().append_score(&score).await {
        Ok(()) => {
          written += 1;
          self.wrote(&score.agent_id);
          if let Err(e) = self.sequence_after_flush(&score).await {
            warn!(lead_id = %score.lead_id, error = %e, "could not start sequence for flushed score");
          }
        }
        Err(e) => {
          warn!(lead_id = %score.lead_id, error = %e, "queued score still not persisted");
          self.queue_unpersisted(score);
        }
      }
    }
    written
  }

  /// Number of leads with a score waiting for a persistence retry.
  pub fn pending_scores(&self) -> usize { self.inner.pending.lock().len() }

  // ─── Internals ─────────────────────────────────────────────────────────────

  async fn compute(&self, lead: &Lead, interactions: &[Interaction]) -> Score {
    let config = self.config();
    let now = self.now();

    let (mut assessment, method) = match self.inner.ai.score(lead, interactions).await {
      Ok(assessment) => (assessment, ScoringMethod::Ai),
      Err(e) => {
        warn!(lead_id = %lead.lead_id, error = %e, "falling back to heuristic scorer");
        (heuristic::score(lead, interactions, now, &config.heuristic), ScoringMethod::HeuristicFallback)
      }
    };

    if assessment.recommendations.is_empty() {
      let tier = config.tiers.tier_for(assessment.value);
      assessment.recommendations = recommend(lead, interactions, tier);
    }

    Score::from_assessment(lead, assessment, method, &config.tiers, now)
  }

  /// Write with bounded retries. On final failure the score is queued for the
  /// background scan.
  async fn persist(&self, score: &Score) -> Result<()> {
    let scoring = &self.config().scoring;
    let mut attempt = 0;
    loop {
      match self.store().append_score(score).await {
        Ok(()) => return Ok(()),
        Err(e) if attempt < scoring.persist_retries => {
          attempt += 1;
          let backoff = scoring.backoff(attempt);
          warn!(
            lead_id = %score.lead_id,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %e,
            "score persistence failed; retrying"
          );
          tokio::time::sleep(backoff).await;
        }
        Err(e) => {
          warn!(lead_id = %score.lead_id, error = %e, "score persistence failed; queued for retry");
          self.queue_unpersisted(score.clone());
          return Err(Error::ScoringPersistFailed { lead_id: score.lead_id, source: Box::new(e) });
        }
      }
    }
  }

  async fn ensure_sequence(
    &self,
    lead: &Lead,
    score: &Score,
    interactions: &[Interaction],
    policy: SequencePolicy,
  ) -> Result<()> {
    if lead.status.is_closed() {
      return Ok(());
    }
    let store = self.store();
    let agent = &lead.agent_id;

    if store.active_sequence(agent, lead.lead_id).await.map_err(Error::store)?.is_some() {
      return Ok(());
    }
    if policy == SequencePolicy::FirstOnly
      && !store.sequence_history(agent, lead.lead_id).await.map_err(Error::store)?.is_empty()
    {
      return Ok(());
    }

    // A first sequence replays every interaction so outcomes recorded before
    // the lead was scored still count. A restarted one begins after them.
    let latest_seq = interactions.iter().map(|i| i.seq).max().unwrap_or(0);
    let applied_through = match policy {
      SequencePolicy::FirstOnly => 0,
      SequencePolicy::Restart => latest_seq,
    };

    let now = self.now();
    let mut sequence = FollowUpSequence::start(
      agent.clone(),
      lead.lead_id,
      score.tier,
      self.config().cadences.for_tier(score.tier).to_vec(),
      lead.last_interaction_at.unwrap_or(now),
      applied_through,
      now,
    );
    if sequence.is_active() {
      sequence.on_lead_status(lead.status, now)?;
    }

    match store.create_sequence(&sequence).await.map_err(Error::store)? {
      Some(created) => {
        info!(
          lead_id = %lead.lead_id,
          sequence_id = %created.sequence_id,
          tier = created.tier.as_str(),
          "follow-up sequence started"
        );
        self.wrote(agent);
        if created.is_active()
          && created.last_applied_seq < latest_seq
          && let Err(e) = self.advance_sequence(agent, lead.lead_id).await
        {
          warn!(lead_id = %lead.lead_id, error = %e, "could not apply earlier interactions");
        }
      }
      None => debug!(lead_id = %lead.lead_id, "sequence already started concurrently"),
    }
    Ok(())
  }

  async fn sequence_after_flush(&self, score: &Score) -> Result<()> {
    let Some(lead) = self
      .store()
      .get_lead(&score.agent_id, score.lead_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(());
    };
    let interactions = self
      .store()
      .list_interactions(&lead.agent_id, lead.lead_id, 0)
      .await
      .map_err(Error::store)?;
    self.ensure_sequence(&lead, score, &interactions, SequencePolicy::FirstOnly).await
  }

  /// Keep only the newest unpersisted score per lead.
  fn queue_unpersisted(&self, score: Score) {
    let mut pending = self.inner.pending.lock();
    match pending.get(&score.lead_id) {
      Some(queued) if queued.computed_at > score.computed_at => {}
      _ => {
        pending.insert(score.lead_id, score);
      }
    }
  }

  fn begin_generation(&self, lead_id: Uuid) -> u64 {
    let generation = self.inner.next_gen.fetch_add(1, AtomicOrdering::Relaxed) + 1;
    self.inner.generations.insert(lead_id, generation);
    generation
  }

  fn is_current_generation(&self, lead_id: Uuid, generation: u64) -> bool {
    self.inner.generations.get(&lead_id).is_some_and(|g| *g == generation)
  }

  /// Forget the lead unless a newer rescore has started since.
  fn end_generation(&self, lead_id: Uuid, generation: u64) {
    self.inner.generations.remove_if(&lead_id, |_, g| *g == generation);
  }

  /// Leads with a rescore in flight.
  #[cfg(test)]
  pub(crate) fn rescores_in_flight(&self) -> usize { self.inner.generations.len() }
}
