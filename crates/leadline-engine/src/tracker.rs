//! Interaction tracker: durable append, then hand-off.

use tracing::info;
use uuid::Uuid;

use leadline_core::{
  interaction::{Interaction, NewInteraction},
  lead::AgentId,
  store::LeadStore,
};

use crate::{Engine, Error, Result, TextUnderstanding, Trigger};

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Append an interaction to the lead's timeline and queue a rescore and a
  /// sequence advance. Returns once the append has committed.
  pub async fn record_interaction(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    input: NewInteraction,
  ) -> Result<Interaction> {
    let now = self.now();
    input.validate(now)?;

    let interaction = self
      .store()
      .append_interaction(agent, lead_id, input, now)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::lead_not_found(lead_id))?;
    self.wrote(agent);

    info!(
      %lead_id,
      agent_id = %agent,
      seq = interaction.seq,
      channel = interaction.channel.as_str(),
      outcome = interaction.outcome.map(|o| o.as_str()),
      "interaction recorded"
    );

    self.enqueue(Trigger::Rescore { agent: agent.clone(), lead_id });
    self.enqueue(Trigger::Advance { agent: agent.clone(), lead_id });
    Ok(interaction)
  }

  /// The full timeline, ordered by `occurred_at` then insertion.
  pub async fn interactions(&self, agent: &AgentId, lead_id: Uuid) -> Result<Vec<Interaction>> {
    self.load_lead(agent, lead_id).await?;
    self.store().list_interactions(agent, lead_id, 0).await.map_err(Error::store)
  }
}
