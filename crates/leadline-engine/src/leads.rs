//! Lead lifecycle: creation, optimistic patches and listing.

use futures::{Stream, TryStreamExt, stream};
use tracing::info;
use uuid::Uuid;

use leadline_core::{
  lead::{Actor, AgentId, BudgetRange, Lead, LeadPatch, LeadStatus, NewLead, PatchOutcome},
  store::{LeadPage, LeadQuery, LeadStore},
};

use crate::{Engine, Error, Result, TextUnderstanding, Trigger};

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Validate and persist a new lead, then queue its first score.
  pub async fn create_lead(&self, input: NewLead) -> Result<Lead> {
    input.validate()?;
    let lead = self.store().create_lead(input, self.now()).await.map_err(Error::store)?;
    self.wrote(&lead.agent_id);

    info!(lead_id = %lead.lead_id, agent_id = %lead.agent_id, "lead created");
    self.enqueue(Trigger::Rescore { agent: lead.agent_id.clone(), lead_id: lead.lead_id });
    Ok(lead)
  }

  pub async fn get_lead(&self, agent: &AgentId, lead_id: Uuid) -> Result<Lead> {
    self.load_lead(agent, lead_id).await
  }

  /// Apply `patch` if the lead is still at `expected_version`.
  ///
  /// A status change must be a legal agent transition. Closing the lead
  /// closes its active sequence, `negotiating` pauses it, and reopening a
  /// lost lead arms a fresh one.
  pub async fn patch_lead(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    expected_version: u64,
    patch: LeadPatch,
  ) -> Result<Lead> {
    if patch.is_empty() {
      return Err(Error::Validation("patch changes nothing".into()));
    }
    if let Some(interest) = &patch.interest
      && let Some(BudgetRange { min: Some(min), max: Some(max) }) = &interest.budget
      && min > max
    {
      return Err(Error::Validation("budget minimum exceeds maximum".into()));
    }

    let current = self.load_lead(agent, lead_id).await?;
    if current.version != expected_version {
      return Err(Error::Conflict { current_version: current.version });
    }
    if let Some(next) = patch.status {
      current.status.check_transition(next, Actor::Agent)?;
    }

    let outcome = self
      .store()
      .update_lead(agent, lead_id, expected_version, patch, self.now())
      .await
      .map_err(Error::store)?;
    let updated = match outcome {
      PatchOutcome::Updated(lead) => lead,
      PatchOutcome::NotFound => return Err(Error::lead_not_found(lead_id)),
      PatchOutcome::Conflict { current_version } => return Err(Error::Conflict { current_version }),
    };
    self.wrote(agent);

    info!(
      %lead_id,
      agent_id = %agent,
      version = updated.version,
      status = updated.status.as_str(),
      "lead updated"
    );

    if updated.status != current.status {
      self.sync_sequence_status(&updated).await?;
      if current.status == LeadStatus::Lost && updated.status == LeadStatus::New {
        self.enqueue(Trigger::RestartSequence { agent: agent.clone(), lead_id });
      }
    }
    if !updated.status.is_closed() {
      self.enqueue(Trigger::Rescore { agent: agent.clone(), lead_id });
    }
    Ok(updated)
  }

  /// One page of the agent's leads.
  pub async fn list_leads(&self, agent: &AgentId, query: &LeadQuery) -> Result<LeadPage> {
    if let (Some(after), Some(before)) = (query.created_after, query.created_before)
      && after >= before
    {
      return Err(Error::Validation("created_after must precede created_before".into()));
    }
    self.store().list_leads(agent, query).await.map_err(Error::store)
  }

  /// Every lead matching `query`, fetched page by page as the stream is
  /// polled. Starts from `query.after`, so a consumer can resume from any
  /// cursor it has seen.
  pub fn lead_stream<'a>(
    &'a self,
    agent: &'a AgentId,
    query: LeadQuery,
  ) -> impl Stream<Item = Result<Lead>> + Send + 'a {
    stream::try_unfold(Some(query), move |state| async move {
      let Some(query) = state else {
        return Ok::<_, Error>(None);
      };
      let page = self.list_leads(agent, &query).await?;
      let next = page.next.map(|cursor| LeadQuery { after: Some(cursor), ..query });
      Ok(Some((stream::iter(page.leads.into_iter().map(Ok::<_, Error>)), next)))
    })
    .try_flatten()
  }
}
