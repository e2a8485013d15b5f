//! [`SqliteStore`]: the SQLite implementation of [`LeadStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params, params_from_iter};
use uuid::Uuid;

use leadline_core::{
  interaction::{Interaction, NewInteraction},
  lead::{AgentId, Lead, LeadPatch, LeadStatus, NewLead, PatchOutcome},
  score::Score,
  sequence::FollowUpSequence,
  store::{DueKey, LeadCursor, LeadOrder, LeadPage, LeadQuery, LeadStore, QueueEntry},
};

use crate::{
  Error, Result,
  encode::{
    RawInteraction, RawLead, RawScore, RawSequence, SequenceParams, encode_count, encode_dt,
    encode_json, encode_uuid,
  },
  schema::{PRAGMAS, SCHEMA, SCHEMA_VERSION},
};

const ACTIVE_STATES: &str = "('pending', 'due', 'paused')";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A lead store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let found = self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        let found: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if found <= SCHEMA_VERSION {
          conn.execute_batch(SCHEMA)?;
          conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(found)
      })
      .await?;

    if found > SCHEMA_VERSION {
      return Err(Error::UnsupportedSchema { found, supported: SCHEMA_VERSION });
    }
    tracing::debug!(previous = found, current = SCHEMA_VERSION, "schema ready");
    Ok(())
  }
}

// ─── Row helpers (run on the connection thread) ──────────────────────────────

fn select_lead(
  conn: &rusqlite::Connection,
  agent: &str,
  lead_id: &str,
) -> rusqlite::Result<Option<RawLead>> {
  conn
    .query_row(
      &format!("SELECT {} FROM leads WHERE lead_id = ?1 AND agent_id = ?2", RawLead::COLUMNS),
      params![lead_id, agent],
      |row| RawLead::from_row(row, 0),
    )
    .optional()
}

fn lead_exists(conn: &rusqlite::Connection, agent: &str, lead_id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM leads WHERE lead_id = ?1 AND agent_id = ?2",
        params![lead_id, agent],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

fn select_scores(
  conn: &rusqlite::Connection,
  agent: &str,
  lead_id: &str,
  limit: i64,
) -> rusqlite::Result<Vec<RawScore>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM scores
     WHERE agent_id = ?1 AND lead_id = ?2
     ORDER BY computed_at DESC, rowid DESC
     LIMIT ?3",
    RawScore::COLUMNS
  ))?;
  stmt
    .query_map(params![agent, lead_id, limit], RawScore::from_row)?
    .collect()
}

fn select_sequences(
  conn: &rusqlite::Connection,
  filter: &str,
  args: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<RawSequence>> {
  let mut stmt =
    conn.prepare(&format!("SELECT {} FROM sequences WHERE {filter}", RawSequence::COLUMNS))?;
  stmt.query_map(args, RawSequence::from_row)?.collect()
}

enum RawPatch {
  Updated(RawLead),
  NotFound,
  Conflict(i64),
}

enum SequenceInsert {
  Inserted,
  ActiveExists,
  NoLead,
}

// ─── LeadStore impl ──────────────────────────────────────────────────────────

impl LeadStore for SqliteStore {
  type Error = Error;

  // ── Leads ─────────────────────────────────────────────────────────────────

  async fn create_lead(&self, input: NewLead, at: DateTime<Utc>) -> Result<Lead> {
    input.validate()?;

    let lead = Lead {
      lead_id:             Uuid::new_v4(),
      agent_id:            input.agent_id,
      name:                input.name.trim().to_owned(),
      contact:             input.contact,
      notes:               input.notes,
      interest:            input.interest,
      source:              input.source,
      status:              LeadStatus::New,
      version:             1,
      created_at:          at,
      updated_at:          at,
      last_interaction_at: None,
      interaction_count:   0,
    };

    let id_str       = encode_uuid(lead.lead_id);
    let agent_str    = lead.agent_id.as_str().to_owned();
    let name         = lead.name.clone();
    let contact_str  = encode_json(&lead.contact)?;
    let notes        = lead.notes.clone();
    let interest_str = encode_json(&lead.interest)?;
    let source_str   = encode_json(&lead.source)?;
    let status_str   = lead.status.as_str();
    let at_str       = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO leads (
             lead_id, agent_id, name, contact, notes, interest, source,
             status, version, created_at, updated_at, interaction_count
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9, 0)",
          params![
            id_str,
            agent_str,
            name,
            contact_str,
            notes,
            interest_str,
            source_str,
            status_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(lead)
  }

  async fn get_lead(&self, agent: &AgentId, lead_id: Uuid) -> Result<Option<Lead>> {
    let agent_str = agent.as_str().to_owned();
    let id_str = encode_uuid(lead_id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_lead(conn, &agent_str, &id_str)?))
      .await?;

    raw.map(RawLead::into_lead).transpose()
  }

  async fn update_lead(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    expected_version: u64,
    patch: LeadPatch,
    at: DateTime<Utc>,
  ) -> Result<PatchOutcome> {
    let agent_str    = agent.as_str().to_owned();
    let id_str       = encode_uuid(lead_id);
    let expected     = encode_count(expected_version);
    let status_str   = patch.status.map(LeadStatus::as_str);
    let notes        = patch.notes;
    let interest_str = patch.interest.as_ref().map(encode_json).transpose()?;
    let at_str       = encode_dt(at);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<i64> = tx
          .query_row(
            "SELECT version FROM leads WHERE lead_id = ?1 AND agent_id = ?2",
            params![id_str, agent_str],
            |r| r.get(0),
          )
          .optional()?;

        let outcome = match current {
          None => RawPatch::NotFound,
          Some(version) if version != expected => RawPatch::Conflict(version),
          Some(_) => {
            tx.execute(
              "UPDATE leads SET
                 status     = COALESCE(?3, status),
                 notes      = COALESCE(?4, notes),
                 interest   = COALESCE(?5, interest),
                 version    = version + 1,
                 updated_at = MAX(updated_at, ?6)
               WHERE lead_id = ?1 AND agent_id = ?2",
              params![id_str, agent_str, status_str, notes, interest_str, at_str],
            )?;
            match select_lead(&tx, &agent_str, &id_str)? {
              Some(raw) => RawPatch::Updated(raw),
              None => RawPatch::NotFound,
            }
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(match raw {
      RawPatch::Updated(raw) => PatchOutcome::Updated(raw.into_lead()?),
      RawPatch::NotFound => PatchOutcome::NotFound,
      RawPatch::Conflict(v) => {
        PatchOutcome::Conflict { current_version: u64::try_from(v).unwrap_or_default() }
      }
    })
  }

  async fn list_leads(&self, agent: &AgentId, query: &LeadQuery) -> Result<LeadPage> {
    let key = match query.order {
      LeadOrder::Created => "created_at",
      LeadOrder::Updated => "updated_at",
    };
    let limit = query.effective_limit();

    let mut conds = vec!["agent_id = ?".to_owned()];
    let mut args = vec![agent.as_str().to_owned()];

    if !query.statuses.is_empty() {
      conds.push(format!("status IN ({})", vec!["?"; query.statuses.len()].join(", ")));
      args.extend(query.statuses.iter().map(|s| s.as_str().to_owned()));
    }
    if let Some(after) = query.created_after {
      conds.push("created_at >= ?".to_owned());
      args.push(encode_dt(after));
    }
    if let Some(before) = query.created_before {
      conds.push("created_at < ?".to_owned());
      args.push(encode_dt(before));
    }
    if let Some(cursor) = &query.after {
      conds.push(format!("({key} > ? OR ({key} = ? AND lead_id > ?))"));
      let at = encode_dt(cursor.at);
      args.push(at.clone());
      args.push(at);
      args.push(encode_uuid(cursor.lead_id));
    }

    let sql = format!(
      "SELECT {} FROM leads WHERE {} ORDER BY {key}, lead_id LIMIT {}",
      RawLead::COLUMNS,
      conds.join(" AND "),
      limit + 1,
    );

    let raws: Vec<RawLead> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args.iter()), |row| RawLead::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut leads: Vec<Lead> = raws.into_iter().map(RawLead::into_lead).collect::<Result<_>>()?;
    let next = if leads.len() > limit {
      leads.truncate(limit);
      leads.last().map(|l| LeadCursor::after(l, query.order))
    } else {
      None
    };

    Ok(LeadPage { leads, next })
  }

  // ── Interactions ──────────────────────────────────────────────────────────

  async fn append_interaction(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    input: NewInteraction,
    recorded_at: DateTime<Utc>,
  ) -> Result<Option<Interaction>> {
    input.validate(recorded_at)?;

    let mut interaction = Interaction {
      interaction_id: Uuid::new_v4(),
      lead_id,
      agent_id: agent.clone(),
      seq: 0,
      channel: input.channel,
      direction: input.direction,
      occurred_at: input.occurred_at,
      summary: input.summary,
      outcome: input.outcome,
      recorded_at,
    };

    let id_str        = encode_uuid(interaction.interaction_id);
    let lead_str      = encode_uuid(lead_id);
    let agent_str     = agent.as_str().to_owned();
    let channel_str   = interaction.channel.as_str();
    let direction_str = interaction.direction.as_str();
    let occurred_str  = encode_dt(interaction.occurred_at);
    let summary       = interaction.summary.clone();
    let outcome_str   = interaction.outcome.map(|o| o.as_str());
    let recorded_str  = encode_dt(recorded_at);
    let effective_str = encode_dt(interaction.effective_at());

    let seq: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !lead_exists(&tx, &agent_str, &lead_str)? {
          return Ok(None);
        }

        let seq: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq), 0) + 1 FROM interactions WHERE lead_id = ?1",
          params![lead_str],
          |r| r.get(0),
        )?;

        tx.execute(
          "INSERT INTO interactions (
             interaction_id, lead_id, agent_id, seq, channel, direction,
             occurred_at, summary, outcome, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          params![
            id_str,
            lead_str,
            agent_str,
            seq,
            channel_str,
            direction_str,
            occurred_str,
            summary,
            outcome_str,
            recorded_str,
          ],
        )?;

        tx.execute(
          "UPDATE leads SET
             last_interaction_at = CASE
               WHEN last_interaction_at IS NULL OR last_interaction_at < ?2 THEN ?2
               ELSE last_interaction_at
             END,
             interaction_count = interaction_count + 1,
             updated_at        = MAX(updated_at, ?3)
           WHERE lead_id = ?1",
          params![lead_str, effective_str, recorded_str],
        )?;

        tx.commit()?;
        Ok(Some(seq))
      })
      .await?;

    Ok(seq.map(|seq| {
      interaction.seq = u64::try_from(seq).unwrap_or_default();
      interaction
    }))
  }

  async fn list_interactions(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
    after_seq: u64,
  ) -> Result<Vec<Interaction>> {
    let agent_str = agent.as_str().to_owned();
    let lead_str = encode_uuid(lead_id);
    let after = encode_count(after_seq);

    let raws: Vec<RawInteraction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM interactions
           WHERE agent_id = ?1 AND lead_id = ?2 AND seq > ?3
           ORDER BY occurred_at, seq",
          RawInteraction::COLUMNS
        ))?;
        let rows = stmt
          .query_map(params![agent_str, lead_str, after], RawInteraction::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawInteraction::into_interaction).collect()
  }

  // ── Scores ────────────────────────────────────────────────────────────────

  async fn append_score(&self, score: &Score) -> Result<()> {
    let id_str        = encode_uuid(score.score_id);
    let lead_str      = encode_uuid(score.lead_id);
    let agent_str     = score.agent_id.as_str().to_owned();
    let value         = score.value;
    let confidence    = score.confidence;
    let tier_str      = score.tier.as_str();
    let factors_str   = encode_json(&score.factors)?;
    let recs_str      = encode_json(&score.recommendations)?;
    let method_str    = score.method.as_str();
    let lead_version  = encode_count(score.lead_version);
    let basis         = encode_count(score.basis_interactions);
    let computed_str  = encode_dt(score.computed_at);

    let touched = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let touched = tx.execute(
          "UPDATE leads SET updated_at = MAX(updated_at, ?3) WHERE lead_id = ?1 AND agent_id = ?2",
          params![lead_str, agent_str, computed_str],
        )?;
        if touched == 0 {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO scores (
             score_id, lead_id, agent_id, value, confidence, tier, factors,
             recommendations, method, lead_version, basis_interactions, computed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          params![
            id_str,
            lead_str,
            agent_str,
            value,
            confidence,
            tier_str,
            factors_str,
            recs_str,
            method_str,
            lead_version,
            basis,
            computed_str,
          ],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if touched { Ok(()) } else { Err(Error::LeadNotFound(score.lead_id)) }
  }

  async fn latest_score(&self, agent: &AgentId, lead_id: Uuid) -> Result<Option<Score>> {
    Ok(self.score_history(agent, lead_id, 1).await?.into_iter().next())
  }

  async fn score_history(&self, agent: &AgentId, lead_id: Uuid, limit: usize) -> Result<Vec<Score>> {
    let agent_str = agent.as_str().to_owned();
    let lead_str = encode_uuid(lead_id);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws = self
      .conn
      .call(move |conn| Ok(select_scores(conn, &agent_str, &lead_str, limit)?))
      .await?;

    raws.into_iter().map(RawScore::into_score).collect()
  }

  // ── Sequences ─────────────────────────────────────────────────────────────

  async fn create_sequence(&self, sequence: &FollowUpSequence) -> Result<Option<FollowUpSequence>> {
    let p = SequenceParams::encode(sequence)?;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !lead_exists(&tx, &p.agent_id, &p.lead_id)? {
          return Ok(SequenceInsert::NoLead);
        }
        let active = tx
          .query_row(
            &format!("SELECT 1 FROM sequences WHERE lead_id = ?1 AND state IN {ACTIVE_STATES}"),
            params![p.lead_id],
            |_| Ok(()),
          )
          .optional()?;
        if active.is_some() {
          return Ok(SequenceInsert::ActiveExists);
        }

        tx.execute(
          &format!(
            "INSERT INTO sequences ({}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            RawSequence::COLUMNS
          ),
          params![
            p.sequence_id,
            p.lead_id,
            p.agent_id,
            p.tier,
            p.steps,
            p.current_step,
            p.state,
            p.anchor_at,
            p.next_due_at,
            p.escalated,
            p.last_applied_seq,
            p.proposed_status,
            p.closed_reason,
            p.version,
            p.created_at,
            p.updated_at,
          ],
        )?;
        tx.commit()?;
        Ok(SequenceInsert::Inserted)
      })
      .await?;

    match outcome {
      SequenceInsert::Inserted => Ok(Some(sequence.clone())),
      SequenceInsert::ActiveExists => Ok(None),
      SequenceInsert::NoLead => Err(Error::LeadNotFound(sequence.lead_id)),
    }
  }

  async fn active_sequence(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
  ) -> Result<Option<FollowUpSequence>> {
    let agent_str = agent.as_str().to_owned();
    let lead_str = encode_uuid(lead_id);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_sequences(
          conn,
          &format!("agent_id = ?1 AND lead_id = ?2 AND state IN {ACTIVE_STATES}"),
          &[&agent_str, &lead_str],
        )?)
      })
      .await?;

    raws.into_iter().next().map(RawSequence::into_sequence).transpose()
  }

  async fn sequence_history(&self, agent: &AgentId, lead_id: Uuid) -> Result<Vec<FollowUpSequence>> {
    let agent_str = agent.as_str().to_owned();
    let lead_str = encode_uuid(lead_id);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_sequences(
          conn,
          "agent_id = ?1 AND lead_id = ?2 ORDER BY created_at DESC, rowid DESC",
          &[&agent_str, &lead_str],
        )?)
      })
      .await?;

    raws.into_iter().map(RawSequence::into_sequence).collect()
  }

  async fn save_sequence(&self, sequence: &FollowUpSequence) -> Result<Option<FollowUpSequence>> {
    let p = SequenceParams::encode(sequence)?;

    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE sequences SET
             tier             = ?4,
             steps            = ?5,
             current_step     = ?6,
             state            = ?7,
             anchor_at        = ?8,
             next_due_at      = ?9,
             escalated        = ?10,
             last_applied_seq = ?11,
             proposed_status  = ?12,
             closed_reason    = ?13,
             updated_at       = ?14,
             version          = version + 1
           WHERE sequence_id = ?1 AND agent_id = ?2 AND version = ?3
             AND state NOT IN ('completed', 'abandoned')",
          params![
            p.sequence_id,
            p.agent_id,
            p.version,
            p.tier,
            p.steps,
            p.current_step,
            p.state,
            p.anchor_at,
            p.next_due_at,
            p.escalated,
            p.last_applied_seq,
            p.proposed_status,
            p.closed_reason,
            p.updated_at,
          ],
        )?;
        Ok(n == 1)
      })
      .await?;

    Ok(updated.then(|| FollowUpSequence { version: sequence.version + 1, ..sequence.clone() }))
  }

  async fn due_sequences(&self, now: DateTime<Utc>) -> Result<Vec<DueKey>> {
    let now_str = encode_dt(now);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT agent_id, lead_id FROM sequences
           WHERE state IN ('pending', 'due')
             AND next_due_at IS NOT NULL
             AND next_due_at <= ?1
           ORDER BY next_due_at",
        )?;
        let rows = stmt
          .query_map(params![now_str], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(agent, lead)| -> Result<DueKey> {
        Ok(DueKey { agent_id: AgentId::new(agent), lead_id: Uuid::parse_str(&lead)? })
      })
      .collect()
  }

  async fn due_followups(&self, agent: &AgentId) -> Result<Vec<FollowUpSequence>> {
    let agent_str = agent.as_str().to_owned();

    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_sequences(
          conn,
          "agent_id = ?1 AND state = 'due' ORDER BY anchor_at, sequence_id",
          &[&agent_str],
        )?)
      })
      .await?;

    raws.into_iter().map(RawSequence::into_sequence).collect()
  }

  // ── Dashboard ─────────────────────────────────────────────────────────────

  async fn queue_entries(&self, agent: &AgentId) -> Result<Vec<QueueEntry>> {
    let agent_str = agent.as_str().to_owned();

    let (leads, scores, sequences) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM leads WHERE agent_id = ?1 AND status NOT IN ('won', 'lost')",
          RawLead::COLUMNS
        ))?;
        let leads = stmt
          .query_map(params![agent_str], |row| RawLead::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM scores s
           WHERE s.agent_id = ?1
             AND s.score_id = (
               SELECT s2.score_id FROM scores s2
               WHERE s2.lead_id = s.lead_id
               ORDER BY s2.computed_at DESC, s2.rowid DESC
               LIMIT 1
             )",
          RawScore::COLUMNS
        ))?;
        let scores = stmt
          .query_map(params![agent_str], RawScore::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let sequences = select_sequences(
          conn,
          &format!("agent_id = ?1 AND state IN {ACTIVE_STATES}"),
          &[&agent_str],
        )?;

        Ok((leads, scores, sequences))
      })
      .await?;

    let mut scores: HashMap<Uuid, Score> = scores
      .into_iter()
      .map(|raw| raw.into_score().map(|s| (s.lead_id, s)))
      .collect::<Result<_>>()?;
    let mut sequences: HashMap<Uuid, FollowUpSequence> = sequences
      .into_iter()
      .map(|raw| raw.into_sequence().map(|s| (s.lead_id, s)))
      .collect::<Result<_>>()?;

    leads
      .into_iter()
      .map(|raw| -> Result<QueueEntry> {
        let lead = raw.into_lead()?;
        Ok(QueueEntry {
          score: scores.remove(&lead.lead_id),
          sequence: sequences.remove(&lead.lead_id),
          lead,
        })
      })
      .collect()
  }
}
