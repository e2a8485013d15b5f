//! SQL schema for the Leadline SQLite store.
//!
//! Applied at connection startup. `PRAGMA user_version` records which schema a
//! file carries; a file written by a newer build is refused.

pub const SCHEMA_VERSION: i64 = 1;

/// Connection settings applied on every open.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS leads (
    lead_id             TEXT PRIMARY KEY,
    agent_id            TEXT NOT NULL,
    name                TEXT NOT NULL,
    contact             TEXT NOT NULL,   -- JSON ContactChannels
    notes               TEXT NOT NULL DEFAULT '',
    interest            TEXT NOT NULL,   -- JSON PropertyInterest
    source              TEXT NOT NULL,   -- JSON LeadSource
    status              TEXT NOT NULL,
    version             INTEGER NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    last_interaction_at TEXT,
    interaction_count   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS leads_agent_created_idx ON leads(agent_id, created_at, lead_id);
CREATE INDEX IF NOT EXISTS leads_agent_updated_idx ON leads(agent_id, updated_at, lead_id);
CREATE INDEX IF NOT EXISTS leads_agent_status_idx  ON leads(agent_id, status);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS interactions (
    interaction_id TEXT PRIMARY KEY,
    lead_id        TEXT NOT NULL REFERENCES leads(lead_id),
    agent_id       TEXT NOT NULL,
    seq            INTEGER NOT NULL,   -- per-lead insertion order, from 1
    channel        TEXT NOT NULL,
    direction      TEXT NOT NULL,
    occurred_at    TEXT NOT NULL,
    summary        TEXT,
    outcome        TEXT,
    recorded_at    TEXT NOT NULL,
    UNIQUE (lead_id, seq)
);

CREATE INDEX IF NOT EXISTS interactions_agent_lead_idx
    ON interactions(agent_id, lead_id, occurred_at, seq);

-- Append-only score history; the current score is the latest computed_at.
CREATE TABLE IF NOT EXISTS scores (
    score_id           TEXT PRIMARY KEY,
    lead_id            TEXT NOT NULL REFERENCES leads(lead_id),
    agent_id           TEXT NOT NULL,
    value              REAL NOT NULL CHECK (value >= 0 AND value <= 100),
    confidence         REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
    tier               TEXT NOT NULL,
    factors            TEXT NOT NULL,   -- JSON [Factor]
    recommendations    TEXT NOT NULL,   -- JSON [String]
    method             TEXT NOT NULL,
    lead_version       INTEGER NOT NULL,
    basis_interactions INTEGER NOT NULL,
    computed_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS scores_agent_lead_idx ON scores(agent_id, lead_id, computed_at);
CREATE INDEX IF NOT EXISTS scores_agent_tier_idx ON scores(agent_id, tier, value);

CREATE TABLE IF NOT EXISTS sequences (
    sequence_id      TEXT PRIMARY KEY,
    lead_id          TEXT NOT NULL REFERENCES leads(lead_id),
    agent_id         TEXT NOT NULL,
    tier             TEXT NOT NULL,
    steps            TEXT NOT NULL,   -- JSON [FollowUpStep]
    current_step     INTEGER NOT NULL,
    state            TEXT NOT NULL,
    anchor_at        TEXT NOT NULL,
    next_due_at      TEXT,
    escalated        INTEGER NOT NULL DEFAULT 0,
    last_applied_seq INTEGER NOT NULL DEFAULT 0,
    proposed_status  TEXT,
    closed_reason    TEXT,
    version          INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sequences_agent_lead_idx ON sequences(agent_id, lead_id, created_at);
CREATE INDEX IF NOT EXISTS sequences_due_idx
    ON sequences(next_due_at) WHERE next_due_at IS NOT NULL;

-- At most one active sequence per lead.
CREATE UNIQUE INDEX IF NOT EXISTS sequences_one_active_idx
    ON sequences(lead_id) WHERE state IN ('pending', 'due', 'paused');
";
