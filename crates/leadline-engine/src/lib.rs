//! The Leadline engine: scoring, interaction tracking, follow-up sequencing and
//! the agent dashboard, on top of any [`LeadStore`].
//!
//! [`Engine`] is a cheap-to-clone handle. Writes that need follow-up work
//! (rescoring, sequence advancement) hand a [`worker::Trigger`] to the
//! background [`Worker`] after the write commits, so callers are never blocked
//! by either.

pub mod ai;
pub mod dashboard;
pub mod error;
pub mod leads;
pub mod scoring;
pub mod sequencer;
pub mod tracker;
pub mod worker;

use std::{
  collections::HashMap,
  sync::{Arc, atomic::AtomicU64},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use leadline_core::{
  clock::Clock, config::EngineConfig, lead::AgentId, score::Score, store::LeadStore,
};

pub use ai::{AiScorer, TextUnderstanding};
pub use error::{Error, Result};
pub use worker::{Trigger, Worker};

use dashboard::QueueCache;

/// Shared engine handle. Cloning is cheap; all state is reference-counted.
pub struct Engine<S, T> {
  inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for Engine<S, T> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

struct Inner<S, T> {
  store:       S,
  ai:          AiScorer<T>,
  config:      EngineConfig,
  clock:       Arc<dyn Clock>,
  /// Newest in-flight rescore per lead; only that one persists. Entries are
  /// removed when it finishes.
  generations: DashMap<Uuid, u64>,
  /// Source of generation ids, unique for the life of the engine.
  next_gen:    AtomicU64,
  /// Newest unpersisted score per lead, flushed by the due scan.
  pending:     Mutex<HashMap<Uuid, Score>>,
  queue_cache: QueueCache,
  triggers:    mpsc::UnboundedSender<Trigger>,
}

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Build an engine and the worker that consumes its triggers. The worker
  /// must be run (or drained) for background rescoring and sequencing to
  /// happen.
  pub fn new(
    store: S,
    text: T,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
  ) -> (Self, Worker<S, T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ai = AiScorer::new(text, config.scoring.ai_timeout());
    let queue_cache = QueueCache::new(config.dashboard.cache_ttl());

    let engine = Self {
      inner: Arc::new(Inner {
        store,
        ai,
        config,
        clock,
        generations: DashMap::new(),
        next_gen: AtomicU64::new(0),
        pending: Mutex::new(HashMap::new()),
        queue_cache,
        triggers: tx,
      }),
    };
    let worker = Worker::new(engine.clone(), rx);
    (engine, worker)
  }

  pub fn store(&self) -> &S { &self.inner.store }

  pub fn config(&self) -> &EngineConfig { &self.inner.config }

  pub(crate) fn now(&self) -> DateTime<Utc> { self.inner.clock.now() }

  /// Hand work to the background worker. Never blocks.
  pub(crate) fn enqueue(&self, trigger: Trigger) {
    if let Err(e) = self.inner.triggers.send(trigger) {
      tracing::debug!(trigger = ?e.0, "worker stopped; trigger dropped");
    }
  }

  /// Every write for an agent goes through here so cached queue pages never
  /// outlive the data they were built from.
  pub(crate) fn wrote(&self, agent: &AgentId) { self.inner.queue_cache.invalidate(agent); }

  pub(crate) async fn load_lead(
    &self,
    agent: &AgentId,
    lead_id: Uuid,
  ) -> Result<leadline_core::lead::Lead> {
    self
      .inner
      .store
      .get_lead(agent, lead_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::lead_not_found(lead_id))
  }
}
