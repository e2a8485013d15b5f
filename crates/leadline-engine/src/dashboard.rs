//! Dashboard aggregator: the agent's prioritized work queue.

use std::{cmp::Ordering, collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use leadline_core::{
  lead::{AgentId, LeadStatus},
  score::{Factor, ScoringMethod, Tier},
  sequence::SequenceState,
  store::{LeadStore, QueueEntry},
};

use crate::{Engine, Error, Result, TextUnderstanding, Trigger};

/// Factors shown per queue row.
const TOP_FACTORS: usize = 3;

// ─── Views ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueStep {
  pub step:     usize,
  pub channel:  leadline_core::interaction::Channel,
  pub template: String,
}

/// One row of the priority queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
  pub lead_id:             Uuid,
  pub name:                String,
  pub status:              LeadStatus,
  /// `None` until the lead has been scored.
  pub tier:                Option<Tier>,
  pub value:               Option<f64>,
  pub confidence:          Option<f64>,
  pub method:              Option<ScoringMethod>,
  pub urgency:             f64,
  /// Interactions were recorded after the score was computed; a rescore has
  /// been queued.
  pub stale:               bool,
  pub due_step:            Option<DueStep>,
  pub top_factors:         Vec<Factor>,
  pub recommendations:     Vec<String>,
  pub last_interaction_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuePage {
  pub items:     Vec<QueueItem>,
  /// 1-based.
  pub page:      usize,
  pub page_size: usize,
  /// Open leads across all pages.
  pub total:     usize,
}

// ─── Cache ───────────────────────────────────────────────────────────────────

type PageKey = (AgentId, usize, usize);

#[derive(Default)]
struct CacheState {
  /// Bumped on every write for the agent; a page computed under an older
  /// epoch is never stored.
  epochs: HashMap<AgentId, u64>,
  pages:  HashMap<PageKey, (Instant, QueuePage)>,
}

/// Short-lived memo of queue pages, invalidated per agent on every write.
pub(crate) struct QueueCache {
  ttl:   Duration,
  state: Mutex<CacheState>,
}

impl QueueCache {
  pub(crate) fn new(ttl: Duration) -> Self { Self { ttl, state: Mutex::default() } }

  fn enabled(&self) -> bool { !self.ttl.is_zero() }

  fn epoch(&self, agent: &AgentId) -> u64 {
    self.state.lock().epochs.get(agent).copied().unwrap_or(0)
  }

  fn get(&self, key: &PageKey) -> Option<QueuePage> {
    if !self.enabled() {
      return None;
    }
    let mut state = self.state.lock();
    match state.pages.get(key) {
      Some((stored, page)) if stored.elapsed() < self.ttl => Some(page.clone()),
      Some(_) => {
        state.pages.remove(key);
        None
      }
      None => None,
    }
  }

  fn put(&self, key: PageKey, epoch: u64, page: QueuePage) {
    if !self.enabled() {
      return;
    }
    let mut state = self.state.lock();
    if state.epochs.get(&key.0).copied().unwrap_or(0) == epoch {
      state.pages.insert(key, (Instant::now(), page));
    }
  }

  pub(crate) fn invalidate(&self, agent: &AgentId) {
    let mut state = self.state.lock();
    *state.epochs.entry(agent.clone()).or_insert(0) += 1;
    state.pages.retain(|(a, ..), _| a != agent);
  }
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Open leads ordered by tier, value and urgency. `page` is 1-based;
  /// `page_size` defaults to and is capped by the dashboard configuration.
  pub async fn priority_queue(
    &self,
    agent: &AgentId,
    page: usize,
    page_size: Option<usize>,
  ) -> Result<QueuePage> {
    if page == 0 {
      return Err(Error::Validation("page numbers start at 1".into()));
    }
    let dashboard = &self.config().dashboard;
    let page_size = page_size
      .unwrap_or(dashboard.default_page_size)
      .clamp(1, dashboard.max_page_size.max(1));

    let key = (agent.clone(), page, page_size);
    if let Some(cached) = self.inner.queue_cache.get(&key) {
      return Ok(cached);
    }
    let epoch = self.inner.queue_cache.epoch(agent);

    let entries = self.store().queue_entries(agent).await.map_err(Error::store)?;
    let now = self.now();

    let mut items: Vec<QueueItem> = entries.into_iter().map(|e| self.queue_item(e, now)).collect();
    items.sort_by(compare_items);

    for item in items.iter().filter(|i| i.stale || i.tier.is_none()) {
      self.enqueue(Trigger::Rescore { agent: agent.clone(), lead_id: item.lead_id });
    }

    let total = items.len();
    let items = items.into_iter().skip((page - 1).saturating_mul(page_size)).take(page_size).collect();
    let result = QueuePage { items, page, page_size, total };

    self.inner.queue_cache.put(key, epoch, result.clone());
    Ok(result)
  }

  fn queue_item(&self, entry: QueueEntry, now: DateTime<Utc>) -> QueueItem {
    let QueueEntry { lead, score, sequence } = entry;

    let overdue = sequence.as_ref().is_some_and(|s| {
      s.state == SequenceState::Due || s.next_due_at.is_some_and(|at| at <= now)
    });
    let window_secs = self.config().heuristic.recency_window_days * 86_400.0;
    let recency = match lead.last_interaction_at {
      Some(at) if window_secs > 0.0 => {
        let age = (now - at).num_seconds().max(0) as f64;
        (1.0 - age / window_secs).max(0.0)
      }
      _ => 0.0,
    };
    let urgency = (if overdue { 1.0 } else { 0.0 }) + recency;

    let due_step = sequence.as_ref().and_then(|s| {
      s.due_step().map(|step| DueStep {
        step:     s.current_step,
        channel:  step.channel,
        template: step.template.clone(),
      })
    });
    let stale = score.as_ref().is_some_and(|s| !s.is_fresh_for(&lead));

    QueueItem {
      lead_id: lead.lead_id,
      name: lead.name,
      status: lead.status,
      tier: score.as_ref().map(|s| s.tier),
      value: score.as_ref().map(|s| s.value),
      confidence: score.as_ref().map(|s| s.confidence),
      method: score.as_ref().map(|s| s.method),
      urgency,
      stale,
      due_step,
      top_factors: score
        .as_ref()
        .map(|s| s.factors.iter().take(TOP_FACTORS).cloned().collect())
        .unwrap_or_default(),
      recommendations: score.map(|s| s.recommendations).unwrap_or_default(),
      last_interaction_at: lead.last_interaction_at,
    }
  }
}

/// Tier first (unscored last), then value and urgency descending, then id.
fn compare_items(a: &QueueItem, b: &QueueItem) -> Ordering {
  let rank = |i: &QueueItem| i.tier.map_or(0, Tier::priority);
  rank(b)
    .cmp(&rank(a))
    .then_with(|| b.value.unwrap_or(0.0).total_cmp(&a.value.unwrap_or(0.0)))
    .then_with(|| b.urgency.total_cmp(&a.urgency))
    .then_with(|| a.lead_id.cmp(&b.lead_id))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(tier: Option<Tier>, value: f64, urgency: f64) -> QueueItem {
    QueueItem {
      lead_id: Uuid::new_v4(),
      name: "x".into(),
      status: LeadStatus::New,
      tier,
      value: tier.map(|_| value),
      confidence: None,
      method: None,
      urgency,
      stale: false,
      due_step: None,
      top_factors: Vec::new(),
      recommendations: Vec::new(),
      last_interaction_at: None,
    }
  }

  #[test]
  fn tier_beats_value_and_unscored_is_last() {
    let mut items = vec![
      item(None, 0.0, 2.0),
      item(Some(Tier::Cold), 39.0, 1.0),
      item(Some(Tier::Warm), 41.0, 0.0),
      item(Some(Tier::Hot), 76.0, 0.0),
      item(Some(Tier::Warm), 60.0, 0.0),
    ];
    items.sort_by(compare_items);
    let order: Vec<_> = items.iter().map(|i| (i.tier, i.value)).collect();
    assert_eq!(order, [
      (Some(Tier::Hot), Some(76.0)),
      (Some(Tier::Warm), Some(60.0)),
      (Some(Tier::Warm), Some(41.0)),
      (Some(Tier::Cold), Some(39.0)),
      (None, None),
    ]);
  }

  #[test]
  fn urgency_breaks_value_ties() {
    let calm = item(Some(Tier::Warm), 50.0, 0.1);
    let overdue = item(Some(Tier::Warm), 50.0, 1.3);
    assert_eq!(compare_items(&overdue, &calm), Ordering::Less);
  }

  #[tokio::test]
  async fn cache_drops_pages_on_invalidate() {
    let cache = QueueCache::new(Duration::from_secs(60));
    let agent = AgentId::new("a");
    let key = (agent.clone(), 1, 20);
    let page = QueuePage { items: Vec::new(), page: 1, page_size: 20, total: 0 };

    cache.put(key.clone(), cache.epoch(&agent), page.clone());
    assert_eq!(cache.get(&key), Some(page.clone()));

    let epoch = cache.epoch(&agent);
    cache.invalidate(&agent);
    assert_eq!(cache.get(&key), None);

    // Computed before the write: never stored.
    cache.put(key.clone(), epoch, page);
    assert_eq!(cache.get(&key), None);
  }

  #[tokio::test]
  async fn zero_ttl_disables_cache() {
    let cache = QueueCache::new(Duration::ZERO);
    let agent = AgentId::new("a");
    let key = (agent.clone(), 1, 20);
    cache.put(key.clone(), 0, QueuePage { items: Vec::new(), page: 1, page_size: 20, total: 0 });
    assert_eq!(cache.get(&key), None);
  }
}
