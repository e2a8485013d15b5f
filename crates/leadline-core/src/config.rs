//! Tunable engine parameters.
//!
//! Every field has a default, so an empty configuration file yields a working
//! engine. Weights and windows are starting points, not calibrated constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
  interaction::Channel,
  score::Tier,
  sequence::FollowUpStep,
};

const HOUR: i64 = 60 * 60;
const DAY: i64 = 24 * HOUR;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub tiers:     TierThresholds,
  pub heuristic: HeuristicConfig,
  pub scoring:   ScoringConfig,
  pub cadences:  CadenceConfig,
  pub dashboard: DashboardConfig,
  pub worker:    WorkerConfig,
}

// ─── Tiers ───────────────────────────────────────────────────────────────────

/// Inclusive lower bounds of the `hot` and `warm` tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
  pub hot:  f64,
  pub warm: f64,
}

impl Default for TierThresholds {
  fn default() -> Self { Self { hot: 75.0, warm: 40.0 } }
}

impl TierThresholds {
  pub fn tier_for(&self, value: f64) -> Tier {
    if value >= self.hot {
      Tier::Hot
    } else if value >= self.warm {
      Tier::Warm
    } else {
      Tier::Cold
    }
  }
}

// ─── Heuristic scorer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
  /// Starting value before any signal is applied.
  pub baseline:                f64,
  pub budget_weight:           f64,
  pub urgency_weight:          f64,
  /// Maximum contribution of inbound recency; decays linearly to zero.
  pub recency_weight:          f64,
  pub recency_window_days:     f64,
  /// Maximum contribution of interaction volume (logarithmic).
  pub engagement_weight:       f64,
  /// Interaction count at which engagement saturates.
  pub engagement_saturation:   u32,
  pub positive_outcome_weight: f64,
  pub negative_outcome_weight: f64,
  /// Applied once per empty property-interest field.
  pub missing_interest_penalty: f64,
  /// Case-insensitive substrings that mark a lead as urgent.
  pub urgency_keywords:        Vec<String>,
  /// Fixed confidence of a heuristic score.
  pub confidence:              f64,
}

impl Default for HeuristicConfig {
  fn default() -> Self {
    Self {
      baseline:                 20.0,
      budget_weight:            30.0,
      urgency_weight:           35.0,
      recency_weight:           10.0,
      recency_window_days:      14.0,
      engagement_weight:        10.0,
      engagement_saturation:    10,
      positive_outcome_weight:  10.0,
      negative_outcome_weight:  30.0,
      missing_interest_penalty: 5.0,
      urgency_keywords:         ["urgent", "asap", "this week", "immediately", "today"]
        .into_iter()
        .map(String::from)
        .collect(),
      confidence:               0.6,
    }
  }
}

// ─── Scoring engine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  /// Hard bound on the text-understanding call.
  pub ai_timeout_ms:      u64,
  /// Extra persistence attempts after the first failure.
  pub persist_retries:    u32,
  /// Backoff before the first retry; doubles on each further attempt.
  pub persist_backoff_ms: u64,
}

impl Default for ScoringConfig {
  fn default() -> Self { Self { ai_timeout_ms: 3_000, persist_retries: 1, persist_backoff_ms: 200 } }
}

impl ScoringConfig {
  pub fn ai_timeout(&self) -> Duration { Duration::from_millis(self.ai_timeout_ms) }

  /// Backoff before retry number `attempt` (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(self.persist_backoff_ms.saturating_mul(factor))
  }
}

// ─── Follow-up cadences ──────────────────────────────────────────────────────

/// Step lists per tier, plus the shorter cadence used after a positive outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
  pub hot:       Vec<FollowUpStep>,
  pub warm:      Vec<FollowUpStep>,
  pub cold:      Vec<FollowUpStep>,
  pub escalated: Vec<FollowUpStep>,
}

impl Default for CadenceConfig {
  fn default() -> Self {
    Self {
      hot:       vec![
        FollowUpStep::new(HOUR, Channel::Call, "hot-first-call"),
        FollowUpStep::new(DAY, Channel::Message, "hot-next-day"),
        FollowUpStep::new(3 * DAY, Channel::Call, "hot-check-in"),
      ],
      warm:      vec![
        FollowUpStep::new(DAY, Channel::Call, "warm-intro"),
        FollowUpStep::new(3 * DAY, Channel::Message, "warm-listings"),
        FollowUpStep::new(7 * DAY, Channel::Email, "warm-check-in"),
      ],
      cold:      vec![
        FollowUpStep::new(3 * DAY, Channel::Message, "cold-intro"),
        FollowUpStep::new(14 * DAY, Channel::Email, "cold-nurture"),
      ],
      escalated: vec![
        FollowUpStep::new(2 * HOUR, Channel::Call, "escalated-confirm"),
        FollowUpStep::new(DAY, Channel::Visit, "escalated-visit"),
      ],
    }
  }
}

impl CadenceConfig {
  pub fn for_tier(&self, tier: Tier) -> &[FollowUpStep] {
    match tier {
      Tier::Hot => &self.hot,
      Tier::Warm => &self.warm,
      Tier::Cold => &self.cold,
    }
  }
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
  /// Memoization window for priority-queue pages; `0` disables the cache.
  pub cache_ttl_secs:    u64,
  pub default_page_size: usize,
  pub max_page_size:     usize,
}

impl Default for DashboardConfig {
  fn default() -> Self { Self { cache_ttl_secs: 5, default_page_size: 20, max_page_size: 100 } }
}

impl DashboardConfig {
  pub fn cache_ttl(&self) -> Duration { Duration::from_secs(self.cache_ttl_secs) }
}

// ─── Background worker ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Period of the scan that advances due sequences and flushes queued score
  /// writes.
  pub due_scan_interval_secs: u64,
}

impl Default for WorkerConfig {
  fn default() -> Self { Self { due_scan_interval_secs: 60 } }
}

impl WorkerConfig {
  pub fn due_scan_interval(&self) -> Duration {
    Duration::from_secs(self.due_scan_interval_secs.max(1))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tier_boundaries_are_inclusive() {
    let t = TierThresholds::default();
    assert_eq!(t.tier_for(75.0), Tier::Hot);
    assert_eq!(t.tier_for(74.9), Tier::Warm);
    assert_eq!(t.tier_for(40.0), Tier::Warm);
    assert_eq!(t.tier_for(39.99), Tier::Cold);
    assert_eq!(t.tier_for(0.0), Tier::Cold);
  }

  #[test]
  fn backoff_doubles() {
    let s = ScoringConfig::default();
    assert_eq!(s.backoff(1), Duration::from_millis(200));
    assert_eq!(s.backoff(2), Duration::from_millis(400));
    assert_eq!(s.backoff(3), Duration::from_millis(800));
  }

  #[test]
  fn partial_config_keeps_defaults() {
    let cfg: EngineConfig =
      serde_json::from_str(r#"{"tiers":{"hot":80.0},"scoring":{"ai_timeout_ms":500}}"#).unwrap();
    assert_eq!(cfg.tiers.hot, 80.0);
    assert_eq!(cfg.tiers.warm, 40.0);
    assert_eq!(cfg.scoring.ai_timeout_ms, 500);
    assert_eq!(cfg.scoring.persist_backoff_ms, 200);
    assert_eq!(cfg.cadences.cold.len(), 2);
  }
}
