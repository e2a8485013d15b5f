//! Scores: computed priority values with their explanation.
//!
//! Scores form an append-only history per lead. The "current" score is a view
//! (latest `computed_at`), never a mutable slot.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  lead::{AgentId, Lead},
};

// ─── Tier ────────────────────────────────────────────────────────────────────

/// Coarse bucket derived from a score value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  Hot,
  Warm,
  Cold,
}

impl Tier {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Hot => "hot",
      Self::Warm => "warm",
      Self::Cold => "cold",
    }
  }

  /// Higher is more urgent.
  pub fn priority(self) -> u8 {
    match self {
      Self::Hot => 3,
      Self::Warm => 2,
      Self::Cold => 1,
    }
  }
}

impl fmt::Display for Tier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Tier {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "hot" => Ok(Self::Hot),
      "warm" => Ok(Self::Warm),
      "cold" => Ok(Self::Cold),
      other => Err(Error::UnknownVariant { kind: "tier", value: other.to_owned() }),
    }
  }
}

// ─── Method ──────────────────────────────────────────────────────────────────

/// Which strategy produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMethod {
  #[serde(rename = "ai")]
  Ai,
  /// The text-understanding service was unavailable; informational, not an
  /// error.
  #[serde(rename = "heuristic-fallback")]
  HeuristicFallback,
}

impl ScoringMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Ai => "ai",
      Self::HeuristicFallback => "heuristic-fallback",
    }
  }
}

impl FromStr for ScoringMethod {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "ai" => Ok(Self::Ai),
      "heuristic-fallback" => Ok(Self::HeuristicFallback),
      other => Err(Error::UnknownVariant { kind: "scoring method", value: other.to_owned() }),
    }
  }
}

// ─── Factors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorDirection {
  Positive,
  Negative,
}

/// One contributing signal. `weight` is the magnitude in score points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
  pub signal:    String,
  pub weight:    f64,
  pub direction: FactorDirection,
}

impl Factor {
  pub fn positive(signal: impl Into<String>, weight: f64) -> Self {
    Self { signal: signal.into(), weight: weight.abs(), direction: FactorDirection::Positive }
  }

  pub fn negative(signal: impl Into<String>, weight: f64) -> Self {
    Self { signal: signal.into(), weight: weight.abs(), direction: FactorDirection::Negative }
  }

  /// Signed contribution to the score value.
  pub fn contribution(&self) -> f64 {
    match self.direction {
      FactorDirection::Positive => self.weight,
      FactorDirection::Negative => -self.weight,
    }
  }
}

/// Drop zero-weight factors and order the rest by weight descending, breaking
/// ties by signal name so the order is deterministic.
pub fn order_factors(factors: &mut Vec<Factor>) {
  factors.retain(|f| f.weight > 0.0 && f.weight.is_finite());
  factors.sort_by(|a, b| {
    b.weight
      .partial_cmp(&a.weight)
      .unwrap_or(Ordering::Equal)
      .then_with(|| a.signal.cmp(&b.signal))
  });
}

// ─── Assessment ──────────────────────────────────────────────────────────────

/// Output shared by every scoring strategy, before it is tied to a lead state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
  pub value:           f64,
  pub confidence:      f64,
  pub factors:         Vec<Factor>,
  pub recommendations: Vec<String>,
}

// ─── Score ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
  pub score_id:           Uuid,
  pub lead_id:            Uuid,
  pub agent_id:           AgentId,
  /// Always within `[0, 100]`.
  pub value:              f64,
  /// Always within `[0, 1]`.
  pub confidence:         f64,
  pub tier:               Tier,
  pub factors:            Vec<Factor>,
  pub recommendations:    Vec<String>,
  pub method:             ScoringMethod,
  /// Lead `version` the score was computed from.
  pub lead_version:       u64,
  /// Lead `interaction_count` the score was computed from.
  pub basis_interactions: u64,
  pub computed_at:        DateTime<Utc>,
}

impl Score {
  /// Tie an assessment to the lead state it was computed from. Value and
  /// confidence are clamped into range and factors are put in canonical order.
  pub fn from_assessment(
    lead: &Lead,
    assessment: Assessment,
    method: ScoringMethod,
    thresholds: &crate::config::TierThresholds,
    computed_at: DateTime<Utc>,
  ) -> Self {
    let value = clamp(assessment.value, 0.0, 100.0);
    let confidence = clamp(assessment.confidence, 0.0, 1.0);
    let mut factors = assessment.factors;
    order_factors(&mut factors);

    Self {
      score_id: Uuid::new_v4(),
      lead_id: lead.lead_id,
      agent_id: lead.agent_id.clone(),
      value,
      confidence,
      tier: thresholds.tier_for(value),
      factors,
      recommendations: assessment.recommendations,
      method,
      lead_version: lead.version,
      basis_interactions: lead.interaction_count,
      computed_at,
    }
  }

  /// A score is fresh when nothing has been recorded on the lead since it was
  /// computed.
  pub fn is_fresh_for(&self, lead: &Lead) -> bool {
    let after_last_contact = lead.last_interaction_at.is_none_or(|at| self.computed_at >= at);
    after_last_contact && self.basis_interactions >= lead.interaction_count
  }
}

/// NaN collapses to the lower bound.
pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
  if v.is_nan() { lo } else { v.clamp(lo, hi) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn factors_order_by_weight_then_name() {
    let mut factors = vec![
      Factor::positive("recency", 5.0),
      Factor::negative("missing_location", 5.0),
      Factor::positive("urgency", 35.0),
      Factor::positive("noise", 0.0),
    ];
    order_factors(&mut factors);

    let names: Vec<_> = factors.iter().map(|f| f.signal.as_str()).collect();
    assert_eq!(names, ["urgency", "missing_location", "recency"]);
  }

  #[test]
  fn negative_factor_contributes_negatively() {
    assert_eq!(Factor::negative("penalty", -7.5).contribution(), -7.5);
    assert_eq!(Factor::positive("bonus", 2.0).contribution(), 2.0);
  }

  #[test]
  fn clamp_handles_nan_and_bounds() {
    assert_eq!(clamp(f64::NAN, 0.0, 1.0), 0.0);
    assert_eq!(clamp(140.0, 0.0, 100.0), 100.0);
    assert_eq!(clamp(-3.0, 0.0, 100.0), 0.0);
  }

  #[test]
  fn method_serializes_with_hyphen() {
    assert_eq!(
      serde_json::to_string(&ScoringMethod::HeuristicFallback).unwrap(),
      "\"heuristic-fallback\""
    );
    assert_eq!("ai".parse::<ScoringMethod>().unwrap(), ScoringMethod::Ai);
  }
}
