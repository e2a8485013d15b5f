//! Deterministic lead scoring with no external calls.
//!
//! Used when the text-understanding service is unavailable and as a sanity
//! baseline. The result depends only on its arguments: the same lead,
//! interactions, clock reading and configuration always give the same
//! assessment, whatever order the interactions arrive in.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
  config::HeuristicConfig,
  interaction::{Direction, Interaction, Outcome},
  lead::Lead,
  score::{Assessment, Factor, clamp},
};

/// A budget figure written into free text: "budget 80L", "₹45 lakh",
/// "Rs. 1.2 cr", "$400k".
static BUDGET_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?ix)
      \bbudget\b [^0-9]{0,12} \d
    | (?: ₹ | \brs\.? | \binr\b | \$ ) \s* \d
    | \b\d+(?:\.\d+)? \s* (?:k|l|lac|lacs|lakh|lakhs|cr|crore|crores|mn|million)\b
    ",
  )
  .expect("budget pattern is valid")
});

/// A property type named in free text.
static PROPERTY_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(?:\d\s*bhk|bhk|apartment|flat|villa|plot|bungalow|penthouse|studio|duplex|row\s*house|office|shop)\b",
  )
  .expect("property type pattern is valid")
});

/// Which property-interest fields are known, from structured fields or notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestCoverage {
  pub property_type: bool,
  pub budget:        bool,
  pub location:      bool,
}

impl InterestCoverage {
  pub fn of(lead: &Lead) -> Self {
    Self {
      property_type: lead.interest.has_property_type() || mentions_property_type(&lead.notes),
      budget:        lead.interest.has_budget() || mentions_budget(&lead.notes),
      location:      lead.interest.has_location(),
    }
  }
}

pub fn mentions_budget(text: &str) -> bool { BUDGET_RE.is_match(text) }

pub fn mentions_property_type(text: &str) -> bool { PROPERTY_TYPE_RE.is_match(text) }

/// Whether any configured urgency keyword appears in `text`.
pub fn mentions_urgency(text: &str, keywords: &[String]) -> bool {
  let lower = text.to_lowercase();
  keywords
    .iter()
    .map(|k| k.trim().to_lowercase())
    .any(|k| !k.is_empty() && lower.contains(&k))
}

/// The interaction that happened last; insertion order breaks timestamp ties.
pub fn latest<'a, I>(interactions: I) -> Option<&'a Interaction>
where
  I: IntoIterator<Item = &'a Interaction>,
{
  interactions.into_iter().max_by_key(|i| (i.effective_at(), i.seq))
}

/// Score `lead` from its notes, interest fields and interaction history.
pub fn score(
  lead: &Lead,
  interactions: &[Interaction],
  now: DateTime<Utc>,
  config: &HeuristicConfig,
) -> Assessment {
  let mut factors = Vec::new();
  let coverage = InterestCoverage::of(lead);

  if coverage.budget {
    factors.push(Factor::positive("explicit_budget", config.budget_weight));
  }

  if mentions_urgency(&lead.notes, &config.urgency_keywords) {
    factors.push(Factor::positive("urgency_keywords", config.urgency_weight));
  }

  let last_inbound = latest(interactions.iter().filter(|i| i.direction == Direction::Inbound));
  if let Some(inbound) = last_inbound {
    let window_secs = config.recency_window_days * 86_400.0;
    let age_secs = (now - inbound.effective_at()).num_seconds().max(0) as f64;
    let remaining = if window_secs > 0.0 { (1.0 - age_secs / window_secs).max(0.0) } else { 0.0 };
    factors.push(Factor::positive("inbound_recency", config.recency_weight * remaining));
  }

  let contacts = interactions.iter().filter(|i| i.channel.is_contact()).count() as f64;
  if contacts > 0.0 {
    let saturation = f64::from(config.engagement_saturation.max(1));
    let scaled = ((1.0 + contacts).ln() / (1.0 + saturation).ln()).min(1.0);
    factors.push(Factor::positive("engagement", config.engagement_weight * scaled));
  }

  match latest(interactions.iter().filter(|i| i.outcome.is_some())).and_then(|i| i.outcome) {
    Some(Outcome::Interested | Outcome::Scheduled) => {
      factors.push(Factor::positive("positive_outcome", config.positive_outcome_weight));
    }
    Some(Outcome::NotInterested) => {
      factors.push(Factor::negative("not_interested", config.negative_outcome_weight));
    }
    Some(Outcome::NoAnswer) | None => {}
  }

  for (present, signal) in [
    (coverage.property_type, "missing_property_type"),
    (coverage.budget, "missing_budget"),
    (coverage.location, "missing_location"),
  ] {
    if !present {
      factors.push(Factor::negative(signal, config.missing_interest_penalty));
    }
  }

  let value = config.baseline + factors.iter().map(Factor::contribution).sum::<f64>();

  Assessment {
    value: clamp(value, 0.0, 100.0),
    confidence: clamp(config.confidence, 0.0, 1.0),
    factors,
    recommendations: Vec::new(),
  }
}
