//! Adapter over the external text-understanding service.
//!
//! The service reads a lead's notes and interaction summaries and returns
//! normalized signals. The adapter bounds the call with a hard timeout and maps
//! the signals into the same [`Assessment`] shape the heuristic scorer
//! produces. It never raises past the scoring engine: every failure is a
//! [`ScorerError`], which triggers the heuristic fallback.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use leadline_core::{
  heuristic::{self, InterestCoverage},
  interaction::{Channel, Direction, Interaction, Outcome},
  lead::{Lead, LeadStatus, PropertyInterest},
  score::{Assessment, Factor},
};

const URGENCY_WEIGHT: f64 = 35.0;
const BUDGET_WEIGHT: f64 = 25.0;
const SENTIMENT_WEIGHT: f64 = 15.0;
const BASELINE: f64 = 25.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScorerError {
  /// The service could not be reached, failed, or answered with something
  /// unusable.
  #[error("text understanding unavailable: {0}")]
  Unavailable(String),

  #[error("text understanding timed out after {0:?}")]
  Timeout(Duration),
}

// ─── Wire types ──────────────────────────────────────────────────────────────

/// One interaction as the service sees it.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionDigest {
  pub occurred_at: DateTime<Utc>,
  pub channel:     Channel,
  pub direction:   Direction,
  pub outcome:     Option<Outcome>,
  pub summary:     Option<String>,
}

/// Structured facts the engine already knows, sent alongside the free text.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisHints {
  pub has_budget:        bool,
  pub has_property_type: bool,
  pub has_location:      bool,
  pub interaction_count: u64,
  pub latest_outcome:    Option<Outcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
  pub lead_id:      Uuid,
  pub status:       LeadStatus,
  pub notes:        String,
  pub interest:     PropertyInterest,
  pub interactions: Vec<InteractionDigest>,
  pub hints:        AnalysisHints,
}

impl AnalysisRequest {
  pub fn new(lead: &Lead, interactions: &[Interaction]) -> Self {
    let coverage = InterestCoverage::of(lead);
    let latest_outcome = heuristic::latest(interactions.iter().filter(|i| i.outcome.is_some()))
      .and_then(|i| i.outcome);

    Self {
      lead_id:      lead.lead_id,
      status:       lead.status,
      notes:        lead.notes.clone(),
      interest:     lead.interest.clone(),
      interactions: interactions
        .iter()
        .map(|i| InteractionDigest {
          occurred_at: i.occurred_at,
          channel:     i.channel,
          direction:   i.direction,
          outcome:     i.outcome,
          summary:     i.summary.clone(),
        })
        .collect(),
      hints:        AnalysisHints {
        has_budget: coverage.budget,
        has_property_type: coverage.property_type,
        has_location: coverage.location,
        interaction_count: lead.interaction_count,
        latest_outcome,
      },
    }
  }
}

/// What the service returns. Every signal is optional on the wire so that a
/// missing one is reported as malformed rather than failing deserialization
/// with a less useful message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
  /// `[0, 1]`
  pub urgency:         Option<f64>,
  /// `[0, 1]`, strength of the budget signal.
  pub budget:          Option<f64>,
  /// `[-1, 1]`
  pub sentiment:       Option<f64>,
  /// `[0, 1]`
  pub confidence:      Option<f64>,
  #[serde(default)]
  pub recommendations: Vec<String>,
}

impl Analysis {
  /// Map the signals onto the shared factor schema:
  /// `value = 25 + 35·urgency + 25·budget + 15·sentiment`.
  pub fn into_assessment(self) -> Result<Assessment, ScorerError> {
    let urgency = signal("urgency", self.urgency, 0.0, 1.0)?;
    let budget = signal("budget", self.budget, 0.0, 1.0)?;
    let sentiment = signal("sentiment", self.sentiment, -1.0, 1.0)?;
    let confidence = signal("confidence", self.confidence, 0.0, 1.0)?;

    let sentiment_factor = if sentiment >= 0.0 {
      Factor::positive("sentiment", SENTIMENT_WEIGHT * sentiment)
    } else {
      Factor::negative("sentiment", SENTIMENT_WEIGHT * sentiment)
    };
    let factors = vec![
      Factor::positive("urgency", URGENCY_WEIGHT * urgency),
      Factor::positive("budget_signal", BUDGET_WEIGHT * budget),
      sentiment_factor,
    ];
    let value = BASELINE + factors.iter().map(Factor::contribution).sum::<f64>();

    Ok(Assessment {
      value,
      confidence,
      factors,
      recommendations: self
        .recommendations
        .into_iter()
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty())
        .collect(),
    })
  }
}

fn signal(name: &str, value: Option<f64>, lo: f64, hi: f64) -> Result<f64, ScorerError> {
  match value {
    Some(v) if v.is_finite() && (lo..=hi).contains(&v) => Ok(v),
    Some(v) => Err(ScorerError::Unavailable(format!(
      "malformed response: {name} {v} outside [{lo}, {hi}]"
    ))),
    None => Err(ScorerError::Unavailable(format!("malformed response: {name} missing"))),
  }
}

// ─── Service trait ───────────────────────────────────────────────────────────

/// The external text-understanding collaborator.
pub trait TextUnderstanding: Send + Sync {
  fn analyze<'a>(
    &'a self,
    request: &'a AnalysisRequest,
  ) -> impl Future<Output = Result<Analysis, ScorerError>> + Send + 'a;
}

/// Bounds a [`TextUnderstanding`] call and validates what comes back.
pub struct AiScorer<T> {
  service: T,
  timeout: Duration,
}

impl<T: TextUnderstanding> AiScorer<T> {
  pub fn new(service: T, timeout: Duration) -> Self { Self { service, timeout } }

  pub fn service(&self) -> &T { &self.service }

  pub async fn score(
    &self,
    lead: &Lead,
    interactions: &[Interaction],
  ) -> Result<Assessment, ScorerError> {
    let request = AnalysisRequest::new(lead, interactions);

    tracing::trace!(
      lead_id = %lead.lead_id,
      timeout_ms = self.timeout.as_millis() as u64,
      "calling text understanding"
    );

    match tokio::time::timeout(self.timeout, self.service.analyze(&request)).await {
      Ok(result) => result?.into_assessment(),
      Err(_elapsed) => Err(ScorerError::Timeout(self.timeout)),
    }
  }
}

// ─── Implementations ─────────────────────────────────────────────────────────

/// Connection settings for the HTTP text-understanding service. With no
/// endpoint, scoring always uses the heuristic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiServiceConfig {
  pub endpoint: Option<String>,
  pub api_key:  Option<String>,
}

/// JSON over HTTP: the request is POSTed as-is and the body parsed as an
/// [`Analysis`].
#[derive(Debug, Clone)]
pub struct HttpTextService {
  client:   reqwest::Client,
  endpoint: String,
  api_key:  Option<String>,
}

impl HttpTextService {
  /// `timeout` is a transport-level ceiling; the scorer applies its own.
  pub fn new(
    endpoint: impl Into<String>,
    api_key: Option<String>,
    timeout: Duration,
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, endpoint: endpoint.into(), api_key })
  }
}

impl TextUnderstanding for HttpTextService {
  async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ScorerError> {
    let mut req = self.client.post(&self.endpoint).json(request);
    if let Some(key) = &self.api_key {
      req = req.bearer_auth(key);
    }

    let response = req
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| ScorerError::Unavailable(e.to_string()))?;

    response
      .json::<Analysis>()
      .await
      .map_err(|e| ScorerError::Unavailable(format!("malformed response: {e}")))
  }
}

/// Always unavailable; every score uses the heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTextService;

impl TextUnderstanding for DisabledTextService {
  async fn analyze(&self, _request: &AnalysisRequest) -> Result<Analysis, ScorerError> {
    Err(ScorerError::Unavailable("text understanding is disabled".into()))
  }
}

/// The service selected by configuration.
#[derive(Debug, Clone)]
pub enum TextService {
  Http(HttpTextService),
  Disabled(DisabledTextService),
}

impl TextService {
  pub fn from_config(config: &AiServiceConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
    match &config.endpoint {
      Some(endpoint) => {
        Ok(Self::Http(HttpTextService::new(endpoint.clone(), config.api_key.clone(), timeout)?))
      }
      None => Ok(Self::Disabled(DisabledTextService)),
    }
  }
}

impl TextUnderstanding for TextService {
  async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ScorerError> {
    match self {
      Self::Http(s) => s.analyze(request).await,
      Self::Disabled(s) => s.analyze(request).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn analysis(u: f64, b: f64, s: f64) -> Analysis {
    Analysis {
      urgency:         Some(u),
      budget:          Some(b),
      sentiment:       Some(s),
      confidence:      Some(0.9),
      recommendations: vec!["  Call today ".into(), " ".into()],
    }
  }

  #[test]
  fn signals_map_onto_value() {
    let a = analysis(1.0, 1.0, 1.0).into_assessment().unwrap();
    assert_eq!(a.value, 100.0);
    assert_eq!(a.confidence, 0.9);
    assert_eq!(a.recommendations, ["Call today"]);

    let a = analysis(0.0, 0.0, -1.0).into_assessment().unwrap();
    assert_eq!(a.value, 10.0);
    let sentiment = a.factors.iter().find(|f| f.signal == "sentiment").unwrap();
    assert_eq!(sentiment.contribution(), -15.0);
  }

  #[test]
  fn out_of_range_is_unavailable() {
    assert!(matches!(
      analysis(1.4, 0.5, 0.0).into_assessment(),
      Err(ScorerError::Unavailable(_))
    ));
    assert!(matches!(
      analysis(0.5, 0.5, f64::NAN).into_assessment(),
      Err(ScorerError::Unavailable(_))
    ));
  }

  #[test]
  fn missing_signal_is_never_defaulted() {
    let partial = Analysis { urgency: Some(0.5), ..Analysis::default() };
    let err = partial.into_assessment().unwrap_err();
    assert_eq!(err, ScorerError::Unavailable("malformed response: budget missing".into()));
  }

  #[test]
  fn wire_answer_without_recommendations_parses() {
    let body = r#"{"urgency":0.9,"budget":0.8,"sentiment":0.2,"confidence":0.7}"#;
    let parsed: Analysis = serde_json::from_str(body).unwrap();
    assert!(parsed.recommendations.is_empty());
    assert_eq!(parsed.urgency, Some(0.9));

    let nulls: Analysis = serde_json::from_str(r#"{"urgency":null}"#).unwrap();
    assert!(nulls.into_assessment().is_err());
  }

  #[test]
  fn unconfigured_service_is_disabled() {
    let svc = TextService::from_config(&AiServiceConfig::default(), Duration::from_secs(1)).unwrap();
    assert!(matches!(svc, TextService::Disabled(_)));
  }
}
