//! Handlers for `/leads` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/leads` | Body: [`CreateBody`]; returns 201 + `ETag` |
//! | `GET`   | `/leads` | Optional `status` (comma-separated), `created_after`, `created_before`, `order`, `cursor`, `limit` |
//! | `GET`   | `/leads/{id}` | Returns `ETag` |
//! | `PATCH` | `/leads/{id}` | `If-Match` or body `version` required |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use leadline_core::{
  lead::{ContactChannels, Lead, LeadPatch, LeadSource, LeadStatus, NewLead, PropertyInterest},
  store::{LeadCursor, LeadOrder, LeadPage, LeadQuery, LeadStore},
};
use leadline_engine::{Engine, TextUnderstanding};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  agent::Agent,
  error::ApiError,
  etag::{etag_matches, if_match, lead_etag},
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /leads`. The agent comes from the header.
#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:     String,
  #[serde(default)]
  pub contact:  ContactChannels,
  #[serde(default)]
  pub notes:    String,
  #[serde(default)]
  pub interest: PropertyInterest,
  #[serde(default)]
  pub source:   LeadSource,
}

/// `POST /leads`
pub async fn create<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let input = NewLead {
    agent_id: agent,
    name:     body.name,
    contact:  body.contact,
    notes:    body.notes,
    interest: body.interest,
    source:   body.source,
  };
  let lead = engine.create_lead(input).await?;
  Ok((StatusCode::CREATED, [(header::ETAG, lead_etag(&lead))], Json(lead)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Comma-separated statuses, e.g. `new,contacted`.
  pub status:         Option<String>,
  pub created_after:  Option<DateTime<Utc>>,
  pub created_before: Option<DateTime<Utc>>,
  #[serde(default)]
  pub order:          LeadOrder,
  /// Opaque cursor from a previous page's `next`.
  pub cursor:         Option<String>,
  pub limit:          Option<usize>,
}

impl ListParams {
  fn into_query(self) -> Result<LeadQuery, ApiError> {
    let statuses = match &self.status {
      Some(raw) => raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<LeadStatus>().map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?,
      None => Vec::new(),
    };
    let after = self
      .cursor
      .as_deref()
      .map(str::parse::<LeadCursor>)
      .transpose()
      .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let defaults = LeadQuery::default();
    Ok(LeadQuery {
      statuses,
      created_after: self.created_after,
      created_before: self.created_before,
      order: self.order,
      after,
      limit: self.limit.unwrap_or(defaults.limit),
    })
  }
}

/// `GET /leads`
pub async fn list<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Query(params): Query<ListParams>,
) -> Result<Json<LeadPage>, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let query = params.into_query()?;
  Ok(Json(engine.list_leads(&agent, &query).await?))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /leads/{id}`
pub async fn get_one<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let lead = engine.get_lead(&agent, id).await?;
  Ok(([(header::ETAG, lead_etag(&lead))], Json(lead)))
}

// ─── Patch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PatchBody {
  /// Version token; may be omitted when `If-Match` is sent.
  pub version:  Option<u64>,
  pub status:   Option<LeadStatus>,
  pub notes:    Option<String>,
  pub interest: Option<PropertyInterest>,
}

/// `PATCH /leads/{id}`
///
/// A stale `If-Match` or `version` is a 409 carrying the current version.
pub async fn patch<S, T>(
  State(engine): State<Engine<S, T>>,
  Agent(agent): Agent,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<PatchBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  let expected = match (if_match(&headers), body.version) {
    (Some(tag), _) => {
      let current = engine.get_lead(&agent, id).await?;
      if !etag_matches(&lead_etag(&current), tag) {
        return Err(leadline_engine::Error::Conflict { current_version: current.version }.into());
      }
      current.version
    }
    (None, Some(version)) => version,
    (None, None) => {
      return Err(ApiError::BadRequest("send If-Match or a body version".into()));
    }
  };

  let patch = LeadPatch { status: body.status, notes: body.notes, interest: body.interest };
  let lead: Lead = engine.patch_lead(&agent, id, expected, patch).await?;
  Ok(([(header::ETAG, lead_etag(&lead))], Json(lead)))
}
