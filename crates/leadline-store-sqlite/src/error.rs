//! Error type for `leadline-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] leadline_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("database schema version {found} is newer than supported version {supported}")]
  UnsupportedSchema { found: i64, supported: i64 },

  /// A score or sequence was written for a lead that does not exist.
  #[error("lead not found: {0}")]
  LeadNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
