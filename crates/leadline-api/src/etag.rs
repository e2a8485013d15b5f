//! ETags for leads.
//!
//! An ETag is a SHA-256 hash over the lead id and its version, so it changes
//! exactly when a patch is applied. Interactions and score writes do not bump
//! the version and therefore leave the ETag alone.

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use leadline_core::lead::Lead;

pub fn lead_etag(lead: &Lead) -> String { compute_etag(lead.lead_id, lead.version) }

pub fn compute_etag(lead_id: Uuid, version: u64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(lead_id.as_bytes());
  hasher.update(version.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// The `If-Match` value, if one was sent.
pub fn if_match(headers: &HeaderMap) -> Option<&str> {
  headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Compare ETags, accepting values with or without the surrounding quotes.
/// `*` matches whatever the current version is.
pub fn etag_matches(current: &str, sent: &str) -> bool {
  let sent = sent.trim();
  sent == "*" || strip_etag_quotes(current) == strip_etag_quotes(sent)
}

fn strip_etag_quotes(s: &str) -> &str { s.trim_start_matches("W/").trim_matches('"') }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn version_bump_changes_etag() {
    let id = Uuid::new_v4();
    assert_eq!(compute_etag(id, 3), compute_etag(id, 3));
    assert_ne!(compute_etag(id, 3), compute_etag(id, 4));
    assert_ne!(compute_etag(id, 3), compute_etag(Uuid::new_v4(), 3));
  }

  #[test]
  fn quotes_are_optional() {
    let tag = compute_etag(Uuid::nil(), 1);
    assert!(etag_matches(&tag, tag.trim_matches('"')));
    assert!(etag_matches(&tag, &format!("W/{tag}")));
    assert!(!etag_matches(&tag, "\"stale\""));
  }

  #[test]
  fn wildcard_matches_any_version() {
    assert!(etag_matches(&compute_etag(Uuid::nil(), 7), "*"));
    assert!(etag_matches(&compute_etag(Uuid::new_v4(), 1), " * "));
  }
}
