//! Votes: one voter's judgment about one (URL, asset) pair.
//!
//! Votes are the audit trail of the consensus process. They are immutable
//! once recorded and are never deleted, whatever the consensus outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stats::round2;

// ─── Vote ────────────────────────────────────────────────────────────────────

/// A persisted vote.
///
/// A vote is addressed by its URL until the subject is accepted; from then on
/// `article_id` links it to the canonical article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
  pub vote_id:    Uuid,
  pub url:        String,
  pub asset:      String,
  pub model:      String,
  pub relevance:  bool,
  /// In `[-1, 1]`; always `None` when `relevance` is `false`.
  pub sentiment:  Option<f64>,
  pub summary:    Option<String>,
  pub voted_at:   DateTime<Utc>,
  pub article_id: Option<Uuid>,
}

// ─── NewVote ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::FactorStore::record_vote`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVote {
  pub url:       String,
  pub asset:     String,
  pub model:     String,
  pub relevance: bool,
  pub sentiment: Option<f64>,
  pub summary:   Option<String>,
  pub voted_at:  DateTime<Utc>,
}

impl NewVote {
  /// Build a vote from a raw voter answer, applying the ledger rules:
  /// sentiment is clamped to `[-1, 1]` and rounded to two decimals, and is
  /// dropped entirely for irrelevant votes. Blank summaries become `None`.
  pub fn normalized(
    url: impl Into<String>,
    asset: impl Into<String>,
    model: impl Into<String>,
    relevance: bool,
    sentiment: Option<f64>,
    summary: Option<String>,
    voted_at: DateTime<Utc>,
  ) -> Self {
    let sentiment = sentiment
      .filter(|s| relevance && s.is_finite())
      .map(|s| round2(s.clamp(-1.0, 1.0)));
    let summary = summary
      .map(|s| s.trim().to_owned())
      .filter(|s| !s.is_empty());
    Self {
      url: url.into(),
      asset: asset.into(),
      model: model.into(),
      relevance,
      sentiment,
      summary,
      voted_at,
    }
  }

  /// Re-apply the ledger rules of [`NewVote::normalized`] to a vote built by
  /// hand. Idempotent.
  pub fn normalize(self) -> Self {
    Self::normalized(
      self.url,
      self.asset,
      self.model,
      self.relevance,
      self.sentiment,
      self.summary,
      self.voted_at,
    )
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Compact form of a vote kept inside a rejection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSnapshot {
  pub model:     String,
  pub relevance: bool,
  pub sentiment: Option<f64>,
}

impl From<&Vote> for VoteSnapshot {
  fn from(v: &Vote) -> Self {
    Self {
      model:     v.model.clone(),
      relevance: v.relevance,
      sentiment: v.sentiment,
    }
  }
}
