//! Canonical articles and rejections: the two possible outcomes of
//! consensus for a (URL, asset) pair.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, vote::VoteSnapshot};

// ─── CanonicalArticle ────────────────────────────────────────────────────────

/// The single accepted, summarised article for a (URL, asset) pair.
/// Created once; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalArticle {
  pub article_id:   Uuid,
  pub url:          String,
  pub asset:        String,
  pub published_at: DateTime<Utc>,
  pub summary:      String,
  pub sentiment:    Option<f64>,
  /// Lowercase host of `url`, e.g. `"www.coindesk.com"`.
  pub domain:       Option<String>,
  /// Which models took part, e.g. `"ensemble[gpt,gemini,grok]"`.
  pub provenance:   String,
  pub ingested_at:  DateTime<Utc>,
}

/// Input to [`crate::store::FactorStore::insert_article`]. Identity and
/// `ingested_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCanonicalArticle {
  pub url:          String,
  pub asset:        String,
  pub published_at: DateTime<Utc>,
  pub summary:      String,
  pub sentiment:    Option<f64>,
  pub domain:       Option<String>,
  pub provenance:   String,
}

/// Extract the lowercase host from an article URL.
pub fn source_domain(url: &str) -> Option<String> {
  url::Url::parse(url)
    .ok()?
    .host_str()
    .map(str::to_ascii_lowercase)
    .filter(|h| !h.is_empty())
}

// ─── Rejection ───────────────────────────────────────────────────────────────

/// Why a subject failed consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
  /// Fewer usable votes than the configured minimum arrived in time.
  InsufficientVotes,
  /// The voters did not reach a relevance majority.
  NotRelevant,
}

impl RejectionReason {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::InsufficientVotes => "insufficient-votes",
      Self::NotRelevant => "not-relevant",
    }
  }
}

impl fmt::Display for RejectionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RejectionReason {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "insufficient-votes" => Ok(Self::InsufficientVotes),
      "not-relevant" => Ok(Self::NotRelevant),
      other => Err(Error::UnknownRejectionReason(other.to_owned())),
    }
  }
}

/// Append-only audit record of a failed consensus. Never consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
  pub rejection_id: Uuid,
  pub url:          String,
  pub asset:        String,
  pub reason:       RejectionReason,
  pub votes:        Vec<VoteSnapshot>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::FactorStore::record_rejection`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRejection {
  pub url:    String,
  pub asset:  String,
  pub reason: RejectionReason,
  pub votes:  Vec<VoteSnapshot>,
}
