//! Consensus aggregation: reduce every vote for one (URL, asset) into a single
//! accept/reject decision.
//!
//! The aggregator is a pure function of the vote set. Persistence, and the
//! guarantee that an accepted subject never gets a second canonical article,
//! live in [`crate::engine`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  article::{NewCanonicalArticle, NewRejection, RejectionReason, source_domain},
  stats::{mean, round2},
  vote::{Vote, VoteSnapshot},
};

/// Tunables for [`aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
  /// Fewer distinct model votes than this yields `insufficient-votes`.
  pub min_votes:        usize,
  /// The share of relevant votes must be strictly greater than this.
  /// `0.5` is a simple majority where ties reject.
  pub relevance_quorum: f64,
}

impl Default for ConsensusPolicy {
  fn default() -> Self {
    Self {
      min_votes:        2,
      relevance_quorum: 0.5,
    }
  }
}

/// The outcome of consensus for one subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
  Accept(NewCanonicalArticle),
  Reject(NewRejection),
}

impl Decision {
  pub fn is_accept(&self) -> bool { matches!(self, Self::Accept(_)) }
}

/// Aggregate the votes for `(url, asset)`.
///
/// Votes for other subjects are ignored. When a model voted more than once,
/// only its earliest vote counts.
pub fn aggregate(
  policy: &ConsensusPolicy,
  url: &str,
  asset: &str,
  published_at: DateTime<Utc>,
  votes: &[Vote],
) -> Decision {
  // BTreeMap keeps the model order stable, which fixes the summary pick and
  // the provenance label.
  let mut by_model: BTreeMap<&str, &Vote> = BTreeMap::new();
  for v in votes.iter().filter(|v| v.url == url && v.asset == asset) {
    by_model
      .entry(v.model.as_str())
      .and_modify(|cur| {
        if v.voted_at < cur.voted_at {
          *cur = v;
        }
      })
      .or_insert(v);
  }

  let snapshot: Vec<VoteSnapshot> = by_model.values().map(|v| VoteSnapshot::from(*v)).collect();
  let reject = |reason| {
    Decision::Reject(NewRejection {
      url: url.to_owned(),
      asset: asset.to_owned(),
      reason,
      votes: snapshot.clone(),
    })
  };

  let total = by_model.len();
  if total == 0 || total < policy.min_votes {
    return reject(RejectionReason::InsufficientVotes);
  }

  let relevant: Vec<&Vote> = by_model.values().copied().filter(|v| v.relevance).collect();
  let share = relevant.len() as f64 / total as f64;
  if share <= policy.relevance_quorum {
    return reject(RejectionReason::NotRelevant);
  }

  let sentiments: Vec<f64> = relevant.iter().filter_map(|v| v.sentiment).collect();
  let sentiment = mean(&sentiments).map(round2);

  let summary = relevant
    .iter()
    .find_map(|v| v.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .unwrap_or_default()
    .to_owned();

  let models: Vec<&str> = by_model.keys().copied().collect();

  Decision::Accept(NewCanonicalArticle {
    url: url.to_owned(),
    asset: asset.to_owned(),
    published_at,
    summary,
    sentiment,
    domain: source_domain(url),
    provenance: format!("ensemble[{}]", models.join(",")),
  })
}
