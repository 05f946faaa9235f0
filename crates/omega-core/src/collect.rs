//! Vote collection from an ensemble of independent voters.
//!
//! A [`Voter`] wraps one scoring model. The [`VoteCollector`] asks every voter
//! about a [`Candidate`] concurrently, respecting a per-model rate limit, and
//! returns whatever answers arrived before the subject's deadline. Failed or
//! late voters contribute nothing; they are logged and never retried.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::{Mutex, Semaphore},
  task::JoinSet,
  time::Instant,
};
use tracing::{debug, warn};

use crate::{config::CollectConfig, vote::NewVote};

// ─── Voter ───────────────────────────────────────────────────────────────────

/// One article to be judged for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub url:          String,
  pub asset:        String,
  pub published_at: DateTime<Utc>,
  pub title:        String,
  pub text:         String,
}

/// A voter's raw judgment, before ledger normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VoterAnswer {
  pub relevance: bool,
  pub sentiment: Option<f64>,
  pub summary:   Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VoterError {
  #[error("request failed: {0}")]
  Request(String),

  #[error("malformed answer: {0}")]
  Malformed(String),
}

/// A sentiment/relevance scoring model.
#[async_trait]
pub trait Voter: Send + Sync {
  /// Stable model name recorded with every vote.
  fn model(&self) -> &str;

  async fn vote(&self, candidate: &Candidate) -> Result<VoterAnswer, VoterError>;
}

// ─── Rate limiter ────────────────────────────────────────────────────────────

/// Enforces a minimum spacing of `60s / rpm` between calls.
#[derive(Debug)]
pub struct RateLimiter {
  interval: Duration,
  next:     Mutex<Instant>,
}

impl RateLimiter {
  pub fn per_minute(rpm: u32) -> Self {
    Self {
      interval: Duration::from_secs(60) / rpm.max(1),
      next:     Mutex::new(Instant::now()),
    }
  }

  /// Claim the next free slot and wait for it, provided it starts before
  /// `deadline`. Returns `false` without claiming anything otherwise, so a
  /// caller that would miss its deadline never holds up later callers.
  pub async fn acquire_before(&self, deadline: Instant) -> bool {
    let slot = {
      let mut next = self.next.lock().await;
      let slot = (*next).max(Instant::now());
      if slot >= deadline {
        return false;
      }
      *next = slot + self.interval;
      slot
    };
    tokio::time::sleep_until(slot).await;
    true
  }
}

// ─── Collector ───────────────────────────────────────────────────────────────

struct Seat {
  voter:   Arc<dyn Voter>,
  limiter: Arc<RateLimiter>,
}

/// Fans a candidate out to every voter under a deadline.
pub struct VoteCollector {
  seats:    Vec<Seat>,
  workers:  Arc<Semaphore>,
  deadline: Duration,
}

impl VoteCollector {
  pub fn new(voters: Vec<Arc<dyn Voter>>, config: &CollectConfig) -> Self {
    let seats = voters
      .into_iter()
      .map(|voter| Seat {
        voter,
        limiter: Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute)),
      })
      .collect();
    Self {
      seats,
      workers: Arc::new(Semaphore::new(config.workers.max(1))),
      deadline: Duration::from_secs(config.vote_timeout_secs),
    }
  }

  /// Ask every voter about `candidate` and return the normalized votes that
  /// arrived before the deadline.
  pub async fn collect(&self, candidate: &Candidate) -> Vec<NewVote> {
    let deadline = Instant::now() + self.deadline;
    let mut pending: HashSet<String> = HashSet::new();
    let mut set = JoinSet::new();

    for seat in &self.seats {
      let voter = Arc::clone(&seat.voter);
      let limiter = Arc::clone(&seat.limiter);
      let c = candidate.clone();
      pending.insert(voter.model().to_owned());
      set.spawn(async move {
        let answer = if limiter.acquire_before(deadline).await {
          Some(voter.vote(&c).await)
        } else {
          None
        };
        (voter.model().to_owned(), answer)
      });
    }

    let mut votes = Vec::with_capacity(self.seats.len());
    loop {
      let next = tokio::time::timeout_at(deadline, set.join_next()).await;
      match next {
        Ok(None) => break,
        Ok(Some(Ok((model, Some(Ok(answer)))))) => {
          debug!(url = %candidate.url, %model, relevance = answer.relevance, "vote received");
          pending.remove(&model);
          votes.push(NewVote::normalized(
            candidate.url.clone(),
            candidate.asset.clone(),
            model,
            answer.relevance,
            answer.sentiment,
            answer.summary,
            Utc::now(),
          ));
        }
        Ok(Some(Ok((model, Some(Err(e)))))) => {
          warn!(url = %candidate.url, %model, error = %e, "voter failed");
          pending.remove(&model);
        }
        Ok(Some(Ok((model, None)))) => {
          warn!(url = %candidate.url, %model, "no rate-limit slot before deadline");
          pending.remove(&model);
        }
        Ok(Some(Err(e))) => {
          warn!(url = %candidate.url, error = %e, "voter task aborted");
        }
        Err(_) => {
          let mut late: Vec<&str> = pending.iter().map(String::as_str).collect();
          late.sort_unstable();
          warn!(url = %candidate.url, models = ?late, "vote deadline elapsed");
          set.abort_all();
          break;
        }
      }
    }
    votes
  }

  /// Collect votes for many candidates, at most `workers` at a time.
  /// Results come back in input order.
  pub async fn collect_batch(
    self: &Arc<Self>,
    candidates: Vec<Candidate>,
  ) -> Vec<(Candidate, Vec<NewVote>)> {
    let mut set = JoinSet::new();
    for (i, candidate) in candidates.into_iter().enumerate() {
      let this = Arc::clone(self);
      set.spawn(async move {
        // The semaphore is never closed.
        let _permit = this.workers.acquire().await.ok();
        let votes = this.collect(&candidate).await;
        (i, candidate, votes)
      });
    }

    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok(item) => out.push(item),
        Err(e) => warn!(error = %e, "collection task aborted"),
      }
    }
    out.sort_by_key(|(i, ..)| *i);
    out.into_iter().map(|(_, c, v)| (c, v)).collect()
  }
}
