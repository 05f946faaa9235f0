//! The `FactorStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `omega-store-sqlite`).
//! The engine and the HTTP layer depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  article::{CanonicalArticle, NewCanonicalArticle, NewRejection, Rejection},
  domain::DomainStat,
  factor::{DailyFactor, FactorRow},
  quant::PriceBar,
  sentiment::DailySentiment,
  vote::{NewVote, Vote},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// An inclusive range of calendar days. `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct DateRange {
  from: NaiveDate,
  to:   NaiveDate,
}

#[derive(Deserialize)]
struct RawRange {
  from: NaiveDate,
  to:   NaiveDate,
}

impl TryFrom<RawRange> for DateRange {
  type Error = Error;

  fn try_from(raw: RawRange) -> Result<Self> { Self::new(raw.from, raw.to) }
}

impl DateRange {
  pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
    if from > to {
      return Err(Error::InvalidRange { from, to });
    }
    Ok(Self { from, to })
  }

  pub fn from(&self) -> NaiveDate { self.from }

  pub fn to(&self) -> NaiveDate { self.to }

  pub fn contains(&self, date: NaiveDate) -> bool { self.from <= date && date <= self.to }

  /// The same range with `from` moved back by `days`.
  pub fn extend_back(&self, days: u32) -> Self {
    Self {
      from: self
        .from
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN),
      to:   self.to,
    }
  }

  /// Every calendar day in the range, ascending.
  pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
    let to = self.to;
    self.from.iter_days().take_while(move |d| *d <= to)
  }
}

/// Row accounting for an upsert batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpsertCounts {
  pub inserted: usize,
  pub updated:  usize,
}

impl UpsertCounts {
  pub fn total(&self) -> usize { self.inserted + self.updated }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a fusion-engine store backend.
///
/// Votes, canonical articles and rejections are append-only. Daily sentiment
/// and factor rows are replaced whole per (asset, date); a replace never
/// changes a row's `created_at`.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait FactorStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Votes ─────────────────────────────────────────────────────────────

  /// Record a vote. A second vote from the same model for the same
  /// (URL, asset) is ignored and the stored one returned. A vote arriving
  /// after the subject was accepted is linked to the canonical article.
  fn record_vote(
    &self,
    vote: NewVote,
  ) -> impl Future<Output = Result<Vote, Self::Error>> + Send + '_;

  /// All votes for one (URL, asset), oldest first.
  fn votes_for(
    &self,
    url: String,
    asset: String,
  ) -> impl Future<Output = Result<Vec<Vote>, Self::Error>> + Send + '_;

  // ── Canonical articles ────────────────────────────────────────────────

  fn find_article(
    &self,
    url: String,
    asset: String,
  ) -> impl Future<Output = Result<Option<CanonicalArticle>, Self::Error>> + Send + '_;

  /// Insert the canonical article for a subject, or return the existing one.
  ///
  /// The boolean is `true` when this call created the row. On creation, all
  /// votes for the subject are linked to the new article id.
  fn insert_article(
    &self,
    article: NewCanonicalArticle,
  ) -> impl Future<Output = Result<(CanonicalArticle, bool), Self::Error>> + Send + '_;

  /// Articles for `asset` whose publication date falls in `range`.
  fn articles_for(
    &self,
    asset: String,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<CanonicalArticle>, Self::Error>> + Send + '_;

  // ── Rejections ────────────────────────────────────────────────────────

  fn record_rejection(
    &self,
    rejection: NewRejection,
  ) -> impl Future<Output = Result<Rejection, Self::Error>> + Send + '_;

  fn rejections_for(
    &self,
    url: String,
    asset: String,
  ) -> impl Future<Output = Result<Vec<Rejection>, Self::Error>> + Send + '_;

  // ── Domain statistics ─────────────────────────────────────────────────

  /// Write the harvesting side's counters for one (asset, domain). Counters
  /// never move backwards.
  fn record_domain_stat(
    &self,
    stat: DomainStat,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn domain_stats(
    &self,
    asset: String,
  ) -> impl Future<Output = Result<Vec<DomainStat>, Self::Error>> + Send + '_;

  // ── Prices ────────────────────────────────────────────────────────────

  /// Insert or replace bars keyed by (asset, provider, currency, date).
  fn upsert_price_bars(
    &self,
    bars: Vec<PriceBar>,
  ) -> impl Future<Output = Result<UpsertCounts, Self::Error>> + Send + '_;

  /// Every bar for `asset` in `currency` dated on or before `until`, ordered
  /// by date then provider.
  fn price_bars(
    &self,
    asset: String,
    currency: String,
    until: NaiveDate,
  ) -> impl Future<Output = Result<Vec<PriceBar>, Self::Error>> + Send + '_;

  // ── Daily sentiment ───────────────────────────────────────────────────

  fn upsert_daily_sentiment(
    &self,
    rows: Vec<DailySentiment>,
  ) -> impl Future<Output = Result<UpsertCounts, Self::Error>> + Send + '_;

  fn daily_sentiment(
    &self,
    asset: String,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<DailySentiment>, Self::Error>> + Send + '_;

  // ── Factors ───────────────────────────────────────────────────────────

  /// The only write path for factor rows. The whole batch is written in one
  /// transaction; `p_omega` is derived, never accepted from the caller.
  fn upsert_factors(
    &self,
    rows: Vec<FactorRow>,
  ) -> impl Future<Output = Result<UpsertCounts, Self::Error>> + Send + '_;

  /// Write one recompute's daily sentiment and factor rows in a single
  /// transaction: either both batches land or neither does. Returns the
  /// sentiment counts, then the factor counts.
  fn upsert_recompute(
    &self,
    sentiment: Vec<DailySentiment>,
    factors: Vec<FactorRow>,
  ) -> impl Future<Output = Result<(UpsertCounts, UpsertCounts), Self::Error>> + Send + '_;

  fn factors(
    &self,
    asset: String,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<DailyFactor>, Self::Error>> + Send + '_;

  fn factor(
    &self,
    asset: String,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<DailyFactor>, Self::Error>> + Send + '_;
}
