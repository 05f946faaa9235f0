//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar days are `YYYY-MM-DD`. Vote
//! snapshots inside rejections are compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};
use omega_core::{
  article::{CanonicalArticle, Rejection, RejectionReason},
  factor::{DailyFactor, FactorRow},
  fusion::Alpha,
  quant::{PriceBar, QuantFactors},
  sentiment::DailySentiment,
  vote::{Vote, VoteSnapshot},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Counters ────────────────────────────────────────────────────────────────

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Vote snapshots ──────────────────────────────────────────────────────────

pub fn encode_snapshot(votes: &[VoteSnapshot]) -> Result<String> {
  Ok(serde_json::to_string(votes)?)
}

pub fn decode_snapshot(s: &str) -> Result<Vec<VoteSnapshot>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const VOTE_COLUMNS: &str =
  "vote_id, url, asset, model, relevance, sentiment, summary, voted_at, article_id";

/// Raw values read directly from a `votes` row.
pub struct RawVote {
  pub vote_id:    String,
  pub url:        String,
  pub asset:      String,
  pub model:      String,
  pub relevance:  bool,
  pub sentiment:  Option<f64>,
  pub summary:    Option<String>,
  pub voted_at:   String,
  pub article_id: Option<String>,
}

impl RawVote {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      vote_id:    row.get(0)?,
      url:        row.get(1)?,
      asset:      row.get(2)?,
      model:      row.get(3)?,
      relevance:  row.get(4)?,
      sentiment:  row.get(5)?,
      summary:    row.get(6)?,
      voted_at:   row.get(7)?,
      article_id: row.get(8)?,
    })
  }

  pub fn into_vote(self) -> Result<Vote> {
    Ok(Vote {
      vote_id:    decode_uuid(&self.vote_id)?,
      url:        self.url,
      asset:      self.asset,
      model:      self.model,
      relevance:  self.relevance,
      sentiment:  self.sentiment,
      summary:    self.summary,
      voted_at:   decode_dt(&self.voted_at)?,
      article_id: self.article_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}

pub const ARTICLE_COLUMNS: &str =
  "article_id, url, asset, published_at, summary, sentiment, domain, provenance, ingested_at";

/// Raw values read directly from an `articles` row.
pub struct RawArticle {
  pub article_id:   String,
  pub url:          String,
  pub asset:        String,
  pub published_at: String,
  pub summary:      String,
  pub sentiment:    Option<f64>,
  pub domain:       Option<String>,
  pub provenance:   String,
  pub ingested_at:  String,
}

impl RawArticle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      article_id:   row.get(0)?,
      url:          row.get(1)?,
      asset:        row.get(2)?,
      published_at: row.get(3)?,
      summary:      row.get(4)?,
      sentiment:    row.get(5)?,
      domain:       row.get(6)?,
      provenance:   row.get(7)?,
      ingested_at:  row.get(8)?,
    })
  }

  pub fn into_article(self) -> Result<CanonicalArticle> {
    Ok(CanonicalArticle {
      article_id:   decode_uuid(&self.article_id)?,
      url:          self.url,
      asset:        self.asset,
      published_at: decode_dt(&self.published_at)?,
      summary:      self.summary,
      sentiment:    self.sentiment,
      domain:       self.domain,
      provenance:   self.provenance,
      ingested_at:  decode_dt(&self.ingested_at)?,
    })
  }
}

/// Raw values read directly from a `rejections` row.
pub struct RawRejection {
  pub rejection_id: String,
  pub url:          String,
  pub asset:        String,
  pub reason:       String,
  pub votes_json:   String,
  pub created_at:   String,
}

impl RawRejection {
  pub fn into_rejection(self) -> Result<Rejection> {
    Ok(Rejection {
      rejection_id: decode_uuid(&self.rejection_id)?,
      url:          self.url,
      asset:        self.asset,
      reason:       self.reason.parse::<RejectionReason>()?,
      votes:        decode_snapshot(&self.votes_json)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const PRICE_COLUMNS: &str =
  "asset, provider, currency, date, open, high, low, close, volume, market_cap";

/// Raw values read directly from a `price_bars` row.
pub struct RawPriceBar {
  pub asset:      String,
  pub provider:   String,
  pub currency:   String,
  pub date:       String,
  pub open:       Option<f64>,
  pub high:       Option<f64>,
  pub low:        Option<f64>,
  pub close:      f64,
  pub volume:     Option<f64>,
  pub market_cap: Option<f64>,
}

impl RawPriceBar {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      asset:      row.get(0)?,
      provider:   row.get(1)?,
      currency:   row.get(2)?,
      date:       row.get(3)?,
      open:       row.get(4)?,
      high:       row.get(5)?,
      low:        row.get(6)?,
      close:      row.get(7)?,
      volume:     row.get(8)?,
      market_cap: row.get(9)?,
    })
  }

  pub fn into_bar(self) -> Result<PriceBar> {
    Ok(PriceBar {
      asset:      self.asset,
      provider:   self.provider,
      currency:   self.currency,
      date:       decode_date(&self.date)?,
      open:       self.open,
      high:       self.high,
      low:        self.low,
      close:      self.close,
      volume:     self.volume,
      market_cap: self.market_cap,
    })
  }
}

/// Raw values read directly from a `daily_sentiment` row.
pub struct RawSentiment {
  pub asset:                   String,
  pub date:                    String,
  pub weighted_mean_sentiment: Option<f64>,
  pub article_count:           i64,
}

impl RawSentiment {
  pub fn into_sentiment(self) -> Result<DailySentiment> {
    Ok(DailySentiment {
      asset:                   self.asset,
      date:                    decode_date(&self.date)?,
      weighted_mean_sentiment: self.weighted_mean_sentiment,
      article_count:           u32::try_from(self.article_count).unwrap_or(0),
    })
  }
}

pub const FACTOR_COLUMNS: &str = "asset, date, ret_1d, vol_30d, sharpe_30d, sortino_30d, \
   var_1d_95, exp_return_30d, sentiment_mean, sentiment_norm, p_alpha, alpha, \
   created_at, updated_at";

/// Raw values read directly from a `daily_factors` row. The stored `p_omega`
/// column is not read.
pub struct RawFactor {
  pub asset:          String,
  pub date:           String,
  pub ret_1d:         Option<f64>,
  pub vol_30d:        Option<f64>,
  pub sharpe_30d:     Option<f64>,
  pub sortino_30d:    Option<f64>,
  pub var_1d_95:      Option<f64>,
  pub exp_return_30d: Option<f64>,
  pub sentiment_mean: Option<f64>,
  pub sentiment_norm: Option<f64>,
  pub p_alpha:        Option<f64>,
  pub alpha:          f64,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawFactor {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      asset:          row.get(0)?,
      date:           row.get(1)?,
      ret_1d:         row.get(2)?,
      vol_30d:        row.get(3)?,
      sharpe_30d:     row.get(4)?,
      sortino_30d:    row.get(5)?,
      var_1d_95:      row.get(6)?,
      exp_return_30d: row.get(7)?,
      sentiment_mean: row.get(8)?,
      sentiment_norm: row.get(9)?,
      p_alpha:        row.get(10)?,
      alpha:          row.get(11)?,
      created_at:     row.get(12)?,
      updated_at:     row.get(13)?,
    })
  }

  /// Rebuild the factor through [`DailyFactor::new`], so `p_omega` is
  /// recomputed rather than trusted.
  pub fn into_factor(self) -> Result<DailyFactor> {
    let row = FactorRow {
      asset:          self.asset,
      quant:          QuantFactors {
        date:           decode_date(&self.date)?,
        ret_1d:         self.ret_1d,
        vol_30d:        self.vol_30d,
        sharpe_30d:     self.sharpe_30d,
        sortino_30d:    self.sortino_30d,
        var_1d_95:      self.var_1d_95,
        exp_return_30d: self.exp_return_30d,
      },
      sentiment_mean: self.sentiment_mean,
      sentiment_norm: self.sentiment_norm,
      p_alpha:        self.p_alpha,
      alpha:          Alpha::new(self.alpha)?,
    };
    Ok(DailyFactor::new(row, decode_dt(&self.created_at)?, decode_dt(&self.updated_at)?))
  }
}
