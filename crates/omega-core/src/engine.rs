//! The fusion engine: settles consensus for collected votes and recomputes the
//! daily sentiment and factor rows of an asset.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  article::{CanonicalArticle, Rejection},
  collect::{Candidate, VoteCollector},
  config::EngineConfig,
  consensus::{Decision, aggregate},
  domain::{DomainWeight, WeightTable, domain_weights},
  factor::{DailyFactor, FactorRow},
  fusion::p_alpha_series,
  normalize::{NormPoint, normalize_series},
  quant::{FactorComputer, PriceBar},
  sentiment::{DailySentiment, compose_daily},
  store::{DateRange, FactorStore},
  vote::{NewVote, Vote},
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// The outcome of [`FusionEngine::settle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
  /// This run created the canonical article.
  Accepted(CanonicalArticle),
  /// The subject had already been accepted; nothing was changed.
  AlreadyAccepted(CanonicalArticle),
  Rejected(Rejection),
}

impl Settlement {
  pub fn article(&self) -> Option<&CanonicalArticle> {
    match self {
      Self::Accepted(a) | Self::AlreadyAccepted(a) => Some(a),
      Self::Rejected(_) => None,
    }
  }
}

/// Row accounting for one [`FusionEngine::recompute`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeReport {
  pub asset:            String,
  pub from:             NaiveDate,
  pub to:               NaiveDate,
  /// Price-bar days in range for which a factor row was written.
  pub days_processed:   usize,
  pub factors_inserted: usize,
  pub factors_updated:  usize,
  pub sentiment_days:   usize,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct FusionEngine<S> {
  store:  Arc<S>,
  config: EngineConfig,
  locks:  Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: FactorStore> FusionEngine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { store, config, locks: Mutex::new(HashMap::new()) })
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  async fn asset_lock(&self, asset: &str) -> Arc<Mutex<()>> {
    let mut locks = self.locks.lock().await;
    Arc::clone(locks.entry(asset.to_owned()).or_default())
  }

  // ── Consensus ─────────────────────────────────────────────────────────

  pub async fn record_vote(&self, vote: NewVote) -> Result<Vote> {
    self.store.record_vote(vote).await.map_err(Error::store)
  }

  /// Reach a decision for `(url, asset)` from every vote recorded so far.
  ///
  /// An accepted subject is final: later calls return
  /// [`Settlement::AlreadyAccepted`] without looking at the votes again.
  /// A rejection is recorded for every run that rejects.
  pub async fn settle(
    &self,
    url: &str,
    asset: &str,
    published_at: DateTime<Utc>,
  ) -> Result<Settlement> {
    if let Some(existing) = self
      .store
      .find_article(url.to_owned(), asset.to_owned())
      .await
      .map_err(Error::store)?
    {
      return Ok(Settlement::AlreadyAccepted(existing));
    }

    let votes = self
      .store
      .votes_for(url.to_owned(), asset.to_owned())
      .await
      .map_err(Error::store)?;

    match aggregate(&self.config.consensus, url, asset, published_at, &votes) {
      Decision::Accept(article) => {
        let (article, created) = self.store.insert_article(article).await.map_err(Error::store)?;
        if created {
          info!(
            %url, %asset,
            article_id = %article.article_id,
            sentiment = ?article.sentiment,
            votes = votes.len(),
            "subject accepted"
          );
          Ok(Settlement::Accepted(article))
        } else {
          Ok(Settlement::AlreadyAccepted(article))
        }
      }
      Decision::Reject(rejection) => {
        let rejection = self.store.record_rejection(rejection).await.map_err(Error::store)?;
        info!(%url, %asset, reason = %rejection.reason, votes = votes.len(), "subject rejected");
        Ok(Settlement::Rejected(rejection))
      }
    }
  }

  /// Collect votes for every candidate, record them, and settle each
  /// subject. A failure to persist one subject does not stop the others.
  pub async fn collect_and_settle(
    &self,
    collector: &Arc<VoteCollector>,
    candidates: Vec<Candidate>,
  ) -> Vec<(Candidate, Result<Settlement>)> {
    let collected = collector.collect_batch(candidates).await;
    let mut out = Vec::with_capacity(collected.len());
    for (candidate, votes) in collected {
      let result = self.record_and_settle(&candidate, votes).await;
      if let Err(e) = &result {
        warn!(url = %candidate.url, asset = %candidate.asset, error = %e, "settlement failed");
      }
      out.push((candidate, result));
    }
    out
  }

  async fn record_and_settle(&self, candidate: &Candidate, votes: Vec<NewVote>) -> Result<Settlement> {
    for vote in votes {
      self.record_vote(vote).await?;
    }
    self.settle(&candidate.url, &candidate.asset, candidate.published_at).await
  }

  // ── Recompute ─────────────────────────────────────────────────────────

  /// Rebuild daily sentiment and factor rows for `asset` over `range`.
  ///
  /// Idempotent: running it twice on unchanged inputs rewrites identical
  /// rows, only `updated_at` moves.
  pub async fn recompute(&self, asset: &str, range: DateRange) -> Result<RecomputeReport> {
    let lock = self.asset_lock(asset).await;
    let _guard = lock.lock().await;

    let cfg = &self.config;

    // One domain-stat snapshot per run.
    let stats = self.store.domain_stats(asset.to_owned()).await.map_err(Error::store)?;
    let weights = domain_weights(&stats);
    let table = WeightTable::from(&weights[..]);

    // Sentiment, with a warm-up window ahead of the range for normalization.
    let warm = range.extend_back(cfg.sentiment_window_days);
    let articles = self
      .store
      .articles_for(asset.to_owned(), warm)
      .await
      .map_err(Error::store)?;
    let daily = compose_daily(asset, &articles, &table, warm);
    let points: Vec<NormPoint> = daily
      .iter()
      .map(|d| NormPoint {
        date:          d.date,
        value:         d.weighted_mean_sentiment,
        article_count: d.article_count,
      })
      .collect();
    let normalized = normalize_series(&cfg.norm(), &points);
    let sentiment_by_day: BTreeMap<NaiveDate, (Option<f64>, Option<f64>)> = daily
      .iter()
      .zip(&normalized)
      .map(|(d, n)| (d.date, (d.weighted_mean_sentiment, *n)))
      .collect();

    // Quant factors over the whole history up to the end of the range.
    let mut bars = self
      .store
      .price_bars(asset.to_owned(), cfg.currency.clone(), range.to())
      .await
      .map_err(Error::store)?;
    bars.dedup_by_key(|b: &mut PriceBar| b.date);
    let quant = FactorComputer::compute_series(cfg.quant(), &bars);
    let p_alpha = p_alpha_series(&cfg.p_alpha, &quant, cfg.sentiment_window_days);

    let rows: Vec<FactorRow> = quant
      .into_iter()
      .zip(p_alpha)
      .filter(|(q, _)| range.contains(q.date))
      .map(|(q, p_alpha)| {
        let (sentiment_mean, sentiment_norm) =
          sentiment_by_day.get(&q.date).copied().unwrap_or((None, None));
        debug!(%asset, date = %q.date, ?p_alpha, ?sentiment_norm, "factor row");
        FactorRow {
          asset: asset.to_owned(),
          quant: q,
          sentiment_mean,
          sentiment_norm,
          p_alpha,
          alpha: cfg.alpha,
        }
      })
      .collect();
    let days_processed = rows.len();

    let in_range: Vec<DailySentiment> = daily.into_iter().filter(|d| range.contains(d.date)).collect();
    let (sentiment, factors) = self
      .store
      .upsert_recompute(in_range, rows)
      .await
      .map_err(Error::store)?;

    info!(
      %asset,
      from = %range.from(),
      to = %range.to(),
      days = days_processed,
      inserted = factors.inserted,
      updated = factors.updated,
      domains = weights.len(),
      "recompute finished"
    );

    Ok(RecomputeReport {
      asset: asset.to_owned(),
      from: range.from(),
      to: range.to(),
      days_processed,
      factors_inserted: factors.inserted,
      factors_updated: factors.updated,
      sentiment_days: sentiment.total(),
    })
  }

  // ── Queries ───────────────────────────────────────────────────────────

  pub async fn factors(&self, asset: &str, range: DateRange) -> Result<Vec<DailyFactor>> {
    self.store.factors(asset.to_owned(), range).await.map_err(Error::store)
  }

  pub async fn factor(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyFactor>> {
    self.store.factor(asset.to_owned(), date).await.map_err(Error::store)
  }

  pub async fn daily_sentiment(&self, asset: &str, range: DateRange) -> Result<Vec<DailySentiment>> {
    self
      .store
      .daily_sentiment(asset.to_owned(), range)
      .await
      .map_err(Error::store)
  }

  /// Current trust weights for every domain with statistics for `asset`.
  pub async fn domain_weights(&self, asset: &str) -> Result<Vec<DomainWeight>> {
    let stats = self.store.domain_stats(asset.to_owned()).await.map_err(Error::store)?;
    Ok(domain_weights(&stats))
  }
}

impl<S: FactorStore + 'static> FusionEngine<S> {
  /// Recompute several assets concurrently. Each asset succeeds or fails on
  /// its own; results come back in input order.
  pub async fn recompute_many(
    self: &Arc<Self>,
    assets: Vec<String>,
    range: DateRange,
  ) -> Vec<(String, Result<RecomputeReport>)> {
    let mut set = JoinSet::new();
    for (i, asset) in assets.iter().enumerate() {
      let engine = Arc::clone(self);
      let asset = asset.clone();
      set.spawn(async move {
        let result = engine.recompute(&asset, range).await;
        (i, result)
      });
    }

    let mut results: Vec<Option<Result<RecomputeReport>>> = assets.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok((i, result)) => {
          if let Err(e) = &result {
            warn!(asset = %assets[i], error = %e, "recompute failed");
          }
          results[i] = Some(result);
        }
        Err(e) => warn!(error = %e, "recompute task aborted"),
      }
    }

    assets
      .into_iter()
      .zip(results)
      .map(|(asset, r)| {
        let r = r.unwrap_or_else(|| Err(Error::Task(format!("recompute of {asset} did not finish"))));
        (asset, r)
      })
      .collect()
  }
}
