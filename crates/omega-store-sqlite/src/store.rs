//! [`SqliteStore`], the SQLite implementation of [`FactorStore`].

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use omega_core::{
  article::{CanonicalArticle, NewCanonicalArticle, NewRejection, Rejection},
  domain::DomainStat,
  factor::{DailyFactor, FactorRow},
  fusion,
  quant::PriceBar,
  sentiment::DailySentiment,
  store::{DateRange, FactorStore, UpsertCounts},
  vote::{NewVote, Vote},
};

use crate::{
  Error, Result,
  encode::{
    ARTICLE_COLUMNS, FACTOR_COLUMNS, PRICE_COLUMNS, RawArticle, RawFactor, RawPriceBar,
    RawRejection, RawSentiment, RawVote, VOTE_COLUMNS, decode_count, encode_count, encode_date,
    encode_dt, encode_snapshot, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A fusion-engine store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run raw SQL against the database; tests use it to tamper with rows.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }

  async fn find_vote(&self, url: String, asset: String, model: String) -> Result<Option<Vote>> {
    let raw: Option<RawVote> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {VOTE_COLUMNS} FROM votes WHERE url = ?1 AND asset = ?2 AND model = ?3"),
            rusqlite::params![url, asset, model],
            RawVote::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawVote::into_vote).transpose()
  }
}

// ─── FactorStore impl ────────────────────────────────────────────────────────

impl FactorStore for SqliteStore {
  type Error = Error;

  // ── Votes ─────────────────────────────────────────────────────────────────

  async fn record_vote(&self, vote: NewVote) -> Result<Vote> {
    let vote = vote.normalize();
    let id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(vote.voted_at);
    let (url, asset, model) = (vote.url.clone(), vote.asset.clone(), vote.model.clone());

    let inserted = self
      .conn
      .call(move |conn| {
        // A vote for an already-accepted subject is linked straight away.
        let n = conn.execute(
          "INSERT INTO votes (
             vote_id, url, asset, model, relevance, sentiment, summary, voted_at, article_id
           ) VALUES (
             ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
             (SELECT article_id FROM articles WHERE url = ?2 AND asset = ?3)
           )
           ON CONFLICT (url, asset, model) DO NOTHING",
          rusqlite::params![
            id_str,
            vote.url,
            vote.asset,
            vote.model,
            vote.relevance,
            vote.sentiment,
            vote.summary,
            at_str,
          ],
        )?;
        Ok(n == 1)
      })
      .await?;

    if !inserted {
      debug!(%url, %asset, %model, "duplicate vote ignored");
    }

    let label = format!("vote {model} for {url} ({asset})");
    self.find_vote(url, asset, model).await?.ok_or(Error::Missing(label))
  }

  async fn votes_for(&self, url: String, asset: String) -> Result<Vec<Vote>> {
    let raws: Vec<RawVote> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VOTE_COLUMNS} FROM votes WHERE url = ?1 AND asset = ?2
           ORDER BY voted_at, model"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![url, asset], RawVote::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawVote::into_vote).collect()
  }

  // ── Canonical articles ────────────────────────────────────────────────────

  async fn find_article(&self, url: String, asset: String) -> Result<Option<CanonicalArticle>> {
    let raw: Option<RawArticle> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1 AND asset = ?2"),
            rusqlite::params![url, asset],
            RawArticle::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawArticle::into_article).transpose()
  }

  async fn insert_article(&self, article: NewCanonicalArticle) -> Result<(CanonicalArticle, bool)> {
    let id_str = encode_uuid(Uuid::new_v4());
    let published_str = encode_dt(article.published_at);
    let published_date = encode_date(article.published_at.date_naive());
    let ingested_str = encode_dt(Utc::now());
    let label = format!("article {} ({})", article.url, article.asset);

    let (raw, created): (Option<RawArticle>, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let n = tx.execute(
          "INSERT INTO articles (
             article_id, url, asset, published_at, published_date,
             summary, sentiment, domain, provenance, ingested_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT (url, asset) DO NOTHING",
          rusqlite::params![
            id_str,
            article.url,
            article.asset,
            published_str,
            published_date,
            article.summary,
            article.sentiment,
            article.domain,
            article.provenance,
            ingested_str,
          ],
        )?;
        let created = n == 1;
        if created {
          tx.execute(
            "UPDATE votes SET article_id = ?1 WHERE url = ?2 AND asset = ?3",
            rusqlite::params![id_str, article.url, article.asset],
          )?;
        }
        let raw = tx
          .query_row(
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1 AND asset = ?2"),
            rusqlite::params![article.url, article.asset],
            RawArticle::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok((raw, created))
      })
      .await?;

    let article = raw.ok_or(Error::Missing(label))?.into_article()?;
    Ok((article, created))
  }

  async fn articles_for(&self, asset: String, range: DateRange) -> Result<Vec<CanonicalArticle>> {
    let from = encode_date(range.from());
    let to = encode_date(range.to());

    let raws: Vec<RawArticle> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ARTICLE_COLUMNS} FROM articles
           WHERE asset = ?1 AND published_date BETWEEN ?2 AND ?3
           ORDER BY published_at, article_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![asset, from, to], RawArticle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawArticle::into_article).collect()
  }

  // ── Rejections ────────────────────────────────────────────────────────────

  async fn record_rejection(&self, rejection: NewRejection) -> Result<Rejection> {
    let record = Rejection {
      rejection_id: Uuid::new_v4(),
      url:          rejection.url,
      asset:        rejection.asset,
      reason:       rejection.reason,
      votes:        rejection.votes,
      created_at:   Utc::now(),
    };

    let id_str     = encode_uuid(record.rejection_id);
    let url        = record.url.clone();
    let asset      = record.asset.clone();
    let reason_str = record.reason.as_str();
    let votes_json = encode_snapshot(&record.votes)?;
    let at_str     = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rejections (rejection_id, url, asset, reason, votes_json, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, url, asset, reason_str, votes_json, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn rejections_for(&self, url: String, asset: String) -> Result<Vec<Rejection>> {
    let raws: Vec<RawRejection> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT rejection_id, url, asset, reason, votes_json, created_at
           FROM rejections WHERE url = ?1 AND asset = ?2
           ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![url, asset], |row| {
            Ok(RawRejection {
              rejection_id: row.get(0)?,
              url:          row.get(1)?,
              asset:        row.get(2)?,
              reason:       row.get(3)?,
              votes_json:   row.get(4)?,
              created_at:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRejection::into_rejection).collect()
  }

  // ── Domain statistics ─────────────────────────────────────────────────────

  async fn record_domain_stat(&self, stat: DomainStat) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO domain_stats (
             asset, domain, harvested_total, stored_total, llm_accepted, llm_rejected
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (asset, domain) DO UPDATE SET
             harvested_total = MAX(harvested_total, excluded.harvested_total),
             stored_total    = MAX(stored_total,    excluded.stored_total),
             llm_accepted    = MAX(llm_accepted,    excluded.llm_accepted),
             llm_rejected    = MAX(llm_rejected,    excluded.llm_rejected)",
          rusqlite::params![
            stat.asset,
            stat.domain,
            encode_count(stat.harvested_total),
            encode_count(stat.stored_total),
            encode_count(stat.llm_accepted),
            encode_count(stat.llm_rejected),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn domain_stats(&self, asset: String) -> Result<Vec<DomainStat>> {
    let stats = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT asset, domain, harvested_total, stored_total, llm_accepted, llm_rejected
           FROM domain_stats WHERE asset = ?1 ORDER BY domain",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![asset], |row| {
            Ok(DomainStat {
              asset:           row.get(0)?,
              domain:          row.get(1)?,
              harvested_total: decode_count(row.get(2)?),
              stored_total:    decode_count(row.get(3)?),
              llm_accepted:    decode_count(row.get(4)?),
              llm_rejected:    decode_count(row.get(5)?),
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(stats)
  }

  // ── Prices ────────────────────────────────────────────────────────────────

  async fn upsert_price_bars(&self, bars: Vec<PriceBar>) -> Result<UpsertCounts> {
    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut counts = UpsertCounts::default();
        for bar in &bars {
          let date = encode_date(bar.date);
          let exists = tx
            .query_row(
              "SELECT 1 FROM price_bars
               WHERE asset = ?1 AND provider = ?2 AND currency = ?3 AND date = ?4",
              rusqlite::params![bar.asset, bar.provider, bar.currency, date],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          tx.execute(
            "INSERT OR REPLACE INTO price_bars (
               asset, provider, currency, date, open, high, low, close, volume, market_cap
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
              bar.asset,
              bar.provider,
              bar.currency,
              date,
              bar.open,
              bar.high,
              bar.low,
              bar.close,
              bar.volume,
              bar.market_cap,
            ],
          )?;
          if exists {
            counts.updated += 1;
          } else {
            counts.inserted += 1;
          }
        }
        tx.commit()?;
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }

  async fn price_bars(
    &self,
    asset: String,
    currency: String,
    until: NaiveDate,
  ) -> Result<Vec<PriceBar>> {
    let until = encode_date(until);
    let raws: Vec<RawPriceBar> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PRICE_COLUMNS} FROM price_bars
           WHERE asset = ?1 AND currency = ?2 AND date <= ?3
           ORDER BY date, provider"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![asset, currency, until], RawPriceBar::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawPriceBar::into_bar).collect()
  }

  // ── Daily sentiment ───────────────────────────────────────────────────────

  async fn upsert_daily_sentiment(&self, rows: Vec<DailySentiment>) -> Result<UpsertCounts> {
    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let counts = write_sentiment(&tx, &rows)?;
        tx.commit()?;
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }

  async fn daily_sentiment(&self, asset: String, range: DateRange) -> Result<Vec<DailySentiment>> {
    let from = encode_date(range.from());
    let to = encode_date(range.to());

    let raws: Vec<RawSentiment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT asset, date, weighted_mean_sentiment, article_count
           FROM daily_sentiment
           WHERE asset = ?1 AND date BETWEEN ?2 AND ?3
           ORDER BY date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![asset, from, to], |row| {
            Ok(RawSentiment {
              asset:                   row.get(0)?,
              date:                    row.get(1)?,
              weighted_mean_sentiment: row.get(2)?,
              article_count:           row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSentiment::into_sentiment).collect()
  }

  // ── Factors ───────────────────────────────────────────────────────────────

  async fn upsert_factors(&self, rows: Vec<FactorRow>) -> Result<UpsertCounts> {
    let now = encode_dt(Utc::now());
    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let counts = write_factors(&tx, &rows, &now)?;
        tx.commit()?;
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }

  async fn upsert_recompute(
    &self,
    sentiment: Vec<DailySentiment>,
    factors: Vec<FactorRow>,
  ) -> Result<(UpsertCounts, UpsertCounts)> {
    let now = encode_dt(Utc::now());
    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let sentiment = write_sentiment(&tx, &sentiment)?;
        let factors = write_factors(&tx, &factors, &now)?;
        tx.commit()?;
        Ok((sentiment, factors))
      })
      .await?;
    Ok(counts)
  }

  async fn factors(&self, asset: String, range: DateRange) -> Result<Vec<DailyFactor>> {
    let from = encode_date(range.from());
    let to = encode_date(range.to());

    let raws: Vec<RawFactor> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FACTOR_COLUMNS} FROM daily_factors
           WHERE asset = ?1 AND date BETWEEN ?2 AND ?3
           ORDER BY date"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![asset, from, to], RawFactor::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawFactor::into_factor).collect()
  }

  async fn factor(&self, asset: String, date: NaiveDate) -> Result<Option<DailyFactor>> {
    let date = encode_date(date);
    let raw: Option<RawFactor> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {FACTOR_COLUMNS} FROM daily_factors WHERE asset = ?1 AND date = ?2"),
            rusqlite::params![asset, date],
            RawFactor::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawFactor::into_factor).transpose()
  }
}

// ─── Batch writers ───────────────────────────────────────────────────────────

fn row_exists(
  tx: &rusqlite::Transaction<'_>,
  table: &str,
  asset: &str,
  date: &str,
) -> rusqlite::Result<bool> {
  Ok(
    tx.query_row(
      &format!("SELECT 1 FROM {table} WHERE asset = ?1 AND date = ?2"),
      rusqlite::params![asset, date],
      |_| Ok(()),
    )
    .optional()?
    .is_some(),
  )
}

fn write_sentiment(
  tx: &rusqlite::Transaction<'_>,
  rows: &[DailySentiment],
) -> rusqlite::Result<UpsertCounts> {
  let mut counts = UpsertCounts::default();
  for row in rows {
    let date = encode_date(row.date);
    let exists = row_exists(tx, "daily_sentiment", &row.asset, &date)?;
    tx.execute(
      "INSERT OR REPLACE INTO daily_sentiment (
         asset, date, weighted_mean_sentiment, article_count
       ) VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![row.asset, date, row.weighted_mean_sentiment, row.article_count],
    )?;
    if exists {
      counts.updated += 1;
    } else {
      counts.inserted += 1;
    }
  }
  Ok(counts)
}

fn write_factors(
  tx: &rusqlite::Transaction<'_>,
  rows: &[FactorRow],
  now: &str,
) -> rusqlite::Result<UpsertCounts> {
  let mut counts = UpsertCounts::default();
  for row in rows {
    let date = encode_date(row.date());
    let q = &row.quant;
    let p_omega = fusion::blend(row.p_alpha, row.sentiment_norm, row.alpha);
    let exists = row_exists(tx, "daily_factors", &row.asset, &date)?;
    // Full replace of every computed column; created_at survives.
    tx.execute(
      "INSERT INTO daily_factors (
         asset, date, ret_1d, vol_30d, sharpe_30d, sortino_30d, var_1d_95,
         exp_return_30d, sentiment_mean, sentiment_norm, p_alpha, alpha, p_omega,
         created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
       ON CONFLICT (asset, date) DO UPDATE SET
         ret_1d         = excluded.ret_1d,
         vol_30d        = excluded.vol_30d,
         sharpe_30d     = excluded.sharpe_30d,
         sortino_30d    = excluded.sortino_30d,
         var_1d_95      = excluded.var_1d_95,
         exp_return_30d = excluded.exp_return_30d,
         sentiment_mean = excluded.sentiment_mean,
         sentiment_norm = excluded.sentiment_norm,
         p_alpha        = excluded.p_alpha,
         alpha          = excluded.alpha,
         p_omega        = excluded.p_omega,
         updated_at     = excluded.updated_at",
      rusqlite::params![
        row.asset,
        date,
        q.ret_1d,
        q.vol_30d,
        q.sharpe_30d,
        q.sortino_30d,
        q.var_1d_95,
        q.exp_return_30d,
        row.sentiment_mean,
        row.sentiment_norm,
        row.p_alpha,
        row.alpha.get(),
        p_omega,
        now,
      ],
    )?;
    if exists {
      counts.updated += 1;
    } else {
      counts.inserted += 1;
    }
  }
  Ok(counts)
}
