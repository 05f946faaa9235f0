//! Integration tests for `SqliteStore` against an in-memory database, and for
//! the engine running on top of it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use omega_core::{
  article::{NewCanonicalArticle, NewRejection, RejectionReason},
  collect::{Candidate, VoteCollector, Voter, VoterAnswer, VoterError},
  config::{CollectConfig, EngineConfig},
  domain::{DomainStat, MAX_WEIGHT, MIN_WEIGHT},
  engine::{FusionEngine, Settlement},
  factor::FactorRow,
  fusion::{Alpha, blend},
  quant::{PriceBar, QuantFactors},
  sentiment::DailySentiment,
  store::{DateRange, FactorStore},
  vote::{NewVote, VoteSnapshot},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn engine() -> Arc<FusionEngine<SqliteStore>> {
  Arc::new(FusionEngine::new(Arc::new(store().await), EngineConfig::default()).unwrap())
}

const URL: &str = "https://www.coindesk.com/markets/btc-breaks-out";

fn day(n: u64) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(n) }

fn noon(date: NaiveDate) -> DateTime<Utc> {
  Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

fn vote(url: &str, model: &str, relevance: bool, sentiment: Option<f64>) -> NewVote {
  NewVote::normalized(
    url,
    "BTC",
    model,
    relevance,
    sentiment,
    Some(format!("{model} says hi")),
    Utc::now(),
  )
}

fn range(from: u64, to: u64) -> DateRange { DateRange::new(day(from), day(to)).unwrap() }

fn bars(asset: &str, n: u64) -> Vec<PriceBar> {
  let mut price = 100.0;
  (0..n)
    .map(|i| {
      price *= if i % 3 == 0 { 0.97 } else { 1.02 };
      PriceBar {
        asset:      asset.into(),
        provider:   "coingecko".into(),
        currency:   "usd".into(),
        date:       day(i),
        open:       None,
        high:       None,
        low:        None,
        close:      price,
        volume:     Some(1_000.0),
        market_cap: None,
      }
    })
    .collect()
}

fn factor_row(date: NaiveDate, p_alpha: Option<f64>, norm: Option<f64>) -> FactorRow {
  FactorRow {
    asset:          "BTC".into(),
    quant:          QuantFactors { date, ret_1d: Some(0.01), ..Default::default() },
    sentiment_mean: Some(0.1),
    sentiment_norm: norm,
    p_alpha,
    alpha:          Alpha::new(0.25).unwrap(),
  }
}

// ─── Votes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_model_vote_is_ignored() {
  let s = store().await;
  let first = s.record_vote(vote(URL, "gpt", true, Some(0.5))).await.unwrap();
  let second = s.record_vote(vote(URL, "gpt", false, None)).await.unwrap();
  assert_eq!(first.vote_id, second.vote_id);
  assert!(second.relevance);

  let all = s.votes_for(URL.into(), "BTC".into()).await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn votes_are_scoped_by_asset() {
  let s = store().await;
  s.record_vote(vote(URL, "gpt", true, Some(0.5))).await.unwrap();
  let eth = s.votes_for(URL.into(), "ETH".into()).await.unwrap();
  assert!(eth.is_empty());
}

// ─── Articles & rejections ───────────────────────────────────────────────────

fn new_article() -> NewCanonicalArticle {
  NewCanonicalArticle {
    url:          URL.into(),
    asset:        "BTC".into(),
    published_at: noon(day(3)),
    summary:      "BTC rallies".into(),
    sentiment:    Some(0.4),
    domain:       Some("www.coindesk.com".into()),
    provenance:   "ensemble[gpt,grok]".into(),
  }
}

#[tokio::test]
async fn canonical_insert_is_idempotent() {
  let s = store().await;
  s.record_vote(vote(URL, "gpt", true, Some(0.4))).await.unwrap();

  let (a, created) = s.insert_article(new_article()).await.unwrap();
  assert!(created);
  let (b, created_again) = s
    .insert_article(NewCanonicalArticle { summary: "other".into(), ..new_article() })
    .await
    .unwrap();
  assert!(!created_again);
  assert_eq!(a.article_id, b.article_id);
  assert_eq!(b.summary, "BTC rallies");

  let votes = s.votes_for(URL.into(), "BTC".into()).await.unwrap();
  assert_eq!(votes[0].article_id, Some(a.article_id));
}

#[tokio::test]
async fn articles_for_filters_by_publication_day() {
  let s = store().await;
  s.insert_article(new_article()).await.unwrap();
  assert_eq!(s.articles_for("BTC".into(), range(3, 3)).await.unwrap().len(), 1);
  assert!(s.articles_for("BTC".into(), range(4, 9)).await.unwrap().is_empty());
  assert!(s.articles_for("ETH".into(), range(0, 9)).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejections_are_append_only() {
  let s = store().await;
  let rejection = NewRejection {
    url:    URL.into(),
    asset:  "BTC".into(),
    reason: RejectionReason::NotRelevant,
    votes:  vec![VoteSnapshot { model: "gpt".into(), relevance: false, sentiment: None }],
  };
  s.record_rejection(rejection.clone()).await.unwrap();
  s.record_rejection(rejection).await.unwrap();

  let all = s.rejections_for(URL.into(), "BTC".into()).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].reason, RejectionReason::NotRelevant);
  assert_eq!(all[0].votes[0].model, "gpt");
}

// ─── Domain stats & prices ───────────────────────────────────────────────────

#[tokio::test]
async fn domain_counters_never_decrease() {
  let s = store().await;
  let stat = DomainStat {
    stored_total: 10,
    llm_accepted: 4,
    ..DomainStat::empty("BTC", "a.com")
  };
  s.record_domain_stat(stat.clone()).await.unwrap();
  s.record_domain_stat(DomainStat { stored_total: 3, llm_accepted: 6, ..stat })
    .await
    .unwrap();

  let stats = s.domain_stats("BTC".into()).await.unwrap();
  assert_eq!(stats.len(), 1);
  assert_eq!(stats[0].stored_total, 10);
  assert_eq!(stats[0].llm_accepted, 6);
}

#[tokio::test]
async fn price_bar_upsert_counts() {
  let s = store().await;
  let first = s.upsert_price_bars(bars("BTC", 5)).await.unwrap();
  assert_eq!((first.inserted, first.updated), (5, 0));
  let second = s.upsert_price_bars(bars("BTC", 6)).await.unwrap();
  assert_eq!((second.inserted, second.updated), (1, 5));

  let read = s.price_bars("BTC".into(), "usd".into(), day(2)).await.unwrap();
  assert_eq!(read.len(), 3);
  assert!(s.price_bars("BTC".into(), "eur".into(), day(9)).await.unwrap().is_empty());
}

#[tokio::test]
async fn daily_sentiment_round_trips_nulls() {
  let s = store().await;
  let rows = vec![
    DailySentiment { asset: "BTC".into(), date: day(0), weighted_mean_sentiment: Some(0.2), article_count: 3 },
    DailySentiment { asset: "BTC".into(), date: day(1), weighted_mean_sentiment: None, article_count: 0 },
  ];
  s.upsert_daily_sentiment(rows.clone()).await.unwrap();
  assert_eq!(s.daily_sentiment("BTC".into(), range(0, 1)).await.unwrap(), rows);
}

// ─── Factors ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_preserves_created_at_and_advances_updated_at() {
  let s = store().await;
  let counts = s.upsert_factors(vec![factor_row(day(0), Some(1.0), Some(0.0))]).await.unwrap();
  assert_eq!((counts.inserted, counts.updated), (1, 0));
  let before = s.factor("BTC".into(), day(0)).await.unwrap().unwrap();

  tokio::time::sleep(Duration::from_millis(5)).await;
  let counts = s.upsert_factors(vec![factor_row(day(0), Some(2.0), Some(0.0))]).await.unwrap();
  assert_eq!((counts.inserted, counts.updated), (0, 1));
  let after = s.factor("BTC".into(), day(0)).await.unwrap().unwrap();

  assert_eq!(after.created_at(), before.created_at());
  assert!(after.updated_at() > before.updated_at());
  assert_eq!(after.row().p_alpha, Some(2.0));
}

#[tokio::test]
async fn p_omega_is_recomputed_on_read() {
  let s = store().await;
  s.upsert_factors(vec![
    factor_row(day(0), Some(1.0), Some(-1.0)),
    factor_row(day(1), None, Some(-1.0)),
  ])
  .await
  .unwrap();
  s.execute_raw("UPDATE daily_factors SET p_omega = 99.0").await.unwrap();

  let rows = s.factors("BTC".into(), range(0, 1)).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].p_omega(), Some(0.75 * 1.0 + 0.25 * -1.0));
  assert_eq!(rows[1].p_omega(), None);
}

#[tokio::test]
async fn missing_factor_is_none() {
  let s = store().await;
  assert!(s.factor("BTC".into(), day(0)).await.unwrap().is_none());
}

// ─── Engine: consensus ───────────────────────────────────────────────────────

#[tokio::test]
async fn majority_accepts_with_mean_of_relevant_votes() {
  let e = engine().await;
  e.record_vote(vote(URL, "gpt", true, Some(0.5))).await.unwrap();
  e.record_vote(vote(URL, "gemini", true, Some(0.3))).await.unwrap();
  e.record_vote(vote(URL, "grok", false, Some(0.9))).await.unwrap();

  let Settlement::Accepted(a) = e.settle(URL, "BTC", noon(day(1))).await.unwrap() else {
    panic!("expected acceptance");
  };
  assert_eq!(a.sentiment, Some(0.40));
  assert_eq!(a.domain.as_deref(), Some("www.coindesk.com"));

  // A second run does not create another article.
  let again = e.settle(URL, "BTC", noon(day(1))).await.unwrap();
  assert!(matches!(again, Settlement::AlreadyAccepted(ref b) if b.article_id == a.article_id));
}

#[tokio::test]
async fn single_vote_is_insufficient() {
  let e = engine().await;
  e.record_vote(vote(URL, "gpt", true, Some(0.5))).await.unwrap();

  let Settlement::Rejected(r) = e.settle(URL, "BTC", noon(day(1))).await.unwrap() else {
    panic!("expected rejection");
  };
  assert_eq!(r.reason, RejectionReason::InsufficientVotes);
  assert!(e.store().find_article(URL.into(), "BTC".into()).await.unwrap().is_none());
  assert_eq!(e.store().rejections_for(URL.into(), "BTC".into()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn late_vote_is_linked_but_does_not_reopen() {
  let e = engine().await;
  e.record_vote(vote(URL, "gpt", true, Some(0.5))).await.unwrap();
  e.record_vote(vote(URL, "gemini", true, Some(0.3))).await.unwrap();
  let accepted = e.settle(URL, "BTC", noon(day(1))).await.unwrap();
  let article = accepted.article().unwrap().clone();

  let late = e.record_vote(vote(URL, "grok", false, None)).await.unwrap();
  assert_eq!(late.article_id, Some(article.article_id));

  let after = e.settle(URL, "BTC", noon(day(1))).await.unwrap();
  assert_eq!(after.article(), Some(&article));
}

#[tokio::test]
async fn hand_built_votes_are_clamped_before_recording() {
  let e = engine().await;
  for (model, sentiment) in [("gpt", 5.0), ("gemini", 0.456)] {
    let raw = NewVote {
      url:       URL.into(),
      asset:     "BTC".into(),
      model:     model.into(),
      relevance: true,
      sentiment: Some(sentiment),
      summary:   None,
      voted_at:  Utc::now(),
    };
    let stored = e.record_vote(raw).await.unwrap();
    assert!(stored.sentiment.is_some_and(|s| (-1.0..=1.0).contains(&s)));
  }

  let Settlement::Accepted(a) = e.settle(URL, "BTC", noon(day(1))).await.unwrap() else {
    panic!("expected acceptance");
  };
  // (1.0 + 0.46) / 2
  assert_eq!(a.sentiment, Some(0.73));
}

struct Echo(&'static str, f64);

#[async_trait]
impl Voter for Echo {
  fn model(&self) -> &str { self.0 }

  async fn vote(&self, _candidate: &Candidate) -> Result<VoterAnswer, VoterError> {
    Ok(VoterAnswer { relevance: true, sentiment: Some(self.1), summary: Some("summary".into()) })
  }
}

#[tokio::test]
async fn collect_and_settle_accepts_from_live_voters() {
  let e = engine().await;
  let voters: Vec<Arc<dyn Voter>> = vec![Arc::new(Echo("a", 0.2)), Arc::new(Echo("b", 0.4))];
  let collector = Arc::new(VoteCollector::new(voters, &CollectConfig::default()));
  let candidate = Candidate {
    url:          URL.into(),
    asset:        "BTC".into(),
    published_at: noon(day(2)),
    title:        "BTC breaks out".into(),
    text:         "...".into(),
  };

  let out = e.collect_and_settle(&collector, vec![candidate]).await;
  assert_eq!(out.len(), 1);
  let article = out[0].1.as_ref().unwrap().article().unwrap();
  assert_eq!(article.sentiment, Some(0.3));
  assert_eq!(article.provenance, "ensemble[a,b]");
}

struct Stalled;

#[async_trait]
impl Voter for Stalled {
  fn model(&self) -> &str { "stalled" }

  async fn vote(&self, _candidate: &Candidate) -> Result<VoterAnswer, VoterError> {
    tokio::time::sleep(Duration::from_secs(600)).await;
    Ok(VoterAnswer { relevance: true, sentiment: Some(0.9), summary: None })
  }
}

#[tokio::test(start_paused = true)]
async fn voter_past_deadline_leaves_subject_insufficient() {
  let e = engine().await;
  let voters: Vec<Arc<dyn Voter>> = vec![Arc::new(Echo("a", 0.2)), Arc::new(Stalled)];
  let collector = Arc::new(VoteCollector::new(voters, &CollectConfig::default()));
  let candidate = Candidate {
    url:          URL.into(),
    asset:        "BTC".into(),
    published_at: noon(day(2)),
    title:        "BTC breaks out".into(),
    text:         "...".into(),
  };

  let out = e.collect_and_settle(&collector, vec![candidate]).await;
  let Ok(Settlement::Rejected(r)) = &out[0].1 else {
    panic!("expected rejection, got {:?}", out[0].1);
  };
  assert_eq!(r.reason, RejectionReason::InsufficientVotes);
  assert_eq!(r.votes.len(), 1);
  assert_eq!(r.votes[0].model, "a");

  let votes = e.store().votes_for(URL.into(), "BTC".into()).await.unwrap();
  assert_eq!(votes.len(), 1);
  assert!(e.store().find_article(URL.into(), "BTC".into()).await.unwrap().is_none());
}

// ─── Engine: recompute ───────────────────────────────────────────────────────

async fn seed(e: &FusionEngine<SqliteStore>) {
  let s = e.store();
  s.upsert_price_bars(bars("BTC", 90)).await.unwrap();
  for (i, domain) in [(0u64, "a.com"), (1, "b.com"), (2, "c.com")] {
    s.record_domain_stat(DomainStat {
      stored_total: 10 * (i + 1),
      llm_accepted: 4 * (i + 1),
      ..DomainStat::empty("BTC", domain)
    })
    .await
    .unwrap();
  }
  for n in 0..90u64 {
    let domain = ["a.com", "b.com", "c.com", "unknown.org"][(n % 4) as usize];
    let sentiment = ((n % 7) as f64 - 3.0) / 4.0;
    s.insert_article(NewCanonicalArticle {
      url:          format!("https://{domain}/{n}"),
      asset:        "BTC".into(),
      published_at: noon(day(n)),
      summary:      format!("story {n}"),
      sentiment:    Some(sentiment),
      domain:       Some(domain.into()),
      provenance:   "ensemble[a,b]".into(),
    })
    .await
    .unwrap();
  }
}

#[tokio::test]
async fn recompute_writes_one_row_per_bar_day() {
  let e = engine().await;
  seed(&e).await;

  let report = e.recompute("BTC", range(40, 89)).await.unwrap();
  assert_eq!(report.days_processed, 50);
  assert_eq!(report.factors_inserted, 50);
  assert_eq!(report.factors_updated, 0);
  assert_eq!(report.sentiment_days, 50);

  let rows = e.factors("BTC", range(0, 89)).await.unwrap();
  assert_eq!(rows.len(), 50);
  for r in &rows {
    let row = r.row();
    assert!(row.quant.vol_30d.is_some(), "warm-up history should fill the window");
    assert_eq!(r.p_omega(), blend(row.p_alpha, row.sentiment_norm, row.alpha));
  }
  assert!(rows.iter().any(|r| r.p_omega().is_some()));
}

#[tokio::test]
async fn recompute_twice_differs_only_in_updated_at() {
  let e = engine().await;
  seed(&e).await;

  e.recompute("BTC", range(30, 60)).await.unwrap();
  let first = e.factors("BTC", range(30, 60)).await.unwrap();
  let report = e.recompute("BTC", range(30, 60)).await.unwrap();
  let second = e.factors("BTC", range(30, 60)).await.unwrap();

  assert_eq!(report.factors_updated, 31);
  assert_eq!(report.factors_inserted, 0);
  assert_eq!(first.len(), second.len());
  for (a, b) in first.iter().zip(&second) {
    assert!(a.same_content(b), "row {} changed", a.date());
  }
}

#[tokio::test]
async fn short_history_leaves_rolling_factors_null() {
  let e = engine().await;
  e.store().upsert_price_bars(bars("BTC", 20)).await.unwrap();

  e.recompute("BTC", range(0, 19)).await.unwrap();
  let rows = e.factors("BTC", range(0, 19)).await.unwrap();
  assert_eq!(rows.len(), 20);
  assert!(rows.iter().all(|r| r.row().quant.vol_30d.is_none()));
  assert!(rows.iter().all(|r| r.row().quant.sharpe_30d.is_none()));
  assert!(rows[0].row().quant.ret_1d.is_none());
  // No sentiment at all → no blended score either.
  assert!(rows.iter().all(|r| r.p_omega().is_none()));
}

const REFUSE_ETH_FACTORS: &str = "CREATE TRIGGER refuse_eth BEFORE INSERT ON daily_factors
   WHEN NEW.asset = 'ETH'
   BEGIN SELECT RAISE(ABORT, 'factor write refused'); END";

#[tokio::test]
async fn recompute_many_isolates_assets() {
  let e = engine().await;
  seed(&e).await;
  e.store().upsert_price_bars(bars("ETH", 90)).await.unwrap();
  e.store().execute_raw(REFUSE_ETH_FACTORS).await.unwrap();

  let out = e
    .recompute_many(vec!["BTC".into(), "ETH".into(), "SOL".into()], range(60, 69))
    .await;
  assert_eq!(out.len(), 3);
  assert_eq!(out[0].0, "BTC");
  assert_eq!(out[0].1.as_ref().unwrap().days_processed, 10);
  assert_eq!(out[1].0, "ETH");
  assert!(out[1].1.is_err());
  assert_eq!(out[2].1.as_ref().unwrap().days_processed, 0);

  assert_eq!(e.factors("BTC", range(60, 69)).await.unwrap().len(), 10);
  assert!(e.factors("ETH", range(60, 69)).await.unwrap().is_empty());
  assert!(e.daily_sentiment("ETH", range(60, 69)).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_factor_write_leaves_sentiment_untouched() {
  let e = engine().await;
  seed(&e).await;
  e.recompute("BTC", range(30, 40)).await.unwrap();
  let sentiment_before = e.daily_sentiment("BTC", range(30, 40)).await.unwrap();
  let factors_before = e.factors("BTC", range(30, 40)).await.unwrap();

  // A second story on day 35 would change that day's sentiment.
  e.store()
    .insert_article(NewCanonicalArticle {
      url:          "https://a.com/extra".into(),
      asset:        "BTC".into(),
      published_at: noon(day(35)),
      summary:      "extra".into(),
      sentiment:    Some(1.0),
      domain:       Some("a.com".into()),
      provenance:   "ensemble[a,b]".into(),
    })
    .await
    .unwrap();
  for sql in [
    "CREATE TRIGGER refuse_insert BEFORE INSERT ON daily_factors
     BEGIN SELECT RAISE(ABORT, 'factor write refused'); END",
    "CREATE TRIGGER refuse_update BEFORE UPDATE ON daily_factors
     BEGIN SELECT RAISE(ABORT, 'factor write refused'); END",
  ] {
    e.store().execute_raw(sql).await.unwrap();
  }

  assert!(e.recompute("BTC", range(30, 40)).await.is_err());
  assert_eq!(e.daily_sentiment("BTC", range(30, 40)).await.unwrap(), sentiment_before);
  assert_eq!(e.factors("BTC", range(30, 40)).await.unwrap(), factors_before);
}

#[tokio::test]
async fn domain_weights_snapshot_is_bounded() {
  let e = engine().await;
  seed(&e).await;
  let weights = e.domain_weights("BTC").await.unwrap();
  assert_eq!(weights.len(), 3);
  assert!(weights.iter().all(|w| (MIN_WEIGHT..=MAX_WEIGHT).contains(&w.weight)));
}
