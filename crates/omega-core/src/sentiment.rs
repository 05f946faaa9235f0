//! Daily sentiment composition: trust-weighted mean of canonical-article
//! sentiment per asset and calendar day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{article::CanonicalArticle, domain::WeightTable, store::DateRange};

/// One row per (asset, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySentiment {
  pub asset:                   String,
  pub date:                    NaiveDate,
  /// `None` means "no signal" (no weighted article that day), which is
  /// different from a neutral `0.0`.
  pub weighted_mean_sentiment: Option<f64>,
  pub article_count:           u32,
}

#[derive(Default)]
struct DayAccumulator {
  weighted_sum: f64,
  weight_sum:   f64,
  count:        u32,
}

/// Compose one [`DailySentiment`] for every day in `range`.
///
/// Articles are bucketed by the UTC date of `published_at`; articles outside
/// `range` or for another asset are ignored.
pub fn compose_daily(
  asset: &str,
  articles: &[CanonicalArticle],
  weights: &WeightTable,
  range: DateRange,
) -> Vec<DailySentiment> {
  let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

  for a in articles.iter().filter(|a| a.asset == asset) {
    let day = a.published_at.date_naive();
    if !range.contains(day) {
      continue;
    }
    let acc = days.entry(day).or_default();
    acc.count += 1;
    if let Some(s) = a.sentiment {
      let w = weights.weight_of(a.domain.as_deref());
      acc.weighted_sum += s * w;
      acc.weight_sum += w;
    }
  }

  range
    .days()
    .map(|date| {
      let acc = days.remove(&date).unwrap_or_default();
      DailySentiment {
        asset: asset.to_owned(),
        date,
        weighted_mean_sentiment: (acc.weight_sum > 0.0)
          .then(|| acc.weighted_sum / acc.weight_sum),
        article_count: acc.count,
      }
    })
    .collect()
}
