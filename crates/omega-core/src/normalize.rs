//! Rolling normalization of a daily series over a trailing calendar window.

use std::collections::VecDeque;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::stats::{mean, median, population_std, weighted_mean_std, winsorize};

/// Fewer non-null observations than this in the window yields `None`.
const MIN_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormMethod {
  #[default]
  ZScore,
  /// Clip to the configured tail quantiles, then z-score.
  Winsor,
  MinMax,
}

/// Optional per-day evidence weights for the z-score statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceWeighting {
  #[default]
  None,
  /// Weight each day by its article count.
  Count,
  /// `min((N / median N)^beta, cap)`, median over days with articles.
  Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormConfig {
  pub method:          NormMethod,
  pub window_days:     u32,
  pub winsor_quantile: f64,
  pub evidence:        EvidenceWeighting,
  pub evidence_beta:   f64,
  pub evidence_cap:    f64,
}

impl Default for NormConfig {
  fn default() -> Self {
    Self {
      method:          NormMethod::default(),
      window_days:     90,
      winsor_quantile: 0.05,
      evidence:        EvidenceWeighting::default(),
      evidence_beta:   0.5,
      evidence_cap:    3.0,
    }
  }
}

impl NormConfig {
  /// Plain unweighted z-score over `window_days`.
  pub fn zscore(window_days: u32) -> Self {
    Self { window_days, ..Self::default() }
  }
}

/// One observation of the series to normalize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormPoint {
  pub date:          NaiveDate,
  pub value:         Option<f64>,
  /// Evidence behind `value`; only used by [`EvidenceWeighting`].
  pub article_count: u32,
}

/// Normalize `points` (sorted by date) and return one output per input.
///
/// The window for day `t` holds the non-null values dated in
/// `(t - window_days, t]`. A null input, a window with fewer than two values,
/// or a degenerate spread (zero stddev, `min == max`) yields `None`.
pub fn normalize_series(cfg: &NormConfig, points: &[NormPoint]) -> Vec<Option<f64>> {
  let weights = evidence_weights(cfg, points);
  let use_weights = !matches!(cfg.evidence, EvidenceWeighting::None)
    && !matches!(cfg.method, NormMethod::MinMax);

  let mut window: VecDeque<(NaiveDate, f64, f64)> = VecDeque::new();
  let mut out = Vec::with_capacity(points.len());

  for (p, w) in points.iter().zip(&weights) {
    let horizon = p.date.checked_sub_days(Days::new(u64::from(cfg.window_days)));
    while window
      .front()
      .is_some_and(|(d, ..)| horizon.is_some_and(|h| *d <= h))
    {
      window.pop_front();
    }

    let Some(x) = p.value else {
      out.push(None);
      continue;
    };
    window.push_back((p.date, x, *w));

    if window.len() < MIN_POINTS {
      out.push(None);
      continue;
    }

    let vals: Vec<f64> = window.iter().map(|(_, v, _)| *v).collect();
    let wts: Vec<f64> = window.iter().map(|(.., w)| *w).collect();

    let z = match cfg.method {
      NormMethod::MinMax => min_max(&vals, x),
      NormMethod::ZScore => z_score(&vals, use_weights.then_some(&wts[..]), x),
      NormMethod::Winsor => {
        let (clipped, band) = winsorize(&vals, cfg.winsor_quantile);
        let x_eff = band.map_or(x, |(lo, hi)| x.clamp(lo, hi));
        z_score(&clipped, use_weights.then_some(&wts[..]), x_eff)
      }
    };
    out.push(z);
  }
  out
}

fn min_max(vals: &[f64], x: f64) -> Option<f64> {
  let lo = vals.iter().copied().fold(f64::INFINITY, f64::min);
  let hi = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  (hi > lo).then(|| (x - lo) / (hi - lo))
}

fn z_score(vals: &[f64], weights: Option<&[f64]>, x: f64) -> Option<f64> {
  let (mu, sd) = match weights {
    Some(ws) => weighted_mean_std(vals, ws)?,
    None => (mean(vals)?, population_std(vals)?),
  };
  (sd != 0.0).then(|| (x - mu) / sd)
}

fn evidence_weights(cfg: &NormConfig, points: &[NormPoint]) -> Vec<f64> {
  match cfg.evidence {
    EvidenceWeighting::None => vec![1.0; points.len()],
    EvidenceWeighting::Count => points.iter().map(|p| f64::from(p.article_count)).collect(),
    EvidenceWeighting::Normalized => {
      let positive: Vec<f64> = points
        .iter()
        .filter(|p| p.article_count > 0)
        .map(|p| f64::from(p.article_count))
        .collect();
      let med = median(&positive).unwrap_or(0.0);
      points
        .iter()
        .map(|p| {
          if p.article_count == 0 {
            return 0.0;
          }
          let base = if med > 0.0 { f64::from(p.article_count) / med } else { 1.0 };
          base.powf(cfg.evidence_beta).min(cfg.evidence_cap)
        })
        .collect()
    }
  }
}
