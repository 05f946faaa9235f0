//! The quant composite `p_alpha` and its blend with normalized sentiment into
//! `p_omega`.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  normalize::{NormConfig, NormPoint, normalize_series},
  quant::QuantFactors,
};

// ─── Alpha ───────────────────────────────────────────────────────────────────

/// The run-level sentiment blend weight, guaranteed to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Alpha(f64);

impl Alpha {
  pub fn new(value: f64) -> Result<Self> {
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(Error::AlphaOutOfRange(value))
    }
  }

  pub fn get(self) -> f64 { self.0 }
}

impl Default for Alpha {
  fn default() -> Self { Self(0.25) }
}

impl TryFrom<f64> for Alpha {
  type Error = Error;

  fn try_from(value: f64) -> Result<Self> { Self::new(value) }
}

impl From<Alpha> for f64 {
  fn from(a: Alpha) -> Self { a.0 }
}

/// `p_omega = (1 - alpha) · p_alpha + alpha · sentiment_norm`.
///
/// This is the only place the blend is computed; `None` when either operand
/// is absent.
pub fn blend(p_alpha: Option<f64>, sentiment_norm: Option<f64>, alpha: Alpha) -> Option<f64> {
  let a = alpha.get();
  Some((1.0 - a) * p_alpha? + a * sentiment_norm?)
}

// ─── p_alpha ─────────────────────────────────────────────────────────────────

/// Whether quant factors enter `p_alpha` as-is or as rolling z-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorScaling {
  #[default]
  Raw,
  Normalized,
}

/// `p_alpha = w_sharpe·sharpe + w_sortino·sortino + w_exp·exp_return + w_var·var`
/// over the chosen [`FactorScaling`]. Absent factors contribute zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PAlphaConfig {
  pub sharpe:     f64,
  pub sortino:    f64,
  pub exp_return: f64,
  pub var:        f64,
  pub scaling:    FactorScaling,
}

impl Default for PAlphaConfig {
  fn default() -> Self {
    Self {
      sharpe:     0.5,
      sortino:    0.0,
      exp_return: 0.5,
      var:        0.0,
      scaling:    FactorScaling::Raw,
    }
  }
}

/// Compute `p_alpha` for each day of `quant`.
///
/// `window_days` is the z-score window used with
/// [`FactorScaling::Normalized`]. A day gets `None` only when every
/// factor with a non-zero weight is absent.
pub fn p_alpha_series(
  cfg: &PAlphaConfig,
  quant: &[QuantFactors],
  window_days: u32,
) -> Vec<Option<f64>> {
  let extract: [(f64, fn(&QuantFactors) -> Option<f64>); 4] = [
    (cfg.sharpe, |q| q.sharpe_30d),
    (cfg.sortino, |q| q.sortino_30d),
    (cfg.exp_return, |q| q.exp_return_30d),
    (cfg.var, |q| q.var_1d_95),
  ];

  let columns: Vec<(f64, Vec<Option<f64>>)> = extract
    .iter()
    .filter(|(w, _)| *w != 0.0)
    .map(|(w, get)| {
      let raw: Vec<Option<f64>> = quant.iter().map(get).collect();
      let col = match cfg.scaling {
        FactorScaling::Raw => raw,
        FactorScaling::Normalized => {
          let points: Vec<NormPoint> = quant
            .iter()
            .zip(&raw)
            .map(|(q, v)| NormPoint { date: q.date, value: *v, article_count: 0 })
            .collect();
          normalize_series(&NormConfig::zscore(window_days), &points)
        }
      };
      (*w, col)
    })
    .collect();

  (0..quant.len())
    .map(|i| {
      let present: Vec<f64> = columns
        .iter()
        .filter_map(|(w, col)| col[i].map(|x| w * x))
        .collect();
      (!present.is_empty()).then(|| present.iter().sum())
    })
    .collect()
}
