//! Quantitative risk/return factors from a daily price series.
//!
//! [`FactorComputer`] is a per-asset sliding-window accumulator: bars are fed
//! in date order and each call to [`FactorComputer::push`] yields that day's
//! factors. Feeding the same bars always produces the same output, so a
//! computer can be warmed up on history and then continue on new bars.

use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stats::{lower_quantile, mean, sample_std};

/// One-sided 95% normal quantile.
const Z_95: f64 = 1.645;

/// An ordered daily price bar supplied by the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
  pub asset:      String,
  pub provider:   String,
  pub currency:   String,
  pub date:       NaiveDate,
  pub open:       Option<f64>,
  pub high:       Option<f64>,
  pub low:        Option<f64>,
  pub close:      f64,
  pub volume:     Option<f64>,
  pub market_cap: Option<f64>,
}

/// How `var_1d_95` is estimated for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarMethod {
  /// `mean - 1.645 · vol` under a normal assumption.
  #[default]
  Parametric,
  /// 5th percentile of the window's returns.
  Empirical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantConfig {
  /// Observations in the vol/Sharpe/Sortino/VaR window.
  pub window:     usize,
  pub ema_span:   usize,
  pub var_method: VarMethod,
}

impl Default for QuantConfig {
  fn default() -> Self {
    Self {
      window:     30,
      ema_span:   30,
      var_method: VarMethod::default(),
    }
  }
}

/// The quant half of a daily factor row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QuantFactors {
  pub date:           NaiveDate,
  pub ret_1d:         Option<f64>,
  pub vol_30d:        Option<f64>,
  pub sharpe_30d:     Option<f64>,
  pub sortino_30d:    Option<f64>,
  pub var_1d_95:      Option<f64>,
  pub exp_return_30d: Option<f64>,
}

// ─── Rolling window ──────────────────────────────────────────────────────────

/// Fixed-capacity trailing window of return observations.
#[derive(Debug, Clone)]
pub struct RollingWindow {
  capacity: usize,
  values:   VecDeque<f64>,
}

impl RollingWindow {
  pub fn new(capacity: usize) -> Self {
    Self { capacity, values: VecDeque::with_capacity(capacity + 1) }
  }

  pub fn push(&mut self, x: f64) {
    self.values.push_back(x);
    while self.values.len() > self.capacity {
      self.values.pop_front();
    }
  }

  pub fn is_full(&self) -> bool { self.capacity > 0 && self.values.len() == self.capacity }

  pub fn len(&self) -> usize { self.values.len() }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }

  fn as_vec(&self) -> Vec<f64> { self.values.iter().copied().collect() }

  pub fn mean(&self) -> Option<f64> { mean(&self.as_vec()) }

  pub fn sample_std(&self) -> Option<f64> { sample_std(&self.as_vec()) }

  /// Root mean square of the negative part of each observation; `None` when
  /// nothing in the window is below zero.
  pub fn downside_deviation(&self) -> Option<f64> {
    if !self.values.iter().any(|r| *r < 0.0) {
      return None;
    }
    let ss: f64 = self.values.iter().map(|r| r.min(0.0).powi(2)).sum();
    Some((ss / self.values.len() as f64).sqrt())
  }

  pub fn quantile(&self, q: f64) -> Option<f64> { lower_quantile(&self.as_vec(), q) }
}

// ─── EMA ─────────────────────────────────────────────────────────────────────

/// Exponential moving average seeded by the simple mean of the first `span`
/// observations.
#[derive(Debug, Clone)]
struct SeededEma {
  span:  usize,
  k:     f64,
  seed:  Vec<f64>,
  value: Option<f64>,
}

impl SeededEma {
  fn new(span: usize) -> Self {
    Self {
      span,
      k: 2.0 / (span as f64 + 1.0),
      seed: Vec::with_capacity(span),
      value: None,
    }
  }

  fn update(&mut self, x: f64) -> Option<f64> {
    match self.value {
      Some(prev) => self.value = Some(prev + self.k * (x - prev)),
      None => {
        self.seed.push(x);
        if self.seed.len() >= self.span {
          self.value = mean(&self.seed);
          self.seed.clear();
        }
      }
    }
    self.value
  }
}

// ─── Computer ────────────────────────────────────────────────────────────────

/// Incremental per-asset factor computation.
#[derive(Debug, Clone)]
pub struct FactorComputer {
  config:     QuantConfig,
  prev_close: Option<f64>,
  window:     RollingWindow,
  ema:        SeededEma,
}

impl FactorComputer {
  pub fn new(config: QuantConfig) -> Self {
    Self {
      config,
      prev_close: None,
      window: RollingWindow::new(config.window),
      ema: SeededEma::new(config.ema_span),
    }
  }

  /// Feed the next bar (dates must be increasing) and return its factors.
  pub fn push(&mut self, bar: &PriceBar) -> QuantFactors {
    let ret_1d = match self.prev_close {
      Some(prev) if prev != 0.0 => Some(bar.close / prev - 1.0),
      _ => None,
    };
    self.prev_close = Some(bar.close);

    let mut out = QuantFactors { date: bar.date, ret_1d, ..Default::default() };

    let Some(r) = ret_1d else {
      out.exp_return_30d = self.ema.value;
      return out;
    };

    self.window.push(r);
    out.exp_return_30d = self.ema.update(r);

    if !self.window.is_full() {
      return out;
    }

    let mu = self.window.mean();
    // A flat window reports no volatility, which also nulls parametric VaR.
    let vol = self.window.sample_std().filter(|sd| *sd != 0.0);

    out.vol_30d = vol;
    out.sharpe_30d = mu.zip(vol).map(|(m, sd)| m / sd);
    out.sortino_30d = mu
      .zip(self.window.downside_deviation().filter(|d| *d != 0.0))
      .map(|(m, d)| m / d);
    out.var_1d_95 = match self.config.var_method {
      VarMethod::Parametric => mu.zip(vol).map(|(m, sd)| m - Z_95 * sd),
      VarMethod::Empirical => self.window.quantile(0.05),
    };
    out
  }

  /// Run a whole ordered series through a fresh computer.
  pub fn compute_series(config: QuantConfig, bars: &[PriceBar]) -> Vec<QuantFactors> {
    let mut computer = Self::new(config);
    bars.iter().map(|b| computer.push(b)).collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::Days;

  use super::*;

  fn bars(closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    closes
      .iter()
      .enumerate()
      .map(|(i, c)| PriceBar {
        asset:      "BTC".into(),
        provider:   "coingecko".into(),
        currency:   "usd".into(),
        date:       start + Days::new(i as u64),
        open:       None,
        high:       None,
        low:        None,
        close:      *c,
        volume:     None,
        market_cap: None,
      })
      .collect()
  }

  /// Deterministic zig-zag with drift so every window has both signs.
  fn zigzag(n: usize) -> Vec<f64> {
    let mut price = 100.0;
    (0..n)
      .map(|i| {
        price *= if i % 3 == 0 { 0.98 } else { 1.02 };
        price
      })
      .collect()
  }

  #[test]
  fn daily_returns() {
    let out = FactorComputer::compute_series(QuantConfig::default(), &bars(&[100.0, 110.0, 99.0]));
    assert_eq!(out[0].ret_1d, None);
    assert!((out[1].ret_1d.unwrap() - 0.10).abs() < 1e-12);
    assert!((out[2].ret_1d.unwrap() + 0.10).abs() < 1e-12);
  }

  #[test]
  fn zero_prior_close_yields_null_return() {
    let out = FactorComputer::compute_series(QuantConfig::default(), &bars(&[0.0, 5.0]));
    assert_eq!(out[1].ret_1d, None);
  }

  #[test]
  fn short_series_has_no_rolling_stats() {
    let out = FactorComputer::compute_series(QuantConfig::default(), &bars(&zigzag(29)));
    assert!(out.iter().all(|f| f.vol_30d.is_none()));
    assert!(out.iter().all(|f| f.sharpe_30d.is_none()));
    assert!(out.iter().all(|f| f.sortino_30d.is_none()));
    assert!(out.iter().all(|f| f.var_1d_95.is_none()));
  }

  #[test]
  fn rolling_stats_start_once_window_is_full() {
    // 31 bars → 30 returns → only the last day has a full window.
    let out = FactorComputer::compute_series(QuantConfig::default(), &bars(&zigzag(31)));
    assert!(out[29].vol_30d.is_none());
    let last = out[30];
    let vol = last.vol_30d.unwrap();
    assert!(vol > 0.0);
    let rets: Vec<f64> = out.iter().filter_map(|f| f.ret_1d).collect();
    assert_eq!(rets.len(), 30);
    assert!((vol - sample_std(&rets).unwrap()).abs() < 1e-12);
    assert!((last.sharpe_30d.unwrap() - mean(&rets).unwrap() / vol).abs() < 1e-12);
    assert!(last.sortino_30d.is_some());
    let var = last.var_1d_95.unwrap();
    assert!((var - (mean(&rets).unwrap() - 1.645 * vol)).abs() < 1e-12);
  }

  #[test]
  fn empirical_var_is_lower_tail() {
    let cfg = QuantConfig { var_method: VarMethod::Empirical, ..Default::default() };
    let out = FactorComputer::compute_series(cfg, &bars(&zigzag(31)));
    let rets: Vec<f64> = out.iter().filter_map(|f| f.ret_1d).collect();
    let expected = lower_quantile(&rets, 0.05).unwrap();
    assert_eq!(out[30].var_1d_95, Some(expected));
    assert!(expected < 0.0);
  }

  #[test]
  fn sortino_null_without_downside() {
    let closes: Vec<f64> = (0..31).map(|i| 100.0 * 1.01_f64.powi(i) + i as f64).collect();
    let out = FactorComputer::compute_series(QuantConfig::default(), &bars(&closes));
    assert!(out[30].vol_30d.is_some());
    assert_eq!(out[30].sortino_30d, None);
  }

  #[test]
  fn constant_prices_have_degenerate_vol() {
    let out = FactorComputer::compute_series(QuantConfig::default(), &bars(&[50.0; 40]));
    assert!(out[35].ret_1d == Some(0.0));
    assert_eq!(out[35].vol_30d, None);
    assert_eq!(out[35].sharpe_30d, None);
  }

  #[test]
  fn ema_is_seeded_by_first_window_mean() {
    let cfg = QuantConfig { ema_span: 3, ..Default::default() };
    let out = FactorComputer::compute_series(cfg, &bars(&[100.0, 110.0, 99.0, 108.9, 108.9]));
    assert_eq!(out[2].exp_return_30d, None);
    let seed = (0.10 - 0.10 + 0.10) / 3.0;
    assert!((out[3].exp_return_30d.unwrap() - seed).abs() < 1e-9);
    let next = seed + 0.5 * (0.0 - seed);
    assert!((out[4].exp_return_30d.unwrap() - next).abs() < 1e-9);
  }

  #[test]
  fn incremental_matches_batch() {
    let series = bars(&zigzag(60));
    let batch = FactorComputer::compute_series(QuantConfig::default(), &series);
    let mut inc = FactorComputer::new(QuantConfig::default());
    let (head, tail) = series.split_at(25);
    head.iter().for_each(|b| {
      inc.push(b);
    });
    let rest: Vec<QuantFactors> = tail.iter().map(|b| inc.push(b)).collect();
    assert_eq!(&batch[25..], &rest[..]);
  }
}
