//! Domain trust weights.
//!
//! A weight is a bounded multiplier derived from the cumulative harvest and
//! acceptance counters of a news domain, relative to the other domains seen
//! for the same asset. Weights are never stored; they are a pure function of
//! a [`DomainStat`] snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::stats::median;

pub const MIN_WEIGHT: f64 = 0.7;
pub const MAX_WEIGHT: f64 = 1.3;
pub const NEUTRAL_WEIGHT: f64 = 1.0;

const SMOOTHING: f64 = 3.0;
const ACCEPTANCE_SHARE: f64 = 0.6;
const STORAGE_SHARE: f64 = 0.4;

/// Monotone per-(asset, domain) counters maintained by the harvesting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStat {
  pub asset:           String,
  pub domain:          String,
  pub harvested_total: u64,
  pub stored_total:    u64,
  pub llm_accepted:    u64,
  pub llm_rejected:    u64,
}

impl DomainStat {
  /// A zeroed counter row.
  pub fn empty(asset: impl Into<String>, domain: impl Into<String>) -> Self {
    Self {
      asset:           asset.into(),
      domain:          domain.into(),
      harvested_total: 0,
      stored_total:    0,
      llm_accepted:    0,
      llm_rejected:    0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainWeight {
  pub asset:  String,
  pub domain: String,
  /// Always within [`MIN_WEIGHT`, `MAX_WEIGHT`].
  pub weight: f64,
}

/// Compute one weight per row of `stats`.
///
/// All rows are expected to belong to the same asset; medians are taken over
/// the whole slice.
pub fn domain_weights(stats: &[DomainStat]) -> Vec<DomainWeight> {
  let accepted: Vec<f64> = stats.iter().map(|s| s.llm_accepted as f64).collect();
  let stored: Vec<f64> = stats.iter().map(|s| s.stored_total as f64).collect();
  let acc_base = smoothed_base(median(&accepted));
  let store_base = smoothed_base(median(&stored));

  let mut weights: Vec<DomainWeight> = stats
    .iter()
    .map(|s| {
      let acc_norm = (s.llm_accepted as f64 + SMOOTHING) / acc_base;
      let store_norm = (s.stored_total as f64 + SMOOTHING) / store_base;
      let raw = ACCEPTANCE_SHARE * acc_norm + STORAGE_SHARE * store_norm;
      DomainWeight {
        asset:  s.asset.clone(),
        domain: s.domain.clone(),
        weight: raw.clamp(MIN_WEIGHT, MAX_WEIGHT),
      }
    })
    .collect();
  weights.sort_by(|a, b| a.domain.cmp(&b.domain));
  weights
}

/// Denominator for a normalized counter: `median + 3`, with a median of
/// exactly zero replaced by `1`.
fn smoothed_base(median: Option<f64>) -> f64 {
  let m = median.filter(|m| *m != 0.0).unwrap_or(1.0);
  m + SMOOTHING
}

/// Lookup table from domain to weight; unknown domains get
/// [`NEUTRAL_WEIGHT`].
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
  by_domain: HashMap<String, f64>,
}

impl WeightTable {
  pub fn weight_of(&self, domain: Option<&str>) -> f64 {
    domain
      .and_then(|d| self.by_domain.get(d).copied())
      .unwrap_or(NEUTRAL_WEIGHT)
  }
}

impl From<&[DomainWeight]> for WeightTable {
  fn from(weights: &[DomainWeight]) -> Self {
    Self {
      by_domain: weights.iter().map(|w| (w.domain.clone(), w.weight)).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stat(domain: &str, stored: u64, accepted: u64) -> DomainStat {
    DomainStat {
      stored_total: stored,
      harvested_total: stored * 2,
      llm_accepted: accepted,
      ..DomainStat::empty("BTC", domain)
    }
  }

  #[test]
  fn weights_are_bounded() {
    let stats = vec![
      stat("a.com", 0, 0),
      stat("b.com", 10, 5),
      stat("c.com", 1_000, 900),
      stat("d.com", 50, 0),
      stat("e.com", 7, 7),
    ];
    for w in domain_weights(&stats) {
      assert!(
        (MIN_WEIGHT..=MAX_WEIGHT).contains(&w.weight),
        "{} out of bounds: {}",
        w.domain,
        w.weight
      );
    }
  }

  #[test]
  fn zero_history_uses_median_fallback_of_one() {
    let stats = vec![stat("a.com", 0, 0), stat("b.com", 0, 0)];
    let weights = domain_weights(&stats);
    // (0 + 3) / (1 + 3) = 0.75 for both normalized counters.
    assert!(weights.iter().all(|w| (w.weight - 0.75).abs() < 1e-12));
  }

  #[test]
  fn zero_median_keeps_acceptance_signal() {
    let stats = vec![stat("a.com", 0, 0), stat("b.com", 0, 0), stat("good.com", 100, 80)];
    let weights = domain_weights(&stats);
    let a = weights.iter().find(|w| w.domain == "a.com").unwrap();
    let good = weights.iter().find(|w| w.domain == "good.com").unwrap();
    assert!((a.weight - 0.75).abs() < 1e-12);
    assert_eq!(good.weight, MAX_WEIGHT);
    assert!(a.weight < good.weight);
  }

  #[test]
  fn median_domain_is_neutral() {
    let stats = vec![stat("a.com", 5, 2), stat("b.com", 10, 4), stat("c.com", 20, 8)];
    let weights = domain_weights(&stats);
    let b = weights.iter().find(|w| w.domain == "b.com").unwrap();
    assert!((b.weight - 1.0).abs() < 1e-12);
  }

  #[test]
  fn never_accepted_domain_hits_the_floor() {
    let stats = vec![stat("spam.com", 10, 0), stat("b.com", 10, 10), stat("c.com", 10, 10)];
    let weights = domain_weights(&stats);
    let spam = weights.iter().find(|w| w.domain == "spam.com").unwrap();
    let b = weights.iter().find(|w| w.domain == "b.com").unwrap();
    // 0.6 · 3/13 + 0.4 · 13/13 ≈ 0.54 → clamped
    assert_eq!(spam.weight, MIN_WEIGHT);
    assert!((b.weight - 1.0).abs() < 1e-12);
  }

  #[test]
  fn unknown_domain_is_neutral() {
    let table = WeightTable::from(&domain_weights(&[stat("a.com", 1, 1)])[..]);
    assert_eq!(table.weight_of(Some("zzz.com")), NEUTRAL_WEIGHT);
    assert_eq!(table.weight_of(None), NEUTRAL_WEIGHT);
  }
}
