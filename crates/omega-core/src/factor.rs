//! Daily factor rows.
//!
//! A [`FactorRow`] is what the engine computes; a [`DailyFactor`] is what the
//! store hands back. The only way to obtain a `DailyFactor` is
//! [`DailyFactor::new`], which derives `p_omega` from the row through
//! [`fusion::blend`], so the blend equation holds for every value in
//! circulation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  fusion::{self, Alpha},
  quant::QuantFactors,
};

/// The writable part of a daily factor; everything except `p_omega` and the
/// row timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
  pub asset:          String,
  #[serde(flatten)]
  pub quant:          QuantFactors,
  pub sentiment_mean: Option<f64>,
  pub sentiment_norm: Option<f64>,
  pub p_alpha:        Option<f64>,
  pub alpha:          Alpha,
}

impl FactorRow {
  pub fn date(&self) -> NaiveDate { self.quant.date }
}

/// A persisted factor row with its derived composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFactor {
  #[serde(flatten)]
  row:        FactorRow,
  p_omega:    Option<f64>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl DailyFactor {
  pub fn new(row: FactorRow, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
    let p_omega = fusion::blend(row.p_alpha, row.sentiment_norm, row.alpha);
    Self { row, p_omega, created_at, updated_at }
  }

  pub fn row(&self) -> &FactorRow { &self.row }

  pub fn asset(&self) -> &str { &self.row.asset }

  pub fn date(&self) -> NaiveDate { self.row.date() }

  pub fn p_omega(&self) -> Option<f64> { self.p_omega }

  pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

  pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

  /// Equal in every field except `updated_at`.
  pub fn same_content(&self, other: &Self) -> bool {
    self.row == other.row && self.p_omega == other.p_omega && self.created_at == other.created_at
  }
}
