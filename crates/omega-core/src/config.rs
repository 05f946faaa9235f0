//! Engine configuration.
//!
//! Every field has a default so a partial (or empty) configuration file is
//! valid. [`EngineConfig::validate`] is run when the engine is built.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  consensus::ConsensusPolicy,
  fusion::{Alpha, PAlphaConfig},
  normalize::{EvidenceWeighting, NormConfig, NormMethod},
  quant::{QuantConfig, VarMethod},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub alpha:                 Alpha,
  pub vol_window:            usize,
  pub sentiment_window_days: u32,
  pub ema_span:              usize,
  pub norm_method:           NormMethod,
  pub winsor_quantile:       f64,
  pub var_method:            VarMethod,
  pub evidence_weighting:    EvidenceWeighting,
  pub evidence_beta:         f64,
  pub evidence_cap:          f64,
  /// Quote currency of the price series used for quant factors.
  pub currency:              String,
  pub p_alpha:               PAlphaConfig,
  pub consensus:             ConsensusPolicy,
  pub collect:               CollectConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      alpha:                 Alpha::default(),
      vol_window:            30,
      sentiment_window_days: 90,
      ema_span:              30,
      norm_method:           NormMethod::default(),
      winsor_quantile:       0.05,
      var_method:            VarMethod::default(),
      evidence_weighting:    EvidenceWeighting::default(),
      evidence_beta:         0.5,
      evidence_cap:          3.0,
      currency:              "usd".to_owned(),
      p_alpha:               PAlphaConfig::default(),
      consensus:             ConsensusPolicy::default(),
      collect:               CollectConfig::default(),
    }
  }
}

/// Vote collection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
  /// Subjects collected concurrently.
  pub workers:               usize,
  /// Calls per minute allowed to each model.
  pub rate_limit_per_minute: u32,
  /// Deadline for all voters of one subject.
  pub vote_timeout_secs:     u64,
}

impl Default for CollectConfig {
  fn default() -> Self {
    Self {
      workers:               8,
      rate_limit_per_minute: 60,
      vote_timeout_secs:     30,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_owned()));

    if self.vol_window < 2 {
      return invalid("vol_window must be at least 2");
    }
    if self.ema_span == 0 {
      return invalid("ema_span must be positive");
    }
    if self.sentiment_window_days == 0 {
      return invalid("sentiment_window_days must be positive");
    }
    if !(0.0..0.5).contains(&self.winsor_quantile) {
      return invalid("winsor_quantile must lie in [0, 0.5)");
    }
    if !self.evidence_beta.is_finite() || self.evidence_beta < 0.0 {
      return invalid("evidence_beta must be a non-negative number");
    }
    if !self.evidence_cap.is_finite() || self.evidence_cap <= 0.0 {
      return invalid("evidence_cap must be positive");
    }
    if self.currency.trim().is_empty() {
      return invalid("currency must not be empty");
    }
    let weights = [
      self.p_alpha.sharpe,
      self.p_alpha.sortino,
      self.p_alpha.exp_return,
      self.p_alpha.var,
    ];
    if weights.iter().any(|w| !w.is_finite()) {
      return invalid("p_alpha weights must be finite");
    }
    if !(0.0..1.0).contains(&self.consensus.relevance_quorum) {
      return invalid("consensus.relevance_quorum must lie in [0, 1)");
    }
    if self.collect.workers == 0 {
      return invalid("collect.workers must be positive");
    }
    if self.collect.rate_limit_per_minute == 0 {
      return invalid("collect.rate_limit_per_minute must be positive");
    }
    if self.collect.vote_timeout_secs == 0 {
      return invalid("collect.vote_timeout_secs must be positive");
    }
    Ok(())
  }

  pub fn quant(&self) -> QuantConfig {
    QuantConfig {
      window:     self.vol_window,
      ema_span:   self.ema_span,
      var_method: self.var_method,
    }
  }

  pub fn norm(&self) -> NormConfig {
    NormConfig {
      method:          self.norm_method,
      window_days:     self.sentiment_window_days,
      winsor_quantile: self.winsor_quantile,
      evidence:        self.evidence_weighting,
      evidence_beta:   self.evidence_beta,
      evidence_cap:    self.evidence_cap,
    }
  }
}
