//! Error types for `omega-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("alpha must lie in [0, 1], got {0}")]
  AlphaOutOfRange(f64),

  #[error("invalid date range: {from} is after {to}")]
  InvalidRange {
    from: chrono::NaiveDate,
    to:   chrono::NaiveDate,
  },

  #[error("unknown rejection reason: {0:?}")]
  UnknownRejectionReason(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("recompute task failed: {0}")]
  Task(String),
}

impl Error {
  /// Wrap a backend error from a [`FactorStore`](crate::store::FactorStore).
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
