//! Handlers for sentiment and domain-trust snapshots.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/assets/{asset}/sentiment` | `?from&to`; days without signal have a null mean |
//! | `GET`  | `/assets/{asset}/domain-weights` | Computed from the current domain statistics |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use omega_core::{
  domain::DomainWeight,
  engine::FusionEngine,
  sentiment::DailySentiment,
  store::{DateRange, FactorStore},
};

use crate::{error::ApiError, factors::RangeParams};

/// `GET /assets/{asset}/sentiment?from=<date>&to=<date>`
pub async fn daily<S>(
  State(engine): State<Arc<FusionEngine<S>>>,
  Path(asset): Path<String>,
  Query(params): Query<RangeParams>,
) -> Result<Json<Vec<DailySentiment>>, ApiError>
where
  S: FactorStore + 'static,
{
  let range = DateRange::new(params.from, params.to)?;
  Ok(Json(engine.daily_sentiment(&asset, range).await?))
}

/// `GET /assets/{asset}/domain-weights`
pub async fn domain_weights<S>(
  State(engine): State<Arc<FusionEngine<S>>>,
  Path(asset): Path<String>,
) -> Result<Json<Vec<DomainWeight>>, ApiError>
where
  S: FactorStore + 'static,
{
  Ok(Json(engine.domain_weights(&asset).await?))
}
