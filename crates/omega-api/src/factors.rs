//! Handlers for `/assets/{asset}/factors` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/assets/{asset}/factors` | `?from=YYYY-MM-DD&to=YYYY-MM-DD`, inclusive |
//! | `GET`  | `/assets/{asset}/factors/{date}` | 404 if no row |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use omega_core::{
  engine::FusionEngine,
  factor::DailyFactor,
  store::{DateRange, FactorStore},
};
use serde::Deserialize;

use crate::error::ApiError;

/// Inclusive day range shared by the list endpoints.
#[derive(Debug, Deserialize)]
pub struct RangeParams {
  pub from: NaiveDate,
  pub to:   NaiveDate,
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /assets/{asset}/factors?from=<date>&to=<date>`
pub async fn list<S>(
  State(engine): State<Arc<FusionEngine<S>>>,
  Path(asset): Path<String>,
  Query(params): Query<RangeParams>,
) -> Result<Json<Vec<DailyFactor>>, ApiError>
where
  S: FactorStore + 'static,
{
  let range = DateRange::new(params.from, params.to)?;
  let factors = engine.factors(&asset, range).await?;
  Ok(Json(factors))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /assets/{asset}/factors/{date}`
pub async fn get_one<S>(
  State(engine): State<Arc<FusionEngine<S>>>,
  Path((asset, date)): Path<(String, NaiveDate)>,
) -> Result<Json<DailyFactor>, ApiError>
where
  S: FactorStore + 'static,
{
  let factor = engine
    .factor(&asset, date)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("no factors for {asset} on {date}")))?;
  Ok(Json(factor))
}
