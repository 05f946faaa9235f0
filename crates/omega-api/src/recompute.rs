//! `POST /assets/{asset}/recompute`, body: `{"from":"2024-01-01","to":"2024-01-31"}`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use omega_core::{
  engine::{FusionEngine, RecomputeReport},
  store::{DateRange, FactorStore},
};
use tracing::info;

use crate::{error::ApiError, factors::RangeParams};

pub async fn handler<S>(
  State(engine): State<Arc<FusionEngine<S>>>,
  Path(asset): Path<String>,
  Json(body): Json<RangeParams>,
) -> Result<Json<RecomputeReport>, ApiError>
where
  S: FactorStore + 'static,
{
  let range = DateRange::new(body.from, body.to)?;
  info!(%asset, from = %range.from(), to = %range.to(), "recompute requested");
  Ok(Json(engine.recompute(&asset, range).await?))
}
