//! JSON REST API for the Omega fusion engine.
//!
//! Exposes an axum [`Router`] backed by a [`FusionEngine`] over any
//! [`omega_core::store::FactorStore`]. TLS and auth are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", omega_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod factors;
pub mod recompute;
pub mod sentiment;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use omega_core::{engine::FusionEngine, store::FactorStore};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<FusionEngine<S>>) -> Router<()>
where
  S: FactorStore + 'static,
{
  Router::new()
    // Factors
    .route("/assets/{asset}/factors", get(factors::list::<S>))
    .route("/assets/{asset}/factors/{date}", get(factors::get_one::<S>))
    // Snapshots
    .route("/assets/{asset}/sentiment", get(sentiment::daily::<S>))
    .route("/assets/{asset}/domain-weights", get(sentiment::domain_weights::<S>))
    // Recompute
    .route("/assets/{asset}/recompute", post(recompute::handler::<S>))
    .with_state(engine)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────
