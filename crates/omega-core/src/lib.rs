//! Core types, algorithms and the store abstraction for the Omega factor &
//! sentiment fusion engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::FactorStore`]; the HTTP layer and the
//! binary drive an [`engine::FusionEngine`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod article;
pub mod collect;
pub mod config;
pub mod consensus;
pub mod domain;
pub mod engine;
pub mod error;
pub mod factor;
pub mod fusion;
pub mod normalize;
pub mod quant;
pub mod sentiment;
pub mod stats;
pub mod store;
pub mod vote;

pub use error::{Error, Result};
