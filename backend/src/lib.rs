//! Materials Back Office - Stock Ledger Engine
//!
//! The bookkeeping core for tracking materials across departments:
//! purchases, inter-department transfers, write-offs and physical counts,
//! all feeding an append-only movement ledger with average-cost valuation.
//!
//! The HTTP API, authentication and report presentation live outside this
//! crate and consume the services exposed here.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;

/// Application state shared across the engine's consumers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
}
