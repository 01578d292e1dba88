//! Database-facing models for the stock ledger engine
//!
//! Re-exports domain models from the shared crate

pub use shared::models::*;
