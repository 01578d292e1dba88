//! Shared types and models for the Materials Back Office
//!
//! This crate contains types shared between the engine backend, the API
//! layer, and reporting consumers of the movement ledger.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
