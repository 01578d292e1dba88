//! Domain models for the Materials Back Office

mod document;
mod inventory;

pub use document::*;
pub use inventory::*;
