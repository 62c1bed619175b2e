//! # Core Type Definitions
//!
//! Identifiers, position domain types, and risk parameters shared across the
//! pool, ledger, and rebalancing modules.

pub mod ids;
pub mod params;
pub mod position;

// Re-export all types
pub use ids::*;
pub use params::*;
pub use position::*;
