//! # Mathematical Functions
//!
//! Pure integer math for share accounting: overflow-checked arithmetic and
//! exchange-rate conversions with explicit rounding direction.

pub mod exchange;
pub mod safe_math;

// Re-export commonly used functions
pub use exchange::*;
pub use safe_math::*;
