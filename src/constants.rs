//! # Protocol Constants
//!
//! Fundamental constants for the lending core including:
//! - Fixed-point precision shared by rates, LTV/LT, and health factors
//! - Default fee parameters for the backstop and market pools
//! - Risk parameter bounds enforced at market registration

// ============================================================================
// Fixed-Point Precision
// ============================================================================

/// Shared fixed-point scale: rates, LTV, LT, and health factors are all
/// expressed as fractions of this value (10^9 = 100%).
pub const PRECISION: u64 = 1_000_000_000;

/// Health factor of a debt-free position (100% in `PRECISION` scale)
pub const HEALTH_FACTOR_MAX: u64 = PRECISION;

// ============================================================================
// Fee Parameters
// ============================================================================

/// Default protocol share of accrued interest (10%)
pub const DEFAULT_PROTOCOL_FEE_RATE: u64 = 100_000_000;

/// Default entry fee charged on backstop borrows (0%)
pub const DEFAULT_SUPPORT_FEE_RATE: u64 = 0;

/// Upper bound for any configurable fee rate (100%)
pub const MAX_FEE_RATE: u64 = PRECISION;

// ============================================================================
// Risk Parameter Bounds
// ============================================================================

/// Upper bound for loan-to-value ratios (100%)
pub const MAX_LTV: u64 = PRECISION;

/// Upper bound for liquidation thresholds (100%)
pub const MAX_LT: u64 = PRECISION;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert a whole percentage to a `PRECISION`-scaled rate
pub const fn rate_from_percent(percent: u64) -> u64 {
    percent * (PRECISION / 100)
}

/// True if a `PRECISION`-scaled rate is within the configurable range
pub const fn is_valid_rate(rate: u64) -> bool {
    rate <= MAX_FEE_RATE
}
