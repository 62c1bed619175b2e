//! # Core Error Types
//!
//! Typed failures for every precondition the core checks. Errors fall into
//! three protocol-level classes (validation, insufficient funds, permission);
//! the classifier methods at the bottom encode that taxonomy for hosts that
//! map failures onto their own status codes.

use thiserror::Error;

/// Core protocol errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum UmbraCoreError {
    // ========================================================================
    // Math Errors
    // ========================================================================

    #[error("Math overflow")]
    MathOverflow,

    #[error("Math underflow")]
    MathUnderflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Mul div overflow")]
    MulDivOverflow,

    // ========================================================================
    // Validation Errors
    // ========================================================================

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Zero amount")]
    ZeroAmount,

    #[error("Invalid market")]
    InvalidMarket,

    #[error("Unsupported market")]
    UnsupportedMarket,

    #[error("Duplicate market")]
    DuplicateMarket,

    #[error("Invalid fee rate")]
    InvalidRate,

    #[error("Invalid risk parameters")]
    InvalidRiskParams,

    #[error("Invalid price")]
    InvalidPrice,

    #[error("Price unavailable")]
    PriceUnavailable,

    // ========================================================================
    // Insufficient Funds Errors
    // ========================================================================

    #[error("Exceeds pool liquidity")]
    ExceedsLiquidity,

    #[error("Exceeds deposited balance")]
    ExceedsDeposited,

    #[error("Insufficient borrow capacity")]
    InsufficientCapacity,

    // ========================================================================
    // Permission Errors
    // ========================================================================

    #[error("Unauthorized")]
    Unauthorized,
}

/// Result type using core errors
pub type CoreResult<T> = Result<T, UmbraCoreError>;

impl UmbraCoreError {
    /// True for precondition failures on the request itself. Math failures
    /// count as validation: they mean the request asked for an unrepresentable
    /// state, not that funds were missing.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MathOverflow
                | Self::MathUnderflow
                | Self::DivisionByZero
                | Self::MulDivOverflow
                | Self::InvalidAmount
                | Self::ZeroAmount
                | Self::InvalidMarket
                | Self::UnsupportedMarket
                | Self::DuplicateMarket
                | Self::InvalidRate
                | Self::InvalidRiskParams
                | Self::InvalidPrice
                | Self::PriceUnavailable
        )
    }

    /// True when the request was well-formed but balances could not cover it
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            Self::ExceedsLiquidity | Self::ExceedsDeposited | Self::InsufficientCapacity
        )
    }

    /// True for administrative calls from a non-owner
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
