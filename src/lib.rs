//! # Umbra Core - Lending Protocol Accounting Logic
//!
//! This crate contains the balance-accounting and capital-rebalancing core of
//! the Umbra lending protocol. It provides:
//!
//! - Exchange-rate share accounting for pooled value (deposits, debt, fees)
//! - The protocol backstop liquidity pool and its administrative surface
//! - Per-market asset/shadow pool pairs and the account position ledger
//! - The rebalancing optimizer that restructures multi-market positions so a
//!   requested borrow or repay lands within risk limits in one atomic call
//!
//! The crate is a pure state-transition library: the host dispatch layer owns
//! authentication, token transfer, and persistence, and drives this crate with
//! an identity, a market, and an amount. One call is one atomic transition;
//! every failed precondition leaves state untouched.
//!
//! ## Feature Flags
//!
//! - `client`: Enables standard serialization for off-chain use

// Re-export all modules
pub mod backstop;
pub mod constants;
pub mod errors;
pub mod ledger;
pub mod math;
pub mod oracle;
pub mod pool;
pub mod rebalance;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use errors::{CoreResult, UmbraCoreError};
pub use rebalance::{borrow_with_rebalance, repay_shadow};
pub use store::ProtocolStore;
pub use types::*;
