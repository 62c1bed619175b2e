//! # Identifiers
//!
//! Stable ids assigned by the host dispatch layer. The core never interprets
//! them beyond equality and map keying.

use std::fmt;

#[cfg(feature = "client")]
use serde::{Deserialize, Serialize};

/// Identifier of a listed market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct MarketId(pub u32);

impl MarketId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market#{}", self.0)
    }
}

/// Identifier of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct AccountId(pub u32);

impl AccountId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account#{}", self.0)
    }
}
