//! # Host Ledger Model
//!
//! Warden runs *on* a ledger it does not own. Everything it needs from that
//! ledger fits in one trait, [`Host`]:
//!
//! - a monotonically increasing **block height**, the clock for time-locks;
//! - **balances** of external assets per principal;
//! - **transfers** of those assets, which may fail.
//!
//! The host is `Clone` because the contract layer executes each call
//! against a staged copy of the world and swaps it in only if the call
//! succeeds. A host whose state is too large to clone would implement the
//! same contract with a journal; the in-memory reference host here clones.
//!
//! ```text
//! mod.rs: Host trait, Asset, TokenId, TransferError
//! memory.rs: InMemoryLedger, the reference host for tests and devnet
//! ```

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Principal;

pub use memory::InMemoryLedger;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Identity of an external fungible-token contract.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(contract: impl Into<String>) -> Self {
        Self(contract.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Something a balance can be held in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The host ledger's native currency.
    Native,
    /// A fungible token managed by an external contract.
    Token(TokenId),
}

impl Asset {
    /// `None` for the native asset, the token id otherwise.
    pub fn from_token(token: Option<TokenId>) -> Self {
        match token {
            Some(token) => Asset::Token(token),
            None => Asset::Native,
        }
    }

    pub fn token(&self) -> Option<&TokenId> {
        match self {
            Asset::Native => None,
            Asset::Token(token) => Some(token),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(token) => write!(f, "token:{}", token),
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Reasons the host refuses a transfer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer amount must be greater than zero")]
    ZeroAmount,

    #[error("insufficient {asset} funds for {owner}: available {available}, requested {requested}")]
    InsufficientFunds {
        asset: Asset,
        owner: Principal,
        available: u64,
        requested: u64,
    },

    #[error("token contract {0} rejected the transfer")]
    Rejected(TokenId),

    #[error("balance overflow crediting {0}")]
    Overflow(Principal),
}

/// The ledger Warden is deployed on.
pub trait Host: Clone {
    /// Current block height.
    fn block_height(&self) -> u64;

    /// Balance of `asset` held by `owner`. Unknown owners hold zero.
    fn balance_of(&self, asset: &Asset, owner: &Principal) -> u64;

    /// Moves `amount` of `asset` from `from` to `to`.
    ///
    /// Either the whole amount moves or nothing does.
    fn transfer(
        &mut self,
        asset: &Asset,
        from: &Principal,
        to: &Principal,
        amount: u64,
    ) -> Result<(), TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_from_token_option() {
        assert_eq!(Asset::from_token(None), Asset::Native);
        let t = TokenId::from("token.usd");
        assert_eq!(Asset::from_token(Some(t.clone())).token(), Some(&t));
    }

    #[test]
    fn asset_display() {
        assert_eq!(Asset::Native.to_string(), "native");
        assert_eq!(Asset::Token("token.usd".into()).to_string(), "token:token.usd");
    }
}
