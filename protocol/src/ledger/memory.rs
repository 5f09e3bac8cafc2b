//! In-memory reference host.

use std::collections::{BTreeMap, BTreeSet};

use super::{Asset, Host, TokenId, TransferError};
use crate::identity::Principal;

/// A complete host ledger held in memory.
///
/// Balances live in ordered maps so snapshots compare and print
/// deterministically. Height only moves when someone calls
/// [`advance_blocks`](Self::advance_blocks).
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    height: u64,
    balances: BTreeMap<Asset, BTreeMap<Principal, u64>>,
    frozen_tokens: BTreeSet<TokenId>,
}

impl InMemoryLedger {
    /// Empty ledger at height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ledger starting at `height`.
    pub fn at_height(height: u64) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    /// Moves the clock forward and returns the new height.
    pub fn advance_blocks(&mut self, blocks: u64) -> u64 {
        self.height = self.height.saturating_add(blocks);
        self.height
    }

    /// Creates `amount` of `asset` out of thin air for `owner`. Genesis and
    /// devnet faucets only.
    pub fn mint(&mut self, asset: &Asset, owner: &Principal, amount: u64) -> Result<u64, TransferError> {
        let entry = self
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(owner.clone())
            .or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow(owner.clone()))?;
        Ok(*entry)
    }

    /// Makes every transfer of `token` fail with [`TransferError::Rejected`].
    pub fn freeze_token(&mut self, token: TokenId) {
        self.frozen_tokens.insert(token);
    }

    pub fn unfreeze_token(&mut self, token: &TokenId) {
        self.frozen_tokens.remove(token);
    }

    /// Sum of all balances of `asset`. Transfers never change it.
    pub fn total_supply(&self, asset: &Asset) -> u128 {
        self.balances
            .get(asset)
            .map(|owners| owners.values().map(|v| u128::from(*v)).sum())
            .unwrap_or(0)
    }
}

impl Host for InMemoryLedger {
    fn block_height(&self) -> u64 {
        self.height
    }

    fn balance_of(&self, asset: &Asset, owner: &Principal) -> u64 {
        self.balances
            .get(asset)
            .and_then(|owners| owners.get(owner))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &Asset,
        from: &Principal,
        to: &Principal,
        amount: u64,
    ) -> Result<(), TransferError> {
        if amount == 0 {
            return Err(TransferError::ZeroAmount);
        }
        if let Asset::Token(token) = asset {
            if self.frozen_tokens.contains(token) {
                return Err(TransferError::Rejected(token.clone()));
            }
        }

        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                asset: asset.clone(),
                owner: from.clone(),
                available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow(to.clone()))?;

        let owners = self.balances.entry(asset.clone()).or_default();
        owners.insert(from.clone(), available - amount);
        owners.insert(to.clone(), credited);

        tracing::trace!(%asset, %from, %to, amount, "host transfer");
        Ok(())
    }
}
