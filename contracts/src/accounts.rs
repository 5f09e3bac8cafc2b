//! # Custodial Accounts
//!
//! Internal balances the vault owes each wallet, per asset. The contract
//! holds the real funds under its custody principal on the host ledger;
//! these numbers say how much of that pot belongs to whom.
//!
//! For every asset, the sum over wallets never exceeds what the custody
//! principal holds on the host. Credits and debits here always move in
//! lockstep with a host transfer inside the same call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use warden_protocol::identity::Principal;
use warden_protocol::ledger::{Asset, TokenId};

use crate::error::VaultError;

/// Per-wallet balances, native asset and tokens kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccounts {
    native: HashMap<Principal, u64>,
    tokens: HashMap<TokenId, HashMap<Principal, u64>>,
}

impl LedgerAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `asset` owed to `wallet`. Unknown wallets hold zero.
    pub fn balance(&self, wallet: &Principal, asset: &Asset) -> u64 {
        self.book(asset)
            .and_then(|book| book.get(wallet))
            .copied()
            .unwrap_or(0)
    }

    pub fn native_balance(&self, wallet: &Principal) -> u64 {
        self.balance(wallet, &Asset::Native)
    }

    pub fn token_balance(&self, wallet: &Principal, token: &TokenId) -> u64 {
        self.balance(wallet, &Asset::Token(token.clone()))
    }

    /// Adds `amount` and returns the new balance.
    pub fn credit(&mut self, wallet: &Principal, asset: &Asset, amount: u64) -> Result<u64, VaultError> {
        let entry = self.book_mut(asset).entry(wallet.clone()).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(VaultError::ArithmeticOverflow)?;
        Ok(*entry)
    }

    /// Subtracts `amount` and returns the new balance.
    pub fn debit(&mut self, wallet: &Principal, asset: &Asset, amount: u64) -> Result<u64, VaultError> {
        let available = self.balance(wallet, asset);
        let remaining = available
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance {
                available,
                requested: amount,
            })?;
        self.book_mut(asset).insert(wallet.clone(), remaining);
        Ok(remaining)
    }

    /// Sum of all wallets' balances of `asset`.
    pub fn total(&self, asset: &Asset) -> u128 {
        self.book(asset)
            .map(|book| book.values().map(|v| u128::from(*v)).sum())
            .unwrap_or(0)
    }

    fn book(&self, asset: &Asset) -> Option<&HashMap<Principal, u64>> {
        match asset {
            Asset::Native => Some(&self.native),
            Asset::Token(token) => self.tokens.get(token),
        }
    }

    fn book_mut(&mut self, asset: &Asset) -> &mut HashMap<Principal, u64> {
        match asset {
            Asset::Native => &mut self.native,
            Asset::Token(token) => self.tokens.entry(token.clone()).or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::from("alice")
    }

    #[test]
    fn test_credit_and_debit() {
        let mut accounts = LedgerAccounts::new();
        assert_eq!(accounts.credit(&alice(), &Asset::Native, 500).unwrap(), 500);
        assert_eq!(accounts.debit(&alice(), &Asset::Native, 200).unwrap(), 300);
        assert_eq!(accounts.native_balance(&alice()), 300);
    }

    #[test]
    fn test_overdraw_rejected() {
        let mut accounts = LedgerAccounts::new();
        accounts.credit(&alice(), &Asset::Native, 100).unwrap();
        assert_eq!(
            accounts.debit(&alice(), &Asset::Native, 101),
            Err(VaultError::InsufficientBalance {
                available: 100,
                requested: 101
            })
        );
        assert_eq!(accounts.native_balance(&alice()), 100);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut accounts = LedgerAccounts::new();
        accounts.credit(&alice(), &Asset::Native, u64::MAX).unwrap();
        assert_eq!(
            accounts.credit(&alice(), &Asset::Native, 1),
            Err(VaultError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_tokens_isolated_from_native() {
        let usd = TokenId::from("token.usd");
        let mut accounts = LedgerAccounts::new();
        accounts.credit(&alice(), &Asset::Token(usd.clone()), 70).unwrap();
        assert_eq!(accounts.token_balance(&alice(), &usd), 70);
        assert_eq!(accounts.native_balance(&alice()), 0);
        assert_eq!(accounts.token_balance(&alice(), &"token.eur".into()), 0);
    }

    #[test]
    fn test_total_sums_wallets() {
        let mut accounts = LedgerAccounts::new();
        accounts.credit(&alice(), &Asset::Native, u64::MAX).unwrap();
        accounts.credit(&"bob".into(), &Asset::Native, 1).unwrap();
        assert_eq!(accounts.total(&Asset::Native), u128::from(u64::MAX) + 1);
    }
}
