//! # Vault Operations
//!
//! Deposits, withdrawals, the time-lock queue, and per-wallet limits.
//!
//! Funds sit under the contract's custody principal on the host. A deposit
//! moves host funds from the caller into custody and credits the caller's
//! internal balance; a withdrawal debits the internal balance and moves
//! host funds from custody to the recipient. Both sides happen inside one
//! staged call, so they commit together or not at all.
//!
//! Withdrawals, cancellations, and limit changes need a passkey assertion
//! from the wallet on top of being sent by it. Executing an unlocked
//! request does not: anyone may push it through, and the funds can only go
//! to the recipient fixed at request time.

use tracing::info;
use warden_protocol::identity::Principal;
use warden_protocol::ledger::{Asset, Host, TokenId};

use crate::authenticator::PasskeyAssertion;
use crate::contract::{Stage, Warden};
use crate::error::VaultError;
use crate::events::WardenEvent;
use crate::withdrawal::{UserLimits, WithdrawalOutcome};

impl<H: Host> Stage<'_, H> {
    /// Custody moves funds on the host for everyone else; a host transfer
    /// from or to itself moves nothing.
    pub(crate) fn ensure_not_custody(&self, who: &Principal) -> Result<(), VaultError> {
        if who == &self.env.custody {
            return Err(VaultError::CustodyPrincipal);
        }
        Ok(())
    }

    /// Pulls `amount` of `asset` from `wallet` into custody and credits it.
    /// Returns the new internal balance.
    pub(crate) fn deposit(&mut self, wallet: &Principal, asset: &Asset, amount: u64) -> Result<u64, VaultError> {
        self.ensure_not_custody(wallet)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        self.host
            .transfer(asset, wallet, &self.env.custody, amount)?;
        let balance = self.state.accounts.credit(wallet, asset, amount)?;
        self.state.total_deposits = self.state.total_deposits.saturating_add(1);
        Ok(balance)
    }

    /// Debits `wallet` and pays `recipient` out of custody.
    pub(crate) fn pay_out(
        &mut self,
        wallet: &Principal,
        asset: &Asset,
        amount: u64,
        recipient: &Principal,
    ) -> Result<(), VaultError> {
        self.ensure_not_custody(recipient)?;
        self.state.accounts.debit(wallet, asset, amount)?;
        self.host
            .transfer(asset, &self.env.custody, recipient, amount)?;
        self.state.total_withdrawals = self.state.total_withdrawals.saturating_add(1);
        Ok(())
    }

    fn deposit_and_log(&mut self, wallet: &Principal, asset: Asset, amount: u64) -> Result<u64, VaultError> {
        let balance = self.deposit(wallet, &asset, amount)?;
        let height = self.height();
        info!(%wallet, %asset, amount, balance, "deposit");
        self.emit(WardenEvent::Deposited {
            wallet: wallet.clone(),
            asset,
            amount,
            balance,
            height,
        });
        Ok(balance)
    }

    fn withdraw(
        &mut self,
        wallet: &Principal,
        amount: u64,
        recipient: &Principal,
        token: Option<TokenId>,
        assertion: &PasskeyAssertion,
    ) -> Result<WithdrawalOutcome, VaultError> {
        self.authenticate(wallet, assertion, None)?;
        self.ensure_not_custody(wallet)?;
        self.ensure_not_custody(recipient)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let asset = Asset::from_token(token.clone());
        let available = self.state.accounts.balance(wallet, &asset);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let height = self.height();
        let limits = self
            .state
            .withdrawals
            .effective_limits(wallet, &self.env.params);

        if !limits.requires_lock(amount) {
            self.pay_out(wallet, &asset, amount, recipient)?;
            info!(%wallet, %asset, amount, %recipient, "immediate withdrawal");
            self.emit(WardenEvent::WithdrawalExecuted {
                wallet: wallet.clone(),
                asset,
                amount,
                recipient: recipient.clone(),
                request_id: None,
                height,
            });
            return Ok(WithdrawalOutcome::Immediate);
        }

        let request_id =
            self.state
                .withdrawals
                .enqueue(wallet, amount, recipient.clone(), token, height)?;
        let unlock_height = height.saturating_add(limits.lock_period);
        info!(%wallet, %asset, amount, request_id, unlock_height, "withdrawal queued");
        self.emit(WardenEvent::WithdrawalQueued {
            wallet: wallet.clone(),
            request_id,
            asset,
            amount,
            recipient: recipient.clone(),
            unlock_height,
            height,
        });
        Ok(WithdrawalOutcome::Queued(request_id))
    }

    fn execute_pending(&mut self, wallet: &Principal, request_id: u64) -> Result<(), VaultError> {
        let height = self.height();
        let lock_period = self
            .state
            .withdrawals
            .effective_limits(wallet, &self.env.params)
            .lock_period;
        let request = self
            .state
            .withdrawals
            .executable(wallet, request_id, lock_period, height)?
            .clone();

        let asset = request.asset();
        self.pay_out(wallet, &asset, request.amount, &request.recipient)?;
        self.state.withdrawals.mark_executed(wallet, request_id)?;
        info!(%wallet, request_id, amount = request.amount, "pending withdrawal executed");
        self.emit(WardenEvent::WithdrawalExecuted {
            wallet: wallet.clone(),
            asset,
            amount: request.amount,
            recipient: request.recipient,
            request_id: Some(request_id),
            height,
        });
        Ok(())
    }

    fn cancel_pending(
        &mut self,
        wallet: &Principal,
        request_id: u64,
        assertion: &PasskeyAssertion,
    ) -> Result<(), VaultError> {
        self.authenticate(wallet, assertion, None)?;
        if self.state.withdrawals.cancel(wallet, request_id)? {
            let height = self.height();
            info!(%wallet, request_id, "pending withdrawal cancelled");
            self.emit(WardenEvent::WithdrawalCancelled {
                wallet: wallet.clone(),
                request_id,
                height,
            });
        }
        Ok(())
    }

    fn set_limits(
        &mut self,
        wallet: &Principal,
        threshold: u64,
        lock_period: u64,
        assertion: &PasskeyAssertion,
    ) -> Result<UserLimits, VaultError> {
        self.authenticate(wallet, assertion, None)?;
        let limits = UserLimits::new(threshold, lock_period)?;
        self.state.withdrawals.set_limits(wallet, limits);
        let height = self.height();
        info!(%wallet, threshold, lock_period, "limits updated");
        self.emit(WardenEvent::LimitsUpdated {
            wallet: wallet.clone(),
            threshold,
            lock_period,
            height,
        });
        Ok(limits)
    }
}

impl<H: Host> Warden<H> {
    /// Deposits `amount` of the native asset from the caller. Returns the
    /// caller's new balance.
    pub fn deposit_native(&mut self, caller: &Principal, amount: u64) -> Result<u64, VaultError> {
        self.transact("deposit_native", |s| {
            s.deposit_and_log(caller, Asset::Native, amount)
        })
    }

    /// Deposits `amount` of `token` from the caller.
    pub fn deposit_token(&mut self, caller: &Principal, token: &TokenId, amount: u64) -> Result<u64, VaultError> {
        self.transact("deposit_token", |s| {
            s.deposit_and_log(caller, Asset::Token(token.clone()), amount)
        })
    }

    /// Withdraws to `recipient`, immediately if `amount` is below the
    /// caller's threshold, otherwise through the time-lock queue.
    ///
    /// Checked in order: assertion, positive amount, balance, then the
    /// threshold decides the path. A queued request reserves nothing; the
    /// balance is checked again when it executes.
    pub fn withdraw(
        &mut self,
        caller: &Principal,
        amount: u64,
        recipient: &Principal,
        token: Option<&TokenId>,
        assertion: &PasskeyAssertion,
    ) -> Result<WithdrawalOutcome, VaultError> {
        self.transact("withdraw", |s| {
            s.withdraw(caller, amount, recipient, token.cloned(), assertion)
        })
    }

    /// Executes an unlocked request of `wallet`. Callable by anyone.
    pub fn execute_pending(&mut self, wallet: &Principal, request_id: u64) -> Result<(), VaultError> {
        self.transact("execute_pending", |s| s.execute_pending(wallet, request_id))
    }

    /// Cancels one of the caller's queued requests. Cancelling twice is a
    /// no-op; cancelling an executed request fails.
    pub fn cancel_pending(
        &mut self,
        caller: &Principal,
        request_id: u64,
        assertion: &PasskeyAssertion,
    ) -> Result<(), VaultError> {
        self.transact("cancel_pending", |s| s.cancel_pending(caller, request_id, assertion))
    }

    /// Replaces the caller's withdrawal limits.
    pub fn set_limits(
        &mut self,
        caller: &Principal,
        threshold: u64,
        lock_period: u64,
        assertion: &PasskeyAssertion,
    ) -> Result<UserLimits, VaultError> {
        self.transact("set_limits", |s| {
            s.set_limits(caller, threshold, lock_period, assertion)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use warden_protocol::config::VaultParams;
    use warden_protocol::crypto::{MessageDigest, PasskeyKeypair};
    use warden_protocol::identity::CredentialId;
    use warden_protocol::ledger::{InMemoryLedger, TransferError};

    struct Wallet {
        id: Principal,
        device: PasskeyKeypair,
        cred: CredentialId,
    }

    impl Wallet {
        fn assert(&self, message: &[u8]) -> PasskeyAssertion {
            let digest = MessageDigest::of(message);
            PasskeyAssertion::new(self.cred, digest, self.device.sign_digest(&digest).unwrap())
        }
    }

    fn setup(funds: u64) -> (Warden<InMemoryLedger>, Wallet) {
        let mut warden =
            Warden::deploy("admin".into(), InMemoryLedger::new(), VaultParams::default()).unwrap();
        let wallet = Wallet {
            id: "alice".into(),
            device: PasskeyKeypair::generate(),
            cred: CredentialId::from_raw_id(b"alice-laptop"),
        };
        warden
            .register_passkey(&wallet.id, wallet.cred, wallet.device.public_key().as_bytes(), "laptop")
            .unwrap();
        warden
            .host_mut()
            .mint(&Asset::Native, &wallet.id, funds)
            .unwrap();
        (warden, wallet)
    }

    #[test]
    fn test_deposit_moves_host_funds_into_custody() {
        let (mut warden, alice) = setup(5_000);
        assert_eq!(warden.deposit_native(&alice.id, 3_000).unwrap(), 3_000);

        let custody = warden.custody().clone();
        assert_eq!(warden.host().balance_of(&Asset::Native, &alice.id), 2_000);
        assert_eq!(warden.host().balance_of(&Asset::Native, &custody), 3_000);
        assert_eq!(warden.stats().total_deposits, 1);
    }

    #[test]
    fn test_deposit_zero_rejected() {
        let (mut warden, alice) = setup(5_000);
        assert_eq!(warden.deposit_native(&alice.id, 0), Err(VaultError::InvalidAmount));
    }

    #[test]
    fn test_deposit_without_host_funds_fails_cleanly() {
        let (mut warden, alice) = setup(100);
        let err = warden.deposit_native(&alice.id, 101).unwrap_err();
        assert!(matches!(
            err,
            VaultError::TransferFailed(TransferError::InsufficientFunds { .. })
        ));
        assert_eq!(warden.get_balance(&alice.id), 0);
        assert_eq!(warden.stats().total_deposits, 0);
    }

    #[test]
    fn test_immediate_withdrawal_pays_recipient() {
        let (mut warden, alice) = setup(5_000);
        warden.deposit_native(&alice.id, 5_000).unwrap();

        let bob = Principal::from("bob");
        let outcome = warden
            .withdraw(&alice.id, 1_200, &bob, None, &alice.assert(b"w1"))
            .unwrap();
        assert_eq!(outcome, WithdrawalOutcome::Immediate);
        assert_eq!(warden.get_balance(&alice.id), 3_800);
        assert_eq!(warden.host().balance_of(&Asset::Native, &bob), 1_200);
        assert_eq!(warden.stats().total_withdrawals, 1);
    }

    #[test]
    fn test_withdraw_checks_auth_before_amount() {
        let (mut warden, alice) = setup(0);
        let mut bad = alice.assert(b"w");
        bad.digest = MessageDigest::of(b"something else");
        assert_eq!(
            warden.withdraw(&alice.id, 0, &"bob".into(), None, &bad),
            Err(VaultError::AuthenticationFailed(AuthError::InvalidSignature))
        );
        assert_eq!(
            warden.withdraw(&alice.id, 0, &"bob".into(), None, &alice.assert(b"w")),
            Err(VaultError::InvalidAmount)
        );
    }

    #[test]
    fn test_failed_withdrawal_does_not_count_verification() {
        let (mut warden, alice) = setup(10);
        warden.deposit_native(&alice.id, 10).unwrap();
        assert!(warden
            .withdraw(&alice.id, 11, &"bob".into(), None, &alice.assert(b"w"))
            .is_err());
        assert_eq!(warden.get_passkey(&alice.id, &alice.cred).unwrap().verification_count, 0);
        assert_eq!(warden.stats().total_verifications, 0);
    }

    #[test]
    fn test_queued_request_executes_after_lock() {
        let (mut warden, alice) = setup(2_000_000);
        warden.deposit_native(&alice.id, 2_000_000).unwrap();
        let bob = Principal::from("bob");

        let outcome = warden
            .withdraw(&alice.id, 1_500_000, &bob, None, &alice.assert(b"big"))
            .unwrap();
        let WithdrawalOutcome::Queued(id) = outcome else {
            panic!("expected a queued withdrawal, got {outcome:?}");
        };
        assert_eq!(warden.get_balance(&alice.id), 2_000_000);
        assert_eq!(warden.blocks_until_unlock(&alice.id, id), Some(144));

        warden.host_mut().advance_blocks(143);
        assert_eq!(
            warden.execute_pending(&alice.id, id),
            Err(VaultError::WithdrawalLocked { remaining: 1 })
        );
        warden.host_mut().advance_blocks(1);
        assert!(warden.is_withdrawal_ready(&alice.id, id));
        warden.execute_pending(&alice.id, id).unwrap();

        assert_eq!(warden.get_balance(&alice.id), 500_000);
        assert_eq!(warden.host().balance_of(&Asset::Native, &bob), 1_500_000);
        assert_eq!(
            warden.execute_pending(&alice.id, id),
            Err(VaultError::WithdrawalExecuted(id))
        );
    }

    #[test]
    fn test_execute_rechecks_balance() {
        let (mut warden, alice) = setup(1_500_000);
        warden.deposit_native(&alice.id, 1_500_000).unwrap();
        let bob = Principal::from("bob");
        let outcome = warden
            .withdraw(&alice.id, 1_000_000, &bob, None, &alice.assert(b"big"))
            .unwrap();
        // Drain below the queued amount with an immediate withdrawal.
        warden
            .withdraw(&alice.id, 600_000, &bob, None, &alice.assert(b"small"))
            .unwrap();
        warden.host_mut().advance_blocks(144);

        assert_eq!(
            warden.execute_pending(&alice.id, outcome.request_id()),
            Err(VaultError::InsufficientBalance {
                available: 900_000,
                requested: 1_000_000
            })
        );
        assert!(warden
            .get_pending_withdrawal(&alice.id, outcome.request_id())
            .is_some_and(|r| !r.is_executed()));
    }

    #[test]
    fn test_cancel_twice_emits_once() {
        let (mut warden, alice) = setup(1_000_000);
        warden.deposit_native(&alice.id, 1_000_000).unwrap();
        let id = warden
            .withdraw(&alice.id, 1_000_000, &"bob".into(), None, &alice.assert(b"q"))
            .unwrap()
            .request_id();

        warden.cancel_pending(&alice.id, id, &alice.assert(b"c1")).unwrap();
        warden.cancel_pending(&alice.id, id, &alice.assert(b"c2")).unwrap();
        let cancels = warden
            .events()
            .iter()
            .filter(|r| matches!(r.event, WardenEvent::WithdrawalCancelled { .. }))
            .count();
        assert_eq!(cancels, 1);

        warden.host_mut().advance_blocks(144);
        assert_eq!(
            warden.execute_pending(&alice.id, id),
            Err(VaultError::WithdrawalCancelled(id))
        );
    }

    #[test]
    fn test_set_limits_validates() {
        let (mut warden, alice) = setup(0);
        assert_eq!(
            warden.set_limits(&alice.id, 500, 0, &alice.assert(b"l")),
            Err(VaultError::InvalidLimits)
        );
        let limits = warden
            .set_limits(&alice.id, 500, 10, &alice.assert(b"l"))
            .unwrap();
        assert_eq!(warden.get_limits(&alice.id), limits);
    }

    #[test]
    fn test_frozen_token_withdrawal_rolls_back_debit() {
        let (mut warden, alice) = setup(0);
        let usd = TokenId::from("token.usd");
        warden
            .host_mut()
            .mint(&Asset::Token(usd.clone()), &alice.id, 100)
            .unwrap();
        warden.deposit_token(&alice.id, &usd, 100).unwrap();
        warden.host_mut().freeze_token(usd.clone());

        let err = warden
            .withdraw(&alice.id, 40, &"bob".into(), Some(&usd), &alice.assert(b"t"))
            .unwrap_err();
        assert!(matches!(err, VaultError::TransferFailed(TransferError::Rejected(_))));
        assert_eq!(warden.get_token_balance(&alice.id, &usd), 100);
    }
}
