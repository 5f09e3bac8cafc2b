//! # Warden Contract
//!
//! The deployed contract: one [`Warden`] owns the credential registry, the
//! authenticator, the custodial accounts, and the withdrawal queue, and
//! runs on top of a [`Host`] ledger.
//!
//! ## Atomicity
//!
//! Every state-changing call runs through [`Warden::transact`]. The call
//! works on a staged copy of the contract state *and* the host. If it
//! returns `Ok`, the staged copies replace the live ones and its events are
//! appended to the log. If it returns `Err`, the copies are dropped: no
//! balance, counter, flag, or host transfer from a failed call survives.
//! This is what makes a batch all-or-nothing and what keeps a failed host
//! transfer from leaving an internal debit behind.
//!
//! Callers are identified by [`Principal`]. The host is trusted to have
//! authenticated the transaction sender; passkeys add a second factor on
//! top for the vault's sensitive operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_protocol::config::{ParamsError, VaultParams};
use warden_protocol::crypto::{MessageDigest, PasskeyPublicKey, PasskeySignature};
use warden_protocol::identity::{CredentialId, Principal};
use warden_protocol::ledger::{Asset, Host, TokenId};

use crate::accounts::LedgerAccounts;
use crate::authenticator::{Authenticator, PasskeyAssertion, Verification};
use crate::error::{AuthError, ErrorCode};
use crate::events::{EventRecord, WardenEvent};
use crate::passkey_registry::{Passkey, PasskeyRegistry};
use crate::withdrawal::{PendingWithdrawal, UserLimits, WithdrawalQueue};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the contract persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct WardenState {
    pub(crate) registry: PasskeyRegistry,
    pub(crate) authenticator: Authenticator,
    pub(crate) accounts: LedgerAccounts,
    pub(crate) withdrawals: WithdrawalQueue,
    /// Committed deposit operations, every asset.
    pub(crate) total_deposits: u64,
    /// Committed withdrawals that moved funds out, every asset.
    pub(crate) total_withdrawals: u64,
}

/// Fixed at deployment.
#[derive(Debug, Clone)]
pub(crate) struct Env {
    pub(crate) deployer: Principal,
    pub(crate) custody: Principal,
    pub(crate) params: VaultParams,
}

/// Protocol-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub total_deposits: u64,
    pub total_withdrawals: u64,
    pub total_passkeys_registered: u64,
    pub total_verifications: u64,
    /// Last issued withdrawal request id.
    pub withdrawal_request_nonce: u64,
    /// Requests still waiting to execute.
    pub queued_withdrawals: usize,
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Working copy of the world for one call.
pub(crate) struct Stage<'a, H> {
    pub(crate) env: &'a Env,
    pub(crate) state: WardenState,
    pub(crate) host: H,
    events: Vec<WardenEvent>,
}

impl<'a, H: Host> Stage<'a, H> {
    fn new(env: &'a Env, state: WardenState, host: H) -> Self {
        Self {
            env,
            state,
            host,
            events: Vec::new(),
        }
    }

    pub(crate) fn height(&self) -> u64 {
        self.host.block_height()
    }

    pub(crate) fn emit(&mut self, event: WardenEvent) {
        self.events.push(event);
    }

    /// Runs the authenticator against the staged registry and logs the
    /// success event.
    pub(crate) fn authenticate(
        &mut self,
        wallet: &Principal,
        assertion: &PasskeyAssertion,
        expected_nonce: Option<u64>,
    ) -> Result<Verification, AuthError> {
        let height = self.height();
        let WardenState {
            registry,
            authenticator,
            ..
        } = &mut self.state;
        let verification = match expected_nonce {
            None => authenticator.authenticate(
                registry,
                wallet,
                &assertion.credential_id,
                &assertion.digest,
                &assertion.signature,
                height,
            )?,
            Some(nonce) => authenticator.authenticate_with_nonce(
                registry,
                wallet,
                &assertion.credential_id,
                &assertion.digest,
                &assertion.signature,
                nonce,
                height,
            )?,
        };
        self.emit(WardenEvent::Authenticated {
            wallet: wallet.clone(),
            credential_id: verification.credential_id,
            verification_count: verification.verification_count,
            nonce: verification.nonce,
            height,
        });
        Ok(verification)
    }

    fn register_passkey(
        &mut self,
        wallet: &Principal,
        credential_id: CredentialId,
        public_key: &[u8],
        name: &str,
    ) -> Result<(), AuthError> {
        let height = self.height();
        self.state
            .registry
            .register(wallet, credential_id, public_key, name, height)?;
        info!(%wallet, %credential_id, "passkey registered");
        self.emit(WardenEvent::PasskeyRegistered {
            wallet: wallet.clone(),
            credential_id,
            name: name.to_string(),
            height,
        });
        Ok(())
    }

    fn revoke_passkey(
        &mut self,
        wallet: &Principal,
        credential_id: CredentialId,
        by_admin: bool,
    ) -> Result<(), AuthError> {
        let height = self.height();
        let was_active = self.state.registry.revoke(wallet, &credential_id)?;
        if was_active {
            info!(%wallet, %credential_id, by_admin, "passkey revoked");
        }
        self.emit(WardenEvent::PasskeyRevoked {
            wallet: wallet.clone(),
            credential_id,
            by_admin,
            height,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A deployed Warden contract on host `H`.
pub struct Warden<H: Host> {
    env: Env,
    state: WardenState,
    host: H,
    events: Vec<EventRecord>,
}

impl<H: Host> fmt::Debug for Warden<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Warden")
            .field("deployer", &self.env.deployer)
            .field("params", &self.env.params)
            .field("height", &self.host.block_height())
            .field("events", &self.events.len())
            .finish()
    }
}

impl<H: Host> Warden<H> {
    /// Deploys a fresh contract. `deployer` becomes the admin allowed to
    /// force-revoke credentials.
    pub fn deploy(deployer: Principal, host: H, params: VaultParams) -> Result<Self, ParamsError> {
        params.validate()?;
        info!(
            %deployer,
            threshold = params.default_threshold,
            lock_period = params.default_lock_period,
            "warden deployed"
        );
        Ok(Self {
            env: Env {
                deployer,
                custody: Principal::custody(),
                params,
            },
            state: WardenState::default(),
            host,
            events: Vec::new(),
        })
    }

    /// Runs `f` against a staged copy of the contract and host, committing
    /// only on success.
    pub(crate) fn transact<T, E, F>(&mut self, op: &'static str, f: F) -> Result<T, E>
    where
        E: ErrorCode + fmt::Display,
        F: FnOnce(&mut Stage<'_, H>) -> Result<T, E>,
    {
        let mut stage = Stage::new(&self.env, self.state.clone(), self.host.clone());
        match f(&mut stage) {
            Ok(value) => {
                let Stage {
                    state, host, events, ..
                } = stage;
                self.state = state;
                self.host = host;
                debug!(op, events = events.len(), "call committed");
                for event in events {
                    let sequence = self.events.len() as u64;
                    self.events.push(EventRecord { sequence, event });
                }
                Ok(value)
            }
            Err(err) => {
                debug!(op, code = err.code(), error = %err, "call rejected");
                Err(err)
            }
        }
    }

    // -- Passkey registry ---------------------------------------------------

    /// Registers a credential for the calling wallet.
    pub fn register_passkey(
        &mut self,
        caller: &Principal,
        credential_id: CredentialId,
        public_key: &[u8],
        name: &str,
    ) -> Result<(), AuthError> {
        self.transact("register_passkey", |s| {
            s.register_passkey(caller, credential_id, public_key, name)
        })
    }

    /// Revokes one of the caller's own credentials.
    pub fn revoke_passkey(&mut self, caller: &Principal, credential_id: CredentialId) -> Result<(), AuthError> {
        self.transact("revoke_passkey", |s| s.revoke_passkey(caller, credential_id, false))
    }

    /// Deployer-only override: revokes a credential of any wallet.
    pub fn admin_revoke_passkey(
        &mut self,
        caller: &Principal,
        wallet: &Principal,
        credential_id: CredentialId,
    ) -> Result<(), AuthError> {
        self.transact("admin_revoke_passkey", |s| {
            if caller != &s.env.deployer {
                return Err(AuthError::NotAuthorized);
            }
            warn!(%caller, %wallet, %credential_id, "admin revoking passkey");
            s.revoke_passkey(wallet, credential_id, true)
        })
    }

    /// Changes the display name of one of the caller's credentials.
    pub fn rename_passkey(
        &mut self,
        caller: &Principal,
        credential_id: CredentialId,
        name: &str,
    ) -> Result<(), AuthError> {
        self.transact("rename_passkey", |s| {
            let height = s.height();
            s.state.registry.rename(caller, &credential_id, name)?;
            s.emit(WardenEvent::PasskeyRenamed {
                wallet: caller.clone(),
                credential_id,
                name: name.to_string(),
                height,
            });
            Ok(())
        })
    }

    // -- Authenticator ------------------------------------------------------

    /// Checks a signature against an explicit public key. Nothing about
    /// registered credentials is consulted. Malformed keys fail like bad
    /// signatures.
    pub fn verify_signature(
        &mut self,
        caller: &Principal,
        digest: &MessageDigest,
        public_key: &[u8],
        signature: &PasskeySignature,
    ) -> Result<(), AuthError> {
        self.transact("verify_signature", |s| {
            let public_key =
                PasskeyPublicKey::from_sec1_bytes(public_key).map_err(|_| AuthError::InvalidSignature)?;
            s.state
                .authenticator
                .verify_signature(digest, &public_key, signature)?;
            let height = s.height();
            s.emit(WardenEvent::SignatureVerified {
                wallet: caller.clone(),
                height,
            });
            Ok(())
        })
    }

    /// Authenticates with a registered credential of `wallet`. Replayed
    /// signatures are accepted on this path.
    pub fn authenticate(
        &mut self,
        wallet: &Principal,
        assertion: &PasskeyAssertion,
    ) -> Result<Verification, AuthError> {
        self.transact("authenticate", |s| s.authenticate(wallet, assertion, None))
    }

    /// Like [`authenticate`](Self::authenticate), but `nonce` must equal
    /// the wallet's replay counter, which then advances by one.
    pub fn authenticate_with_nonce(
        &mut self,
        wallet: &Principal,
        assertion: &PasskeyAssertion,
        nonce: u64,
    ) -> Result<Verification, AuthError> {
        self.transact("authenticate_with_nonce", |s| {
            s.authenticate(wallet, assertion, Some(nonce))
        })
    }

    // -- Reads --------------------------------------------------------------

    pub fn get_passkey(&self, wallet: &Principal, credential_id: &CredentialId) -> Option<&Passkey> {
        self.state.registry.get(wallet, credential_id)
    }

    pub fn list_passkeys(&self, wallet: &Principal) -> &[Passkey] {
        self.state.registry.list(wallet)
    }

    pub fn list_active_passkeys(&self, wallet: &Principal) -> Vec<&Passkey> {
        self.state.registry.list_active(wallet)
    }

    /// Registered credentials of `wallet`, revoked included.
    pub fn passkey_count(&self, wallet: &Principal) -> usize {
        self.state.registry.count(wallet)
    }

    pub fn get_nonce(&self, wallet: &Principal) -> u64 {
        self.state.authenticator.nonce(wallet)
    }

    /// Native-asset balance held for `wallet`.
    pub fn get_balance(&self, wallet: &Principal) -> u64 {
        self.state.accounts.native_balance(wallet)
    }

    pub fn get_token_balance(&self, wallet: &Principal, token: &TokenId) -> u64 {
        self.state.accounts.token_balance(wallet, token)
    }

    /// Total of `asset` the contract owes all wallets.
    pub fn total_custodied(&self, asset: &Asset) -> u128 {
        self.state.accounts.total(asset)
    }

    /// Limits in force for `wallet`: its own, or the deployment defaults.
    pub fn get_limits(&self, wallet: &Principal) -> UserLimits {
        self.state
            .withdrawals
            .effective_limits(wallet, &self.env.params)
    }

    pub fn get_pending_withdrawal(&self, wallet: &Principal, request_id: u64) -> Option<&PendingWithdrawal> {
        self.state.withdrawals.get(wallet, request_id)
    }

    /// Every request `wallet` has queued, in request order.
    pub fn list_pending_withdrawals(&self, wallet: &Principal) -> &[PendingWithdrawal] {
        self.state.withdrawals.list(wallet)
    }

    /// `true` if [`execute_pending`](Self::execute_pending) would pass its
    /// queue checks at the current height.
    pub fn is_withdrawal_ready(&self, wallet: &Principal, request_id: u64) -> bool {
        let lock_period = self.get_limits(wallet).lock_period;
        self.state
            .withdrawals
            .executable(wallet, request_id, lock_period, self.block_height())
            .is_ok()
    }

    /// Blocks left before the request unlocks, or `None` if there is no
    /// such request.
    pub fn blocks_until_unlock(&self, wallet: &Principal, request_id: u64) -> Option<u64> {
        let lock_period = self.get_limits(wallet).lock_period;
        self.state
            .withdrawals
            .get(wallet, request_id)
            .map(|r| r.blocks_remaining(lock_period, self.block_height()))
    }

    pub fn stats(&self) -> ProtocolStats {
        ProtocolStats {
            total_deposits: self.state.total_deposits,
            total_withdrawals: self.state.total_withdrawals,
            total_passkeys_registered: self.state.registry.total_registered(),
            total_verifications: self.state.authenticator.total_verifications(),
            withdrawal_request_nonce: self.state.withdrawals.request_nonce(),
            queued_withdrawals: self.state.withdrawals.queued_count(),
        }
    }

    /// The full event log, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Events with `sequence >= from`.
    pub fn events_since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(self.events.len());
        &self.events[start..]
    }

    pub fn deployer(&self) -> &Principal {
        &self.env.deployer
    }

    /// Principal holding the vault's funds on the host.
    pub fn custody(&self) -> &Principal {
        &self.env.custody
    }

    pub fn params(&self) -> &VaultParams {
        &self.env.params
    }

    pub fn block_height(&self) -> u64 {
        self.host.block_height()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Direct access to the host, for advancing blocks or funding accounts
    /// outside the contract.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_protocol::crypto::PasskeyKeypair;
    use warden_protocol::ledger::InMemoryLedger;

    fn deploy() -> Warden<InMemoryLedger> {
        Warden::deploy("admin".into(), InMemoryLedger::at_height(5), VaultParams::default()).unwrap()
    }

    fn alice() -> Principal {
        Principal::from("alice")
    }

    fn cred(n: u8) -> CredentialId {
        CredentialId::from_bytes([n; 32])
    }

    #[test]
    fn test_deploy_rejects_bad_params() {
        let params = VaultParams {
            default_threshold: 0,
            ..VaultParams::default()
        };
        assert!(Warden::deploy("admin".into(), InMemoryLedger::new(), params).is_err());
    }

    #[test]
    fn test_failed_call_leaves_no_trace() {
        let mut warden = deploy();
        let device = PasskeyKeypair::generate();
        warden
            .register_passkey(&alice(), cred(1), device.public_key().as_bytes(), "phone")
            .unwrap();
        let before = warden.events().len();

        let err = warden
            .register_passkey(&alice(), cred(1), device.public_key().as_bytes(), "again")
            .unwrap_err();
        assert_eq!(err, AuthError::PasskeyExists);
        assert_eq!(warden.events().len(), before);
        assert_eq!(warden.stats().total_passkeys_registered, 1);
    }

    #[test]
    fn test_event_sequence_is_gap_free() {
        let mut warden = deploy();
        let key = PasskeyKeypair::generate().public_key();
        for n in 0..3 {
            warden
                .register_passkey(&alice(), cred(n), key.as_bytes(), "k")
                .unwrap();
        }
        let sequences: Vec<u64> = warden.events().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(warden.events_since(2).len(), 1);
        assert!(warden.events_since(99).is_empty());
    }

    #[test]
    fn test_admin_revoke_requires_deployer() {
        let mut warden = deploy();
        let key = PasskeyKeypair::generate().public_key();
        warden.register_passkey(&alice(), cred(1), key.as_bytes(), "k").unwrap();

        assert_eq!(
            warden.admin_revoke_passkey(&alice(), &alice(), cred(1)),
            Err(AuthError::NotAuthorized)
        );
        warden
            .admin_revoke_passkey(&"admin".into(), &alice(), cred(1))
            .unwrap();
        assert!(warden.get_passkey(&alice(), &cred(1)).unwrap().revoked);
        assert!(matches!(
            warden.events().last().map(|r| &r.event),
            Some(WardenEvent::PasskeyRevoked { by_admin: true, .. })
        ));
    }

    #[test]
    fn test_verify_signature_malformed_key() {
        let mut warden = deploy();
        let device = PasskeyKeypair::generate();
        let digest = MessageDigest::of(b"x");
        let sig = device.sign_digest(&digest).unwrap();
        assert_eq!(
            warden.verify_signature(&alice(), &digest, &[0x04; 12], &sig),
            Err(AuthError::InvalidSignature)
        );
        warden
            .verify_signature(&alice(), &digest, device.public_key().as_bytes(), &sig)
            .unwrap();
        assert_eq!(warden.stats().total_verifications, 1);
    }

    #[test]
    fn test_registration_height_comes_from_host() {
        let mut warden = deploy();
        warden.host_mut().advance_blocks(10);
        let key = PasskeyKeypair::generate().public_key();
        warden.register_passkey(&alice(), cred(1), key.as_bytes(), "k").unwrap();
        assert_eq!(warden.get_passkey(&alice(), &cred(1)).unwrap().created_at, 15);
    }
}
