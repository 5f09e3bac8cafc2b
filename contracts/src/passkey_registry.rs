//! # Passkey Registry
//!
//! Per-wallet records of registered WebAuthn credentials. Each wallet owns
//! an ordered list of at most [`MAX_PASSKEYS_PER_WALLET`] passkeys, in
//! registration order. Records are never deleted: revocation flips a flag
//! and the slot stays used for the life of the wallet.
//!
//! Holding a wallet's records in one registration-ordered list keeps the
//! "index" and the records in step by construction. Lookups are linear,
//! which at ten entries is cheaper than hashing.
//!
//! The registry is pure state. It never looks at signatures; the
//! authenticator does that and reports usage back through
//! [`PasskeyRegistry::record_use`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use warden_protocol::config::{MAX_PASSKEYS_PER_WALLET, MAX_PASSKEY_NAME_LENGTH};
use warden_protocol::crypto::PasskeyPublicKey;
use warden_protocol::identity::{CredentialId, Principal};

use crate::error::AuthError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passkey {
    pub credential_id: CredentialId,
    /// SEC1 uncompressed P-256 point. Immutable after registration.
    pub public_key: PasskeyPublicKey,
    pub name: String,
    /// Block height of registration.
    pub created_at: u64,
    /// Height of the last successful authentication; `0` until first use.
    pub last_used: u64,
    /// One-way: once `true`, never `false` again.
    pub revoked: bool,
    pub verification_count: u64,
}

impl Passkey {
    pub fn is_active(&self) -> bool {
        !self.revoked
    }
}

/// All credentials of all wallets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasskeyRegistry {
    wallets: HashMap<Principal, Vec<Passkey>>,
    total_registered: u64,
}

/// Checks a display name: 1 to [`MAX_PASSKEY_NAME_LENGTH`] characters.
pub fn validate_name(name: &str) -> Result<(), AuthError> {
    let len = name.chars().count();
    if len == 0 {
        return Err(AuthError::InvalidName("name is empty"));
    }
    if len > MAX_PASSKEY_NAME_LENGTH {
        return Err(AuthError::InvalidName("name is longer than 50 characters"));
    }
    Ok(())
}

impl PasskeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `credential_id` for `wallet`.
    ///
    /// Checks run in a fixed order so the reported error is deterministic:
    /// name, slot cap, duplicate id, then key format. Compressed keys are
    /// refused with [`AuthError::InvalidPublicKey`].
    pub fn register(
        &mut self,
        wallet: &Principal,
        credential_id: CredentialId,
        public_key: &[u8],
        name: &str,
        height: u64,
    ) -> Result<&Passkey, AuthError> {
        validate_name(name)?;

        let existing = self.wallets.get(wallet).map(Vec::as_slice).unwrap_or(&[]);
        if existing.len() >= MAX_PASSKEYS_PER_WALLET {
            return Err(AuthError::MaxPasskeysReached);
        }
        if existing.iter().any(|p| p.credential_id == credential_id) {
            return Err(AuthError::PasskeyExists);
        }
        let public_key = PasskeyPublicKey::from_sec1_bytes(public_key)
            .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;

        self.total_registered = self.total_registered.saturating_add(1);
        let slots = self.wallets.entry(wallet.clone()).or_default();
        slots.push(Passkey {
            credential_id,
            public_key,
            name: name.to_string(),
            created_at: height,
            last_used: 0,
            revoked: false,
            verification_count: 0,
        });
        Ok(&slots[slots.len() - 1])
    }

    /// Marks a credential revoked. Returns `true` if it was active before.
    ///
    /// Revoking an already-revoked credential succeeds and changes nothing.
    pub fn revoke(&mut self, wallet: &Principal, credential_id: &CredentialId) -> Result<bool, AuthError> {
        let passkey = self.get_mut(wallet, credential_id)?;
        let was_active = passkey.is_active();
        passkey.revoked = true;
        Ok(was_active)
    }

    /// Replaces a credential's display name. Works on revoked credentials.
    pub fn rename(
        &mut self,
        wallet: &Principal,
        credential_id: &CredentialId,
        name: &str,
    ) -> Result<(), AuthError> {
        validate_name(name)?;
        let passkey = self.get_mut(wallet, credential_id)?;
        passkey.name = name.to_string();
        Ok(())
    }

    /// Bumps usage statistics after a successful verification and returns
    /// the new verification count.
    pub(crate) fn record_use(
        &mut self,
        wallet: &Principal,
        credential_id: &CredentialId,
        height: u64,
    ) -> Result<u64, AuthError> {
        let passkey = self.get_mut(wallet, credential_id)?;
        passkey.last_used = height;
        passkey.verification_count = passkey.verification_count.saturating_add(1);
        Ok(passkey.verification_count)
    }

    pub fn get(&self, wallet: &Principal, credential_id: &CredentialId) -> Option<&Passkey> {
        self.wallets
            .get(wallet)?
            .iter()
            .find(|p| &p.credential_id == credential_id)
    }

    fn get_mut(
        &mut self,
        wallet: &Principal,
        credential_id: &CredentialId,
    ) -> Result<&mut Passkey, AuthError> {
        self.wallets
            .get_mut(wallet)
            .and_then(|slots| slots.iter_mut().find(|p| &p.credential_id == credential_id))
            .ok_or(AuthError::PasskeyNotFound)
    }

    /// Every credential of `wallet`, revoked included, in registration order.
    pub fn list(&self, wallet: &Principal) -> &[Passkey] {
        self.wallets.get(wallet).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn list_active(&self, wallet: &Principal) -> Vec<&Passkey> {
        self.list(wallet).iter().filter(|p| p.is_active()).collect()
    }

    /// Slots used, revoked credentials included.
    pub fn count(&self, wallet: &Principal) -> usize {
        self.list(wallet).len()
    }

    pub fn total_registered(&self) -> u64 {
        self.total_registered
    }
}
