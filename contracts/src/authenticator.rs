//! # Passkey Authenticator
//!
//! Decides whether "this wallet, this credential, this digest, this
//! signature" is a valid authorization. The check is ECDSA P-256 over the
//! digest as given: the authenticator never hashes it and never inspects
//! what it commits to.
//!
//! Two entry points:
//!
//! - [`Authenticator::authenticate`] accepts any valid signature, including
//!   one that has been seen before. Replay protection is the client's job
//!   on this path.
//! - [`Authenticator::authenticate_with_nonce`] additionally requires the
//!   caller-supplied nonce to equal the wallet's replay counter and bumps
//!   the counter on success.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use warden_protocol::crypto::{verify_prehash, MessageDigest, PasskeyPublicKey, PasskeySignature};
use warden_protocol::identity::{CredentialId, Principal};

use crate::error::AuthError;
use crate::passkey_registry::PasskeyRegistry;

/// A device's signed answer to an authorization challenge: which
/// credential signed, what it signed, and the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasskeyAssertion {
    pub credential_id: CredentialId,
    pub digest: MessageDigest,
    pub signature: PasskeySignature,
}

impl PasskeyAssertion {
    pub fn new(credential_id: CredentialId, digest: MessageDigest, signature: PasskeySignature) -> Self {
        Self {
            credential_id,
            digest,
            signature,
        }
    }
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub credential_id: CredentialId,
    /// The credential's verification count after this call.
    pub verification_count: u64,
    /// The nonce consumed, on the nonce-checked path.
    pub nonce: Option<u64>,
}

/// Replay counters and the global verification tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
    nonces: HashMap<Principal, u64>,
    total_verifications: u64,
}

impl Authenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stateless signature check against an explicit key. Counts toward the
    /// global tally on success.
    pub fn verify_signature(
        &mut self,
        digest: &MessageDigest,
        public_key: &PasskeyPublicKey,
        signature: &PasskeySignature,
    ) -> Result<(), AuthError> {
        verify_prehash(public_key, digest, signature).map_err(|_| AuthError::InvalidSignature)?;
        self.total_verifications = self.total_verifications.saturating_add(1);
        Ok(())
    }

    /// Authenticates `signature` over `digest` with a registered, active
    /// credential of `wallet`.
    ///
    /// Errors: [`AuthError::PasskeyNotFound`], [`AuthError::PasskeyRevoked`],
    /// [`AuthError::InvalidSignature`], checked in that order.
    pub fn authenticate(
        &mut self,
        registry: &mut PasskeyRegistry,
        wallet: &Principal,
        credential_id: &CredentialId,
        digest: &MessageDigest,
        signature: &PasskeySignature,
        height: u64,
    ) -> Result<Verification, AuthError> {
        let passkey = registry
            .get(wallet, credential_id)
            .ok_or(AuthError::PasskeyNotFound)?;
        if !passkey.is_active() {
            return Err(AuthError::PasskeyRevoked);
        }
        verify_prehash(&passkey.public_key, digest, signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let verification_count = registry.record_use(wallet, credential_id, height)?;
        self.total_verifications = self.total_verifications.saturating_add(1);
        Ok(Verification {
            credential_id: *credential_id,
            verification_count,
            nonce: None,
        })
    }

    /// [`authenticate`](Self::authenticate) gated on `expected_nonce`
    /// matching the wallet's replay counter. The nonce is checked first, so
    /// a stale nonce fails without touching the signature.
    #[allow(clippy::too_many_arguments)]
    pub fn authenticate_with_nonce(
        &mut self,
        registry: &mut PasskeyRegistry,
        wallet: &Principal,
        credential_id: &CredentialId,
        digest: &MessageDigest,
        signature: &PasskeySignature,
        expected_nonce: u64,
        height: u64,
    ) -> Result<Verification, AuthError> {
        let current = self.nonce(wallet);
        if expected_nonce != current {
            return Err(AuthError::InvalidNonce {
                expected: current,
                provided: expected_nonce,
            });
        }
        let mut verification =
            self.authenticate(registry, wallet, credential_id, digest, signature, height)?;
        self.nonces.insert(wallet.clone(), current.saturating_add(1));
        verification.nonce = Some(current);
        Ok(verification)
    }

    /// The wallet's replay counter. Zero until first used.
    pub fn nonce(&self, wallet: &Principal) -> u64 {
        self.nonces.get(wallet).copied().unwrap_or(0)
    }

    pub fn total_verifications(&self) -> u64 {
        self.total_verifications
    }
}
