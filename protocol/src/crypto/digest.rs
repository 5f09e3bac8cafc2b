//! # Canonical Authorization Digests
//!
//! The authenticator treats a digest as 32 opaque bytes. It never checks
//! that a signature over digest `D` was *meant* for the withdrawal it is
//! attached to. That binding is the client's job, and this module is how a
//! client does it properly.
//!
//! An [`AuthorizationIntent`] names everything a signature should commit
//! to: operation kind, wallet, amount, recipient, token, and a nonce. Its
//! [`digest`](AuthorizationIntent::digest) is
//!
//! ```text
//! SHA-256( DOMAIN_TAG
//!        || kind:u8
//!        || len:u32be || wallet
//!        || amount:u64be
//!        || opt(recipient) || opt(token)
//!        || nonce:u64be
//!        || opt(payload_hash) )
//!
//! opt(x) = 0x00                        when absent
//!        = 0x01 || len:u32be || x      when present
//! ```
//!
//! Length prefixes make the encoding injective, so two different intents
//! never share a preimage. Using the wallet's replay counter as `nonce` and
//! authenticating with the nonce-checked path gives one-shot signatures.
//!
//! Nothing on the verification side requires this encoding. Signatures over
//! arbitrary digests keep authenticating exactly as before.

use serde::{Deserialize, Serialize};

use super::hash::sha256_array;
use super::keys::MessageDigest;
use crate::config::AUTHORIZATION_DOMAIN_TAG;
use crate::identity::Principal;
use crate::ledger::TokenId;

/// What a signature authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentKind {
    Authenticate,
    Withdraw,
    CancelWithdrawal,
    SetLimits,
    ExecuteBatch,
}

impl IntentKind {
    /// Stable one-byte tag. Never renumber.
    pub fn tag(self) -> u8 {
        match self {
            IntentKind::Authenticate => 0x01,
            IntentKind::Withdraw => 0x02,
            IntentKind::CancelWithdrawal => 0x03,
            IntentKind::SetLimits => 0x04,
            IntentKind::ExecuteBatch => 0x05,
        }
    }
}

/// The parameters a signature is meant to commit to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationIntent {
    pub kind: IntentKind,
    pub wallet: Principal,
    /// Amount, threshold, request id, or zero, depending on `kind`.
    pub amount: u64,
    pub recipient: Option<Principal>,
    pub token: Option<TokenId>,
    pub nonce: u64,
    /// SHA-256 of any extra payload, e.g. an encoded batch.
    pub payload_hash: Option<[u8; 32]>,
}

impl AuthorizationIntent {
    /// A bare intent of `kind` for `wallet`; fill the rest with the builder
    /// methods.
    pub fn new(kind: IntentKind, wallet: Principal) -> Self {
        Self {
            kind,
            wallet,
            amount: 0,
            recipient: None,
            token: None,
            nonce: 0,
            payload_hash: None,
        }
    }

    /// Intent for `withdraw(amount, recipient, token?)`.
    pub fn withdraw(
        wallet: Principal,
        amount: u64,
        recipient: Principal,
        token: Option<TokenId>,
        nonce: u64,
    ) -> Self {
        Self {
            amount,
            recipient: Some(recipient),
            token,
            nonce,
            ..Self::new(IntentKind::Withdraw, wallet)
        }
    }

    /// Intent for cancelling pending request `request_id`.
    pub fn cancel_withdrawal(wallet: Principal, request_id: u64, nonce: u64) -> Self {
        Self {
            amount: request_id,
            nonce,
            ..Self::new(IntentKind::CancelWithdrawal, wallet)
        }
    }

    /// Intent for `set-limits(threshold, lock_period)`. The lock period is
    /// committed through the payload hash.
    pub fn set_limits(wallet: Principal, threshold: u64, lock_period: u64, nonce: u64) -> Self {
        Self {
            amount: threshold,
            nonce,
            ..Self::new(IntentKind::SetLimits, wallet)
        }
        .with_payload(&lock_period.to_be_bytes())
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_recipient(mut self, recipient: Principal) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_token(mut self, token: TokenId) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Commits to an arbitrary payload by hash.
    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload_hash = Some(sha256_array(payload));
        self
    }

    /// The canonical preimage. See the module docs for the layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(AUTHORIZATION_DOMAIN_TAG);
        out.push(self.kind.tag());
        push_len_prefixed(&mut out, self.wallet.as_str().as_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        push_optional(&mut out, self.recipient.as_ref().map(|r| r.as_str().as_bytes()));
        push_optional(&mut out, self.token.as_ref().map(|t| t.as_str().as_bytes()));
        out.extend_from_slice(&self.nonce.to_be_bytes());
        push_optional(&mut out, self.payload_hash.as_ref().map(|h| h.as_slice()));
        out
    }

    /// SHA-256 of [`encode`](Self::encode). This is what the device signs.
    pub fn digest(&self) -> MessageDigest {
        MessageDigest::from_bytes(sha256_array(&self.encode()))
    }
}

fn push_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    // Field lengths are bounded by principal sizes, far below u32::MAX.
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn push_optional(out: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        None => out.push(0x00),
        Some(bytes) => {
            out.push(0x01);
            push_len_prefixed(out, bytes);
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
    fn digest_is_deterministic() {
        let a = AuthorizationIntent::withdraw(alice(), 500, "bob".into(), None, 3);
        let b = AuthorizationIntent::withdraw(alice(), 500, "bob".into(), None, 3);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn every_field_changes_the_digest() {
        let base = AuthorizationIntent::withdraw(alice(), 500, "bob".into(), None, 3);
        let variants = [
            base.clone().with_amount(501),
            base.clone().with_recipient("carol".into()),
            base.clone().with_token("token.usd".into()),
            base.clone().with_nonce(4),
            base.clone().with_payload(b"x"),
            AuthorizationIntent {
                kind: IntentKind::CancelWithdrawal,
                ..base.clone()
            },
            AuthorizationIntent {
                wallet: "mallory".into(),
                ..base.clone()
            },
        ];
        for variant in variants {
            assert_ne!(variant.digest(), base.digest(), "{:?}", variant);
        }
    }

    #[test]
    fn length_prefixes_prevent_field_shifting() {
        // "ab" + "c" and "a" + "bc" must not collide.
        let a = AuthorizationIntent::new(IntentKind::Withdraw, "ab".into())
            .with_recipient("c".into());
        let b = AuthorizationIntent::new(IntentKind::Withdraw, "a".into())
            .with_recipient("bc".into());
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn encoding_starts_with_domain_tag() {
        let intent = AuthorizationIntent::new(IntentKind::Authenticate, alice());
        assert!(intent.encode().starts_with(AUTHORIZATION_DOMAIN_TAG));
    }

    #[test]
    fn set_limits_commits_to_lock_period() {
        let a = AuthorizationIntent::set_limits(alice(), 1_000, 10, 0);
        let b = AuthorizationIntent::set_limits(alice(), 1_000, 11, 0);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn intent_tags_are_distinct() {
        let tags = [
            IntentKind::Authenticate.tag(),
            IntentKind::Withdraw.tag(),
            IntentKind::CancelWithdrawal.tag(),
            IntentKind::SetLimits.tag(),
            IntentKind::ExecuteBatch.tag(),
        ];
        let unique: std::collections::HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
    }
}
