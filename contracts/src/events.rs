//! # Contract Events
//!
//! Every state-changing call that commits appends one or more events to
//! the contract's log. Events from a call that fails are discarded along
//! with the rest of its effects. Indexers read the log; the contract
//! itself never does.
//!
//! Calls gated by a passkey assertion (withdraw, cancel, set-limits, and
//! batches) log an `authenticated` record first, then the record of the
//! operation itself, so each such call produces two records with
//! consecutive sequence numbers. A failed call produces neither.

use serde::{Deserialize, Serialize};
use warden_protocol::identity::{CredentialId, Principal};
use warden_protocol::ledger::Asset;

/// A structured event emitted by a committed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WardenEvent {
    PasskeyRegistered {
        wallet: Principal,
        credential_id: CredentialId,
        name: String,
        height: u64,
    },
    PasskeyRevoked {
        wallet: Principal,
        credential_id: CredentialId,
        /// `true` when the deployer forced the revocation.
        by_admin: bool,
        height: u64,
    },
    PasskeyRenamed {
        wallet: Principal,
        credential_id: CredentialId,
        name: String,
        height: u64,
    },
    SignatureVerified {
        wallet: Principal,
        height: u64,
    },
    Authenticated {
        wallet: Principal,
        credential_id: CredentialId,
        verification_count: u64,
        nonce: Option<u64>,
        height: u64,
    },
    Deposited {
        wallet: Principal,
        asset: Asset,
        amount: u64,
        balance: u64,
        height: u64,
    },
    WithdrawalExecuted {
        wallet: Principal,
        asset: Asset,
        amount: u64,
        recipient: Principal,
        /// `None` for immediate withdrawals.
        request_id: Option<u64>,
        height: u64,
    },
    WithdrawalQueued {
        wallet: Principal,
        request_id: u64,
        asset: Asset,
        amount: u64,
        recipient: Principal,
        unlock_height: u64,
        height: u64,
    },
    WithdrawalCancelled {
        wallet: Principal,
        request_id: u64,
        height: u64,
    },
    LimitsUpdated {
        wallet: Principal,
        threshold: u64,
        lock_period: u64,
        height: u64,
    },
    BatchExecuted {
        wallet: Principal,
        operations: usize,
        height: u64,
    },
}

impl WardenEvent {
    /// The wallet the event concerns.
    pub fn wallet(&self) -> &Principal {
        match self {
            WardenEvent::PasskeyRegistered { wallet, .. }
            | WardenEvent::PasskeyRevoked { wallet, .. }
            | WardenEvent::PasskeyRenamed { wallet, .. }
            | WardenEvent::SignatureVerified { wallet, .. }
            | WardenEvent::Authenticated { wallet, .. }
            | WardenEvent::Deposited { wallet, .. }
            | WardenEvent::WithdrawalExecuted { wallet, .. }
            | WardenEvent::WithdrawalQueued { wallet, .. }
            | WardenEvent::WithdrawalCancelled { wallet, .. }
            | WardenEvent::LimitsUpdated { wallet, .. }
            | WardenEvent::BatchExecuted { wallet, .. } => wallet,
        }
    }

    /// Kebab-case kind tag, as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            WardenEvent::PasskeyRegistered { .. } => "passkey-registered",
            WardenEvent::PasskeyRevoked { .. } => "passkey-revoked",
            WardenEvent::PasskeyRenamed { .. } => "passkey-renamed",
            WardenEvent::SignatureVerified { .. } => "signature-verified",
            WardenEvent::Authenticated { .. } => "authenticated",
            WardenEvent::Deposited { .. } => "deposited",
            WardenEvent::WithdrawalExecuted { .. } => "withdrawal-executed",
            WardenEvent::WithdrawalQueued { .. } => "withdrawal-queued",
            WardenEvent::WithdrawalCancelled { .. } => "withdrawal-cancelled",
            WardenEvent::LimitsUpdated { .. } => "limits-updated",
            WardenEvent::BatchExecuted { .. } => "batch-executed",
        }
    }
}

/// An event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based, gap-free.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: WardenEvent,
}
