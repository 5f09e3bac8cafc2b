// Copyright (c) 2026 Warden Contributors. MIT License.
// See LICENSE for details.

//! # Warden Contracts
//!
//! Passkey-secured custody on top of a host ledger:
//!
//! - **Passkey Registry**: per-wallet WebAuthn credentials (P-256 public
//!   keys), capped at ten per wallet, revocable but never deleted.
//! - **Authenticator**: ECDSA P-256 verification of prehashed digests
//!   against registered credentials, with an optional replay nonce.
//! - **Vault**: custodial balances with an immediate path for small
//!   withdrawals and a time-locked queue for large ones.
//! - **Batch Executor**: several vault operations under one assertion,
//!   all-or-nothing.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. `checked_add` and
//!    `checked_sub` on balances and request ids, always.
//! 2. Every call is atomic. A call either commits all of its effects,
//!    host transfers included, or none of them.
//! 3. State transitions are explicit: enum variants, not boolean flags.
//! 4. Every error has a stable numeric code.
//! 5. Every public type is serializable (serde) for wire transport.

pub mod accounts;
pub mod authenticator;
pub mod batch;
pub mod contract;
pub mod error;
pub mod events;
pub mod passkey_registry;
pub mod vault;
pub mod withdrawal;

pub use authenticator::{PasskeyAssertion, Verification};
pub use batch::{BatchOperation, OperationKind};
pub use contract::{ProtocolStats, Warden};
pub use error::{AuthError, ErrorCode, InvalidOperationReason, VaultError};
pub use events::{EventRecord, WardenEvent};
pub use passkey_registry::Passkey;
pub use withdrawal::{PendingWithdrawal, UserLimits, WithdrawalOutcome, WithdrawalStatus};
