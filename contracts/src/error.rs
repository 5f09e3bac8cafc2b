//! # Error Taxonomy
//!
//! Two closed error families, one per subsystem. Every variant carries a
//! stable numeric code: authenticator codes live in `100..200`, vault codes
//! in `200..300`. Codes are part of the wire contract. Never renumber.

use thiserror::Error;
use warden_protocol::ledger::TransferError;

/// Anything with a stable wire code.
pub trait ErrorCode {
    fn code(&self) -> u32;
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Failures of the credential registry and the authenticator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Caller lacks the privilege this operation needs.
    #[error("caller is not authorized")]
    NotAuthorized,

    #[error("passkey not found")]
    PasskeyNotFound,

    #[error("passkey already registered for this wallet")]
    PasskeyExists,

    #[error("invalid signature")]
    InvalidSignature,

    /// The wallet has used all of its lifetime credential slots.
    #[error("maximum passkeys reached for this wallet")]
    MaxPasskeysReached,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("passkey has been revoked")]
    PasskeyRevoked,

    #[error("invalid nonce: expected {expected}, got {provided}")]
    InvalidNonce { expected: u64, provided: u64 },

    #[error("invalid passkey name: {0}")]
    InvalidName(&'static str),
}

impl ErrorCode for AuthError {
    fn code(&self) -> u32 {
        match self {
            AuthError::NotAuthorized => 100,
            AuthError::PasskeyNotFound => 101,
            AuthError::PasskeyExists => 102,
            AuthError::InvalidSignature => 103,
            AuthError::MaxPasskeysReached => 104,
            AuthError::InvalidPublicKey(_) => 105,
            AuthError::PasskeyRevoked => 106,
            AuthError::InvalidNonce { .. } => 107,
            AuthError::InvalidName(_) => 108,
        }
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Why a single batch operation was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidOperationReason {
    #[error("batch contains no operations")]
    EmptyBatch,

    #[error("unsupported operation kind")]
    UnsupportedKind,

    #[error("token operations are not supported in batches")]
    TokenNotSupported,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("withdrawal has no recipient")]
    MissingRecipient,

    #[error("cannot pay out to the custody principal")]
    CustodyRecipient,

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    /// Batches may only carry withdrawals that would execute immediately.
    #[error("amount is at or above the immediate-withdrawal threshold {threshold}")]
    AboveThreshold { threshold: u64 },
}

/// Failures of the vault and the batch executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Custody backs every internal balance, so it can neither hold one
    /// nor receive a payout.
    #[error("the custody principal cannot use the vault")]
    CustodyPrincipal,

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("host transfer failed: {0}")]
    TransferFailed(#[source] TransferError),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[source] AuthError),

    #[error("withdrawal request {0} not found")]
    WithdrawalNotFound(u64),

    #[error("withdrawal is locked for {remaining} more blocks")]
    WithdrawalLocked { remaining: u64 },

    #[error("withdrawal request {0} already executed")]
    WithdrawalExecuted(u64),

    #[error("withdrawal request {0} was cancelled")]
    WithdrawalCancelled(u64),

    #[error("invalid limits: threshold must be positive and lock period within [1, 1008]")]
    InvalidLimits,

    #[error("batch of {0} operations exceeds the limit of 10")]
    BatchLimitExceeded(usize),

    #[error("invalid operation at index {index}: {reason}")]
    InvalidOperation {
        index: usize,
        reason: InvalidOperationReason,
    },

    #[error("wallet has no free pending-withdrawal slots")]
    PendingLimitReached,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl ErrorCode for VaultError {
    fn code(&self) -> u32 {
        match self {
            VaultError::CustodyPrincipal => 200,
            VaultError::InsufficientBalance { .. } => 201,
            VaultError::InvalidAmount => 202,
            VaultError::TransferFailed(_) => 203,
            VaultError::AuthenticationFailed(_) => 204,
            VaultError::WithdrawalNotFound(_) => 205,
            VaultError::WithdrawalLocked { .. } => 206,
            VaultError::WithdrawalExecuted(_) => 207,
            VaultError::WithdrawalCancelled(_) => 208,
            VaultError::InvalidLimits => 209,
            VaultError::BatchLimitExceeded(_) => 210,
            VaultError::InvalidOperation { .. } => 211,
            VaultError::PendingLimitReached => 212,
            VaultError::ArithmeticOverflow => 213,
        }
    }
}

impl From<AuthError> for VaultError {
    fn from(err: AuthError) -> Self {
        VaultError::AuthenticationFailed(err)
    }
}

impl From<TransferError> for VaultError {
    fn from(err: TransferError) -> Self {
        VaultError::TransferFailed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_are_in_range_and_unique() {
        let errors = [
            AuthError::NotAuthorized,
            AuthError::PasskeyNotFound,
            AuthError::PasskeyExists,
            AuthError::InvalidSignature,
            AuthError::MaxPasskeysReached,
            AuthError::InvalidPublicKey(String::new()),
            AuthError::PasskeyRevoked,
            AuthError::InvalidNonce {
                expected: 0,
                provided: 1,
            },
            AuthError::InvalidName("empty"),
        ];
        let codes: std::collections::HashSet<u32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| (100..200).contains(c)));
    }

    #[test]
    fn auth_failure_wraps_into_vault_code() {
        let err: VaultError = AuthError::InvalidSignature.into();
        assert_eq!(err.code(), 204);
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("invalid signature".to_string())
        );
    }

    #[test]
    fn invalid_operation_message_names_index() {
        let err = VaultError::InvalidOperation {
            index: 2,
            reason: InvalidOperationReason::InsufficientBalance {
                available: 1_500_000,
                requested: 2_000_000,
            },
        };
        assert_eq!(err.code(), 211);
        assert!(err.to_string().starts_with("invalid operation at index 2"));
    }

    #[test]
    fn custody_principal_uses_code_200() {
        assert_eq!(VaultError::CustodyPrincipal.code(), 200);
    }
}
