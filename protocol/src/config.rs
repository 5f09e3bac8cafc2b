//! # Protocol Configuration & Constants
//!
//! Every magic number in Warden lives here. Caps, key formats, time-lock
//! bounds, batch sizes. If you're hardcoding one of these somewhere else,
//! import it from here instead.
//!
//! Compile-time constants define the protocol. [`VaultParams`] carries the
//! handful of values a deployment may tune at genesis (the default
//! large-withdrawal threshold and default lock period).

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Identity the contract holds custody under on the host ledger.
pub const CUSTODY_PRINCIPAL: &str = "warden.vault";

// ---------------------------------------------------------------------------
// Credential Parameters
// ---------------------------------------------------------------------------

/// Maximum credentials a wallet may ever register. Revoked credentials
/// still occupy a slot.
pub const MAX_PASSKEYS_PER_WALLET: usize = 10;

/// Maximum display-name length in characters.
pub const MAX_PASSKEY_NAME_LENGTH: usize = 50;

/// Credential ids are opaque 32-byte handles chosen by the device.
pub const CREDENTIAL_ID_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// SEC1 uncompressed point: `0x04 || X || Y`.
pub const UNCOMPRESSED_PUBLIC_KEY_LENGTH: usize = 65;

/// SEC1 compressed point: `0x02|0x03 || X`. Documented but not accepted.
pub const COMPRESSED_PUBLIC_KEY_LENGTH: usize = 33;

/// First byte of every SEC1 uncompressed point.
pub const UNCOMPRESSED_POINT_MARKER: u8 = 0x04;

/// Fixed-width `r || s` signature encoding.
pub const SIGNATURE_LENGTH: usize = 64;

/// Signatures are always computed over a 32-byte prehashed digest.
pub const DIGEST_LENGTH: usize = 32;

/// Domain separation tag for canonical authorization digests.
pub const AUTHORIZATION_DOMAIN_TAG: &[u8] = b"WARDEN-AUTHORIZATION-V1";

// ---------------------------------------------------------------------------
// Vault Parameters
// ---------------------------------------------------------------------------

/// Withdrawals at or above this amount are time-locked by default.
pub const DEFAULT_WITHDRAWAL_THRESHOLD: u64 = 1_000_000;

/// Default time-lock in ledger heights. 144 blocks is roughly one day at a
/// ten-minute block cadence.
pub const DEFAULT_LOCK_PERIOD: u64 = 144;

/// Shortest lock period a wallet may configure.
pub const MIN_LOCK_PERIOD: u64 = 1;

/// Longest lock period a wallet may configure (~1 week).
pub const MAX_LOCK_PERIOD: u64 = 1008;

/// Maximum pending-withdrawal ids recorded per wallet.
pub const MAX_PENDING_WITHDRAWALS: usize = 20;

/// Maximum operations in one batch.
pub const MAX_BATCH_OPERATIONS: usize = 10;

/// Wire value returned for a withdrawal that executed immediately. Real
/// request ids start at 1.
pub const IMMEDIATE_WITHDRAWAL_SENTINEL: u64 = 0;

// ---------------------------------------------------------------------------
// Devnet Timing
// ---------------------------------------------------------------------------

/// Milliseconds between blocks of the devnet node's height loop.
pub const BLOCK_TIME_MS: u64 = 2_000;

/// Default RPC API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Runtime Parameters
// ---------------------------------------------------------------------------

/// Rejected deployment parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("default threshold must be greater than zero")]
    ZeroThreshold,

    #[error("default lock period {0} outside [1, 1008]")]
    LockPeriodOutOfRange(u64),
}

/// Deployment-time defaults applied to wallets without custom limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    /// Threshold used when a wallet has not set its own.
    pub default_threshold: u64,
    /// Lock period used when a wallet has not set its own.
    pub default_lock_period: u64,
}

impl VaultParams {
    /// Checks the same bounds `set-limits` enforces on wallets.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.default_threshold == 0 {
            return Err(ParamsError::ZeroThreshold);
        }
        if !lock_period_in_bounds(self.default_lock_period) {
            return Err(ParamsError::LockPeriodOutOfRange(self.default_lock_period));
        }
        Ok(())
    }
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_WITHDRAWAL_THRESHOLD,
            default_lock_period: DEFAULT_LOCK_PERIOD,
        }
    }
}

/// Returns `true` if `period` lies in `[MIN_LOCK_PERIOD, MAX_LOCK_PERIOD]`.
pub fn lock_period_in_bounds(period: u64) -> bool {
    (MIN_LOCK_PERIOD..=MAX_LOCK_PERIOD).contains(&period)
}
