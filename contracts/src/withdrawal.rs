//! # Time-Locked Withdrawals
//!
//! Withdrawals below a wallet's threshold leave immediately. At or above
//! it they become a [`PendingWithdrawal`] that anyone may execute once the
//! wallet's lock period has elapsed, and that the wallet may cancel before
//! then.
//!
//! ```text
//!   request ──► Queued ──(height ≥ requested_at + lock)──► Executed
//!                  │
//!                  └──(owner, authenticated)──────────────► Cancelled
//! ```
//!
//! Request ids come from one global counter shared by every wallet, so an
//! id names exactly one request across the whole contract. Each wallet's
//! request list is append-only and capped at [`MAX_PENDING_WITHDRAWALS`]:
//! executed and cancelled requests keep their slot.
//!
//! The lock period is read from the wallet's limits at execution time, not
//! captured at request time. A wallet that shortens its lock shortens the
//! wait on requests already queued.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use warden_protocol::config::{lock_period_in_bounds, VaultParams, MAX_PENDING_WITHDRAWALS};
use warden_protocol::identity::Principal;
use warden_protocol::ledger::{Asset, TokenId};

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// A wallet's withdrawal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLimits {
    /// Amounts at or above this are time-locked.
    pub threshold: u64,
    /// Blocks a queued request waits before it may execute.
    pub lock_period: u64,
}

impl UserLimits {
    /// Validated limits: positive threshold, lock period in `[1, 1008]`.
    pub fn new(threshold: u64, lock_period: u64) -> Result<Self, VaultError> {
        if threshold == 0 || !lock_period_in_bounds(lock_period) {
            return Err(VaultError::InvalidLimits);
        }
        Ok(Self {
            threshold,
            lock_period,
        })
    }

    pub fn from_params(params: &VaultParams) -> Self {
        Self {
            threshold: params.default_threshold,
            lock_period: params.default_lock_period,
        }
    }

    /// `true` if `amount` must go through the queue.
    pub fn requires_lock(&self, amount: u64) -> bool {
        amount >= self.threshold
    }
}

// ---------------------------------------------------------------------------
// Pending Requests
// ---------------------------------------------------------------------------

/// Lifecycle of a queued request. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Queued,
    Executed,
    Cancelled,
}

/// A withdrawal waiting out its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub request_id: u64,
    pub amount: u64,
    pub recipient: Principal,
    /// `None` for the native asset.
    pub token: Option<TokenId>,
    pub requested_at: u64,
    pub status: WithdrawalStatus,
}

impl PendingWithdrawal {
    pub fn asset(&self) -> Asset {
        Asset::from_token(self.token.clone())
    }

    pub fn is_executed(&self) -> bool {
        self.status == WithdrawalStatus::Executed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == WithdrawalStatus::Cancelled
    }

    /// First height at which this request may execute under `lock_period`.
    pub fn unlock_height(&self, lock_period: u64) -> u64 {
        self.requested_at.saturating_add(lock_period)
    }

    /// Blocks left before unlock at `height`; zero once unlocked.
    pub fn blocks_remaining(&self, lock_period: u64, height: u64) -> u64 {
        self.unlock_height(lock_period).saturating_sub(height)
    }
}

/// How a withdrawal request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "request_id", rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    /// Funds already left the vault.
    Immediate,
    /// Funds are locked under this request id.
    Queued(u64),
}

impl WithdrawalOutcome {
    /// The wire value: the request id, or `0` for an immediate withdrawal.
    pub fn request_id(&self) -> u64 {
        match self {
            WithdrawalOutcome::Immediate => warden_protocol::config::IMMEDIATE_WITHDRAWAL_SENTINEL,
            WithdrawalOutcome::Queued(id) => *id,
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Limits and queued requests of every wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    limits: HashMap<Principal, UserLimits>,
    requests: HashMap<Principal, Vec<PendingWithdrawal>>,
    /// Last issued request id. Ids start at 1.
    request_nonce: u64,
}

impl WithdrawalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wallet's own limits if it set any, deployment defaults otherwise.
    pub fn effective_limits(&self, wallet: &Principal, params: &VaultParams) -> UserLimits {
        self.limits
            .get(wallet)
            .copied()
            .unwrap_or_else(|| UserLimits::from_params(params))
    }

    pub fn set_limits(&mut self, wallet: &Principal, limits: UserLimits) {
        self.limits.insert(wallet.clone(), limits);
    }

    /// Queues a request and returns its fresh id.
    pub fn enqueue(
        &mut self,
        wallet: &Principal,
        amount: u64,
        recipient: Principal,
        token: Option<TokenId>,
        height: u64,
    ) -> Result<u64, VaultError> {
        if self.list(wallet).len() >= MAX_PENDING_WITHDRAWALS {
            return Err(VaultError::PendingLimitReached);
        }
        let request_id = self
            .request_nonce
            .checked_add(1)
            .ok_or(VaultError::ArithmeticOverflow)?;

        self.requests.entry(wallet.clone()).or_default().push(PendingWithdrawal {
            request_id,
            amount,
            recipient,
            token,
            requested_at: height,
            status: WithdrawalStatus::Queued,
        });
        self.request_nonce = request_id;
        Ok(request_id)
    }

    pub fn get(&self, wallet: &Principal, request_id: u64) -> Option<&PendingWithdrawal> {
        self.list(wallet).iter().find(|r| r.request_id == request_id)
    }

    fn get_mut(&mut self, wallet: &Principal, request_id: u64) -> Result<&mut PendingWithdrawal, VaultError> {
        self.requests
            .get_mut(wallet)
            .and_then(|list| list.iter_mut().find(|r| r.request_id == request_id))
            .ok_or(VaultError::WithdrawalNotFound(request_id))
    }

    /// The request, if it may execute at `height` under `lock_period`.
    ///
    /// Checked in order: exists, not executed, not cancelled, unlocked.
    pub fn executable(
        &self,
        wallet: &Principal,
        request_id: u64,
        lock_period: u64,
        height: u64,
    ) -> Result<&PendingWithdrawal, VaultError> {
        let request = self
            .get(wallet, request_id)
            .ok_or(VaultError::WithdrawalNotFound(request_id))?;
        match request.status {
            WithdrawalStatus::Executed => return Err(VaultError::WithdrawalExecuted(request_id)),
            WithdrawalStatus::Cancelled => return Err(VaultError::WithdrawalCancelled(request_id)),
            WithdrawalStatus::Queued => {}
        }
        let remaining = request.blocks_remaining(lock_period, height);
        if remaining > 0 {
            return Err(VaultError::WithdrawalLocked { remaining });
        }
        Ok(request)
    }

    pub fn mark_executed(&mut self, wallet: &Principal, request_id: u64) -> Result<(), VaultError> {
        self.get_mut(wallet, request_id)?.status = WithdrawalStatus::Executed;
        Ok(())
    }

    /// Cancels a queued request. Returns `true` if this call changed it;
    /// cancelling an already-cancelled request is a no-op.
    pub fn cancel(&mut self, wallet: &Principal, request_id: u64) -> Result<bool, VaultError> {
        let request = self.get_mut(wallet, request_id)?;
        match request.status {
            WithdrawalStatus::Executed => Err(VaultError::WithdrawalExecuted(request_id)),
            WithdrawalStatus::Cancelled => Ok(false),
            WithdrawalStatus::Queued => {
                request.status = WithdrawalStatus::Cancelled;
                Ok(true)
            }
        }
    }

    /// Every request the wallet ever queued, oldest first.
    pub fn list(&self, wallet: &Principal) -> &[PendingWithdrawal] {
        self.requests.get(wallet).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Requests still waiting, across all wallets.
    pub fn queued_count(&self) -> usize {
        self.requests
            .values()
            .flatten()
            .filter(|r| r.status == WithdrawalStatus::Queued)
            .count()
    }

    pub fn request_nonce(&self) -> u64 {
        self.request_nonce
    }
}
