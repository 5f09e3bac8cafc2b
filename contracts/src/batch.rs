//! # Batch Executor
//!
//! Runs up to [`MAX_BATCH_OPERATIONS`] vault operations under one passkey
//! assertion, all-or-nothing. Operations apply in order; the first failure
//! stops the batch and the whole call rolls back through the contract's
//! staging, including operations that had already succeeded.
//!
//! Only native deposits and immediate native withdrawals are batchable.
//! A withdrawal at or above the wallet's threshold is refused rather than
//! queued, and token operations are refused outright.

use serde::{Deserialize, Serialize};
use tracing::info;
use warden_protocol::config::MAX_BATCH_OPERATIONS;
use warden_protocol::identity::Principal;
use warden_protocol::ledger::{Asset, Host, TokenId};

use crate::authenticator::PasskeyAssertion;
use crate::contract::{Stage, Warden};
use crate::error::{InvalidOperationReason, VaultError};
use crate::events::WardenEvent;

/// The operation an entry asks for. Unknown kinds deserialize to
/// [`OperationKind::Unsupported`] and fail at execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    DepositNative,
    WithdrawNative,
    DepositToken,
    WithdrawToken,
    #[serde(other)]
    Unsupported,
}

/// One entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub kind: OperationKind,
    pub amount: u64,
    #[serde(default)]
    pub recipient: Option<Principal>,
    #[serde(default)]
    pub token: Option<TokenId>,
}

impl BatchOperation {
    pub fn deposit_native(amount: u64) -> Self {
        Self {
            kind: OperationKind::DepositNative,
            amount,
            recipient: None,
            token: None,
        }
    }

    pub fn withdraw_native(amount: u64, recipient: Principal) -> Self {
        Self {
            kind: OperationKind::WithdrawNative,
            amount,
            recipient: Some(recipient),
            token: None,
        }
    }
}

/// Running state of a batch fold. Once `first_error` is set, later
/// operations are skipped.
#[derive(Debug)]
struct BatchProgress {
    applied: usize,
    first_error: Option<VaultError>,
}

impl BatchProgress {
    fn start() -> Self {
        Self {
            applied: 0,
            first_error: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.first_error.is_none()
    }

    fn record(mut self, result: Result<(), VaultError>) -> Self {
        match result {
            Ok(()) => self.applied += 1,
            Err(err) => self.first_error = Some(err),
        }
        self
    }

    fn finish(self) -> Result<usize, VaultError> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.applied),
        }
    }
}

fn invalid(index: usize, reason: InvalidOperationReason) -> VaultError {
    VaultError::InvalidOperation { index, reason }
}

impl<H: Host> Stage<'_, H> {
    fn execute_batch(
        &mut self,
        wallet: &Principal,
        operations: &[BatchOperation],
        assertion: &PasskeyAssertion,
    ) -> Result<usize, VaultError> {
        self.authenticate(wallet, assertion, None)?;
        self.ensure_not_custody(wallet)?;
        if operations.is_empty() {
            return Err(invalid(0, InvalidOperationReason::EmptyBatch));
        }
        if operations.len() > MAX_BATCH_OPERATIONS {
            return Err(VaultError::BatchLimitExceeded(operations.len()));
        }

        let applied = operations
            .iter()
            .enumerate()
            .fold(BatchProgress::start(), |progress, (index, op)| {
                if !progress.is_ok() {
                    return progress;
                }
                let result = self.apply_operation(wallet, index, op);
                progress.record(result)
            })
            .finish()?;

        let height = self.height();
        info!(%wallet, operations = applied, "batch executed");
        self.emit(WardenEvent::BatchExecuted {
            wallet: wallet.clone(),
            operations: applied,
            height,
        });
        Ok(applied)
    }

    fn apply_operation(&mut self, wallet: &Principal, index: usize, op: &BatchOperation) -> Result<(), VaultError> {
        if op.token.is_some() {
            return Err(invalid(index, InvalidOperationReason::TokenNotSupported));
        }
        match op.kind {
            OperationKind::DepositNative => self.deposit(wallet, &Asset::Native, op.amount).map(drop),
            OperationKind::WithdrawNative => self.batch_withdraw(wallet, index, op),
            OperationKind::DepositToken | OperationKind::WithdrawToken => {
                Err(invalid(index, InvalidOperationReason::TokenNotSupported))
            }
            OperationKind::Unsupported => Err(invalid(index, InvalidOperationReason::UnsupportedKind)),
        }
    }

    /// Immediate-only native withdrawal. Every refusal is reported as
    /// [`VaultError::InvalidOperation`] carrying `index`.
    fn batch_withdraw(&mut self, wallet: &Principal, index: usize, op: &BatchOperation) -> Result<(), VaultError> {
        let recipient = op
            .recipient
            .as_ref()
            .ok_or_else(|| invalid(index, InvalidOperationReason::MissingRecipient))?;
        if recipient == &self.env.custody {
            return Err(invalid(index, InvalidOperationReason::CustodyRecipient));
        }
        if op.amount == 0 {
            return Err(invalid(index, InvalidOperationReason::InvalidAmount));
        }
        let available = self.state.accounts.native_balance(wallet);
        if available < op.amount {
            return Err(invalid(
                index,
                InvalidOperationReason::InsufficientBalance {
                    available,
                    requested: op.amount,
                },
            ));
        }
        let limits = self
            .state
            .withdrawals
            .effective_limits(wallet, &self.env.params);
        if limits.requires_lock(op.amount) {
            return Err(invalid(
                index,
                InvalidOperationReason::AboveThreshold {
                    threshold: limits.threshold,
                },
            ));
        }
        self.pay_out(wallet, &Asset::Native, op.amount, recipient)
    }
}

impl<H: Host> Warden<H> {
    /// Applies `operations` in order under one assertion. Returns how many
    /// ran; on any failure, none of them took effect.
    pub fn execute_batch(
        &mut self,
        caller: &Principal,
        operations: &[BatchOperation],
        assertion: &PasskeyAssertion,
    ) -> Result<usize, VaultError> {
        self.transact("execute_batch", |s| s.execute_batch(caller, operations, assertion))
    }
}
