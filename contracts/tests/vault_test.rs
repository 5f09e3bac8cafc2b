//! Integration tests for the vault: deposits, the immediate and time-locked
//! withdrawal paths, cancellation, limits, and custody accounting.

use warden_contracts::{
    ErrorCode, PasskeyAssertion, VaultError, Warden, WardenEvent, WithdrawalOutcome,
    WithdrawalStatus,
};
use warden_protocol::config::{VaultParams, MAX_PENDING_WITHDRAWALS};
use warden_protocol::crypto::{AuthorizationIntent, PasskeyKeypair};
use warden_protocol::identity::{CredentialId, Principal};
use warden_protocol::ledger::{Asset, Host, InMemoryLedger, TokenId};

/// A wallet with one registered device.
struct Account {
    id: Principal,
    device: PasskeyKeypair,
    cred: CredentialId,
}

impl Account {
    /// Signs the canonical withdraw intent, the way a client should.
    fn sign_withdraw(&self, amount: u64, recipient: &Principal) -> PasskeyAssertion {
        let digest = AuthorizationIntent::withdraw(self.id.clone(), amount, recipient.clone(), None, 0).digest();
        PasskeyAssertion::new(self.cred, digest, self.device.sign_digest(&digest).unwrap())
    }

    fn sign(&self, message: &[u8]) -> PasskeyAssertion {
        let digest = warden_protocol::crypto::MessageDigest::of(message);
        PasskeyAssertion::new(self.cred, digest, self.device.sign_digest(&digest).unwrap())
    }
}

/// Helper: deploys, registers `name`'s device, and mints `funds` on the host.
fn setup(name: &str, funds: u64) -> (Warden<InMemoryLedger>, Account) {
    let mut warden = Warden::deploy("deployer".into(), InMemoryLedger::new(), VaultParams::default()).unwrap();
    let account = enroll(&mut warden, name, funds);
    (warden, account)
}

fn enroll(warden: &mut Warden<InMemoryLedger>, name: &str, funds: u64) -> Account {
    let account = Account {
        id: name.into(),
        device: PasskeyKeypair::generate(),
        cred: CredentialId::from_raw_id(name.as_bytes()),
    };
    warden
        .register_passkey(&account.id, account.cred, account.device.public_key().as_bytes(), "device")
        .unwrap();
    warden.host_mut().mint(&Asset::Native, &account.id, funds).unwrap();
    account
}

/// Sum of internal balances never exceeds what custody holds on the host.
fn assert_custody_covers_balances(warden: &Warden<InMemoryLedger>, asset: &Asset) {
    let held = u128::from(warden.host().balance_of(asset, warden.custody()));
    assert!(warden.total_custodied(asset) <= held);
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

#[test]
fn threshold_boundary_decides_the_path() {
    let (mut warden, alice) = setup("alice", 3_000_000);
    warden.deposit_native(&alice.id, 3_000_000).unwrap();
    let bob = Principal::from("bob");

    let below = warden
        .withdraw(&alice.id, 999_999, &bob, None, &alice.sign_withdraw(999_999, &bob))
        .unwrap();
    assert_eq!(below, WithdrawalOutcome::Immediate);
    assert_eq!(below.request_id(), 0);

    let at = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap();
    assert_eq!(at, WithdrawalOutcome::Queued(1));

    assert_eq!(warden.host().balance_of(&Asset::Native, &bob), 999_999);
    assert_eq!(warden.get_balance(&alice.id), 2_000_001);
    assert_custody_covers_balances(&warden, &Asset::Native);
}

// ---------------------------------------------------------------------------
// Time lock
// ---------------------------------------------------------------------------

#[test]
fn lock_boundary_is_exact() {
    let (mut warden, alice) = setup("alice", 2_000_000);
    warden.host_mut().advance_blocks(50);
    warden.deposit_native(&alice.id, 2_000_000).unwrap();
    let bob = Principal::from("bob");

    let id = warden
        .withdraw(&alice.id, 1_500_000, &bob, None, &alice.sign_withdraw(1_500_000, &bob))
        .unwrap()
        .request_id();
    let request = warden.get_pending_withdrawal(&alice.id, id).unwrap();
    assert_eq!(request.requested_at, 50);
    assert_eq!(request.status, WithdrawalStatus::Queued);

    warden.host_mut().advance_blocks(143);
    let err = warden.execute_pending(&alice.id, id).unwrap_err();
    assert_eq!(err, VaultError::WithdrawalLocked { remaining: 1 });
    assert_eq!(err.code(), 206);
    assert!(!warden.is_withdrawal_ready(&alice.id, id));

    warden.host_mut().advance_blocks(1);
    assert_eq!(warden.blocks_until_unlock(&alice.id, id), Some(0));
    warden.execute_pending(&alice.id, id).unwrap();

    assert_eq!(warden.get_balance(&alice.id), 500_000);
    assert_eq!(warden.host().balance_of(&Asset::Native, &bob), 1_500_000);
    assert_eq!(
        warden.get_pending_withdrawal(&alice.id, id).unwrap().status,
        WithdrawalStatus::Executed
    );
}

#[test]
fn anyone_may_execute_an_unlocked_request() {
    let (mut warden, alice) = setup("alice", 1_000_000);
    warden.deposit_native(&alice.id, 1_000_000).unwrap();
    let bob = Principal::from("bob");
    let id = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap()
        .request_id();
    warden.host_mut().advance_blocks(144);

    // No caller, no assertion: the recipient was fixed at request time.
    warden.execute_pending(&alice.id, id).unwrap();
    assert_eq!(warden.host().balance_of(&Asset::Native, &bob), 1_000_000);
}

#[test]
fn shorter_lock_applies_to_queued_requests() {
    let (mut warden, alice) = setup("alice", 1_000_000);
    warden.deposit_native(&alice.id, 1_000_000).unwrap();
    let bob = Principal::from("bob");
    let id = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap()
        .request_id();

    warden
        .set_limits(&alice.id, 1_000_000, 10, &alice.sign(b"limits"))
        .unwrap();
    warden.host_mut().advance_blocks(10);
    warden.execute_pending(&alice.id, id).unwrap();
}

#[test]
fn request_ids_are_shared_across_wallets() {
    let (mut warden, alice) = setup("alice", 1_000_000);
    let carol = enroll(&mut warden, "carol", 1_000_000);
    let bob = Principal::from("bob");
    warden.deposit_native(&alice.id, 1_000_000).unwrap();
    warden.deposit_native(&carol.id, 1_000_000).unwrap();

    let a = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap();
    let c = warden
        .withdraw(&carol.id, 1_000_000, &bob, None, &carol.sign_withdraw(1_000_000, &bob))
        .unwrap();
    assert_eq!(a, WithdrawalOutcome::Queued(1));
    assert_eq!(c, WithdrawalOutcome::Queued(2));

    // Carol's id is not alice's to execute.
    warden.host_mut().advance_blocks(144);
    assert_eq!(
        warden.execute_pending(&alice.id, 2),
        Err(VaultError::WithdrawalNotFound(2))
    );
    assert_eq!(warden.stats().withdrawal_request_nonce, 2);
}

#[test]
fn pending_slots_run_out() {
    let (mut warden, alice) = setup("alice", 1_000_000);
    warden.deposit_native(&alice.id, 1_000_000).unwrap();
    let bob = Principal::from("bob");

    for _ in 0..MAX_PENDING_WITHDRAWALS {
        warden
            .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
            .unwrap();
    }
    let err = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap_err();
    assert_eq!(err, VaultError::PendingLimitReached);
    assert_eq!(err.code(), 212);
    assert_eq!(warden.list_pending_withdrawals(&alice.id).len(), MAX_PENDING_WITHDRAWALS);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancelled_request_never_executes() {
    let (mut warden, alice) = setup("alice", 1_000_000);
    warden.deposit_native(&alice.id, 1_000_000).unwrap();
    let bob = Principal::from("bob");
    let id = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap()
        .request_id();

    warden
        .cancel_pending(&alice.id, id, &alice.sign(b"cancel"))
        .unwrap();
    warden.host_mut().advance_blocks(1_000);
    let err = warden.execute_pending(&alice.id, id).unwrap_err();
    assert_eq!(err, VaultError::WithdrawalCancelled(id));
    assert_eq!(err.code(), 208);
    assert_eq!(warden.get_balance(&alice.id), 1_000_000);
    assert_eq!(warden.stats().queued_withdrawals, 0);
}

#[test]
fn cancel_requires_the_owner() {
    let (mut warden, alice) = setup("alice", 1_000_000);
    let mallory = enroll(&mut warden, "mallory", 0);
    warden.deposit_native(&alice.id, 1_000_000).unwrap();
    let bob = Principal::from("bob");
    let id = warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap()
        .request_id();

    // Mallory authenticates fine, but the request is not in her wallet.
    assert_eq!(
        warden.cancel_pending(&mallory.id, id, &mallory.sign(b"cancel")),
        Err(VaultError::WithdrawalNotFound(id))
    );
    assert_eq!(
        warden.get_pending_withdrawal(&alice.id, id).unwrap().status,
        WithdrawalStatus::Queued
    );
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[test]
fn token_withdrawals_follow_the_same_rules() {
    let (mut warden, alice) = setup("alice", 0);
    let usd = TokenId::from("token.usd");
    let asset = Asset::Token(usd.clone());
    warden.host_mut().mint(&asset, &alice.id, 3_000_000).unwrap();
    warden.deposit_token(&alice.id, &usd, 3_000_000).unwrap();
    let bob = Principal::from("bob");

    let small = warden
        .withdraw(&alice.id, 10, &bob, Some(&usd), &alice.sign(b"t1"))
        .unwrap();
    assert_eq!(small, WithdrawalOutcome::Immediate);

    let id = warden
        .withdraw(&alice.id, 2_000_000, &bob, Some(&usd), &alice.sign(b"t2"))
        .unwrap()
        .request_id();
    warden.host_mut().advance_blocks(144);
    warden.execute_pending(&alice.id, id).unwrap();

    assert_eq!(warden.host().balance_of(&asset, &bob), 2_000_010);
    assert_eq!(warden.get_token_balance(&alice.id, &usd), 999_990);
    assert_eq!(warden.get_balance(&alice.id), 0);
    assert_custody_covers_balances(&warden, &asset);
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

#[test]
fn balance_tracks_deposits_minus_withdrawals() {
    let (mut warden, alice) = setup("alice", 10_000);
    let bob = Principal::from("bob");

    warden.deposit_native(&alice.id, 4_000).unwrap();
    warden.deposit_native(&alice.id, 6_000).unwrap();
    warden
        .withdraw(&alice.id, 2_500, &bob, None, &alice.sign_withdraw(2_500, &bob))
        .unwrap();
    // Failed withdrawal changes nothing.
    assert!(warden
        .withdraw(&alice.id, 9_000, &bob, None, &alice.sign_withdraw(9_000, &bob))
        .is_err());

    assert_eq!(warden.get_balance(&alice.id), 10_000 - 2_500);
    assert_eq!(
        warden.host().balance_of(&Asset::Native, warden.custody()),
        7_500
    );
    assert_eq!(warden.stats().total_deposits, 2);
    assert_eq!(warden.stats().total_withdrawals, 1);
}

#[test]
fn custody_principal_cannot_deposit_to_itself() {
    let (mut warden, alice) = setup("alice", 500_000);
    warden.deposit_native(&alice.id, 500_000).unwrap();
    let custody = warden.custody().clone();
    let vault = enroll(&mut warden, custody.as_str(), 500_000);
    let mallory = Principal::from("mallory");

    assert_eq!(
        warden.deposit_native(&vault.id, 500_000),
        Err(VaultError::CustodyPrincipal)
    );
    assert_eq!(warden.get_balance(&vault.id), 0);

    let err = warden
        .withdraw(&vault.id, 500_000, &mallory, None, &vault.sign_withdraw(500_000, &mallory))
        .unwrap_err();
    assert_eq!(err, VaultError::CustodyPrincipal);
    assert_eq!(err.code(), 200);

    assert_eq!(warden.host().balance_of(&Asset::Native, &mallory), 0);
    assert_eq!(warden.get_balance(&alice.id), 500_000);
    assert_custody_covers_balances(&warden, &Asset::Native);
}

#[test]
fn withdrawal_to_custody_is_refused() {
    let (mut warden, alice) = setup("alice", 2_000_000);
    warden.deposit_native(&alice.id, 2_000_000).unwrap();
    let custody = warden.custody().clone();

    for amount in [10, 1_500_000] {
        let err = warden
            .withdraw(&alice.id, amount, &custody, None, &alice.sign_withdraw(amount, &custody))
            .unwrap_err();
        assert_eq!(err, VaultError::CustodyPrincipal);
    }
    assert_eq!(warden.get_balance(&alice.id), 2_000_000);
    assert!(warden.list_pending_withdrawals(&alice.id).is_empty());
    assert_custody_covers_balances(&warden, &Asset::Native);
}

#[test]
fn revoked_passkey_cannot_withdraw() {
    let (mut warden, alice) = setup("alice", 100);
    warden.deposit_native(&alice.id, 100).unwrap();
    warden.revoke_passkey(&alice.id, alice.cred).unwrap();

    let err = warden
        .withdraw(&alice.id, 50, &"bob".into(), None, &alice.sign(b"w"))
        .unwrap_err();
    assert_eq!(err.code(), 204);
    assert_eq!(warden.get_balance(&alice.id), 100);
}

#[test]
fn withdrawal_events_carry_request_ids() {
    let (mut warden, alice) = setup("alice", 2_000_000);
    warden.deposit_native(&alice.id, 2_000_000).unwrap();
    let bob = Principal::from("bob");
    warden
        .withdraw(&alice.id, 1_000_000, &bob, None, &alice.sign_withdraw(1_000_000, &bob))
        .unwrap();

    let queued = warden
        .events()
        .iter()
        .find_map(|r| match &r.event {
            WardenEvent::WithdrawalQueued {
                request_id,
                unlock_height,
                ..
            } => Some((*request_id, *unlock_height)),
            _ => None,
        })
        .unwrap();
    assert_eq!(queued, (1, 144));
}

#[test]
fn gated_calls_log_authentication_before_the_operation() {
    let (mut warden, alice) = setup("alice", 1_000);
    warden.deposit_native(&alice.id, 1_000).unwrap();
    let bob = Principal::from("bob");
    let before = warden.events().len() as u64;

    warden
        .withdraw(&alice.id, 100, &bob, None, &alice.sign_withdraw(100, &bob))
        .unwrap();

    let records = warden.events_since(before);
    let kinds: Vec<_> = records.iter().map(|r| r.event.kind()).collect();
    assert_eq!(kinds, vec!["authenticated", "withdrawal-executed"]);
    assert_eq!(records[0].sequence, before);
    assert_eq!(records[1].sequence, before + 1);
}
