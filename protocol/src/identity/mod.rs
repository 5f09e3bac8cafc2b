//! # Identity Module
//!
//! The two identifiers every Warden operation is keyed by:
//!
//! 1. **Principal**: an opaque ledger identity. Wallets, withdrawal
//!    recipients, token contracts, and the vault's own custody account are
//!    all principals. The host ledger decides what a principal string looks
//!    like; Warden only compares them.
//! 2. **CredentialId**: a 32-byte handle naming one passkey within a
//!    wallet. Authenticators emit variable-length raw ids, so clients hash
//!    them down with [`CredentialId::from_raw_id`].

pub mod credential_id;
pub mod principal;

pub use credential_id::CredentialId;
pub use principal::Principal;
