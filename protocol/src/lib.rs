// Copyright (c) 2026 Warden Contributors. MIT License.
// See LICENSE for details.

//! # Warden Protocol: Core Library
//!
//! The shared vocabulary of the Warden custody core: identities, passkey
//! key material, signature verification, and the host ledger the
//! contracts run on. The state machines themselves live in
//! `warden-contracts`; this crate holds everything they stand on.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants and deployment parameters.
//! - **crypto**: P-256 verification, SHA-256, canonical authorization
//!   digests.
//! - **identity**: Principals and passkey credential ids.
//! - **ledger**: The `Host` trait (height, balances, transfers) and an
//!   in-memory host.
//!
//! ## Design Philosophy
//!
//! 1. The protocol never sees private keys. `PasskeyKeypair` exists for
//!    device simulation only.
//! 2. Every fixed-width byte string is a newtype with a hex wire format.
//! 3. Hosts are `Clone` so calls can be staged and committed atomically.

#[macro_use]
mod encoding;

pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;

pub use encoding::decode_fixed;
