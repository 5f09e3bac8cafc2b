//! # Cryptographic Primitives for Warden
//!
//! Everything security-related in the protocol flows through here:
//!
//! - **ECDSA P-256** verification over prehashed digests, because that is
//!   what passkeys produce.
//! - **SHA-256** for digests and credential-id hashing.
//! - **Canonical authorization digests** that bind a signature to the
//!   operation it authorizes.
//!
//! Everything here is a thin, type-safe wrapper around the audited
//! RustCrypto implementations. No curve arithmetic is written by hand.

pub mod digest;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use digest::{AuthorizationIntent, IntentKind};
pub use hash::sha256_array;
pub use keys::{KeyError, MessageDigest, PasskeyKeypair, PasskeyPublicKey, PasskeySignature};
pub use signatures::{verify, verify_prehash, SignatureError};
