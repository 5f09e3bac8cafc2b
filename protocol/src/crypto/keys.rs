//! # Passkey Key Material
//!
//! P-256 public keys, signatures and message digests as they cross the
//! Warden boundary.
//!
//! The protocol only ever holds the *public* half of a passkey. Devices
//! (platform authenticators, security keys) create the key pair and sign
//! off-system; Warden stores the 65-byte SEC1 uncompressed public key at
//! registration and verifies 64-byte `r || s` signatures over 32-byte
//! digests from then on.
//!
//! ## Accepted key format
//!
//! Exactly 65 bytes, first byte `0x04`. Compressed 33-byte keys are
//! rejected, even though WebAuthn tooling commonly hands them out.
//! Registration validates the *format* only; a well-formed key that is not
//! a point on the curve registers fine and simply never verifies.
//!
//! [`PasskeyKeypair`] exists for device simulation in tests, benches and
//! devnet tooling. Nothing in the contract path stores one.

use std::fmt;

use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature as P256Signature, SigningKey};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::{
    COMPRESSED_PUBLIC_KEY_LENGTH, DIGEST_LENGTH, SIGNATURE_LENGTH,
    UNCOMPRESSED_POINT_MARKER, UNCOMPRESSED_PUBLIC_KEY_LENGTH,
};
use crate::encoding::decode_fixed;

/// Errors that can occur while parsing key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid public key length: expected 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("compressed public keys are not accepted")]
    CompressedKey,

    #[error("invalid public key prefix 0x{0:02x}: expected 0x04")]
    InvalidMarker(u8),

    #[error("invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("invalid digest length: expected 32 bytes, got {0}")]
    InvalidDigestLength(usize),

    #[error("invalid hex encoding")]
    InvalidHex,

    #[error("invalid secret key bytes")]
    InvalidSecretKey,
}

// ---------------------------------------------------------------------------
// PasskeyPublicKey
// ---------------------------------------------------------------------------

/// A registered passkey's public key: a SEC1 uncompressed P-256 point.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PasskeyPublicKey([u8; UNCOMPRESSED_PUBLIC_KEY_LENGTH]);

impl PasskeyPublicKey {
    /// Validates and wraps raw key bytes.
    ///
    /// # Errors
    ///
    /// - [`KeyError::CompressedKey`] for a 33-byte `0x02`/`0x03` key.
    /// - [`KeyError::InvalidLength`] for any other length but 65.
    /// - [`KeyError::InvalidMarker`] if the first byte is not `0x04`.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() == COMPRESSED_PUBLIC_KEY_LENGTH && matches!(bytes[0], 0x02 | 0x03) {
            return Err(KeyError::CompressedKey);
        }
        if bytes.len() != UNCOMPRESSED_PUBLIC_KEY_LENGTH {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        if bytes[0] != UNCOMPRESSED_POINT_MARKER {
            return Err(KeyError::InvalidMarker(bytes[0]));
        }
        let mut out = [0u8; UNCOMPRESSED_PUBLIC_KEY_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Raw 65 bytes.
    pub fn as_bytes(&self) -> &[u8; UNCOMPRESSED_PUBLIC_KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses hex and applies the same format rules as
    /// [`from_sec1_bytes`](Self::from_sec1_bytes).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| KeyError::InvalidHex)?;
        Self::from_sec1_bytes(&bytes)
    }
}

impl fmt::Debug for PasskeyPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasskeyPublicKey({}..)", &self.to_hex()[..16])
    }
}

hex_serde!(PasskeyPublicKey);

// ---------------------------------------------------------------------------
// PasskeySignature
// ---------------------------------------------------------------------------

/// A fixed-width `r || s` ECDSA signature.
///
/// Parsing only checks the length. Whether the scalars are in range is
/// decided at verification time, where a bad scalar is just another
/// invalid signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PasskeySignature([u8; SIGNATURE_LENGTH]);

impl PasskeySignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignatureLength(slice.len()));
        }
        let mut out = [0u8; SIGNATURE_LENGTH];
        out.copy_from_slice(slice);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        decode_fixed::<SIGNATURE_LENGTH>(s)
            .map(Self)
            .map_err(|_| KeyError::InvalidSignatureLength(s.len() / 2))
    }
}

impl fmt::Debug for PasskeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasskeySignature({}..)", &self.to_hex()[..16])
    }
}

hex_serde!(PasskeySignature);

// ---------------------------------------------------------------------------
// MessageDigest
// ---------------------------------------------------------------------------

/// The 32-byte value a passkey signs.
///
/// Opaque to the authenticator: nothing checks that it commits to the
/// operation being authorized. See [`crate::crypto::digest`] for the
/// canonical encoding clients should use.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageDigest([u8; DIGEST_LENGTH]);

impl MessageDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != DIGEST_LENGTH {
            return Err(KeyError::InvalidDigestLength(slice.len()));
        }
        let mut out = [0u8; DIGEST_LENGTH];
        out.copy_from_slice(slice);
        Ok(Self(out))
    }

    /// SHA-256 of arbitrary bytes, for callers that sign raw payloads.
    pub fn of(data: &[u8]) -> Self {
        Self(crate::crypto::hash::sha256_array(data))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        decode_fixed::<DIGEST_LENGTH>(s)
            .map(Self)
            .map_err(|_| KeyError::InvalidDigestLength(s.len() / 2))
    }
}

impl fmt::Debug for MessageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageDigest({})", self.to_hex())
    }
}

hex_serde!(MessageDigest);

// ---------------------------------------------------------------------------
// PasskeyKeypair
// ---------------------------------------------------------------------------

/// A simulated authenticator: a P-256 signing key.
///
/// Intentionally not `Serialize`. Export the secret with
/// [`secret_key_bytes`](Self::secret_key_bytes) if you really mean it.
pub struct PasskeyKeypair {
    signing_key: SigningKey,
}

impl PasskeyKeypair {
    /// Generates a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuilds a key from its 32-byte secret scalar.
    pub fn from_secret_key_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// The uncompressed public key, ready for registration.
    pub fn public_key(&self) -> PasskeyPublicKey {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut out = [0u8; UNCOMPRESSED_PUBLIC_KEY_LENGTH];
        out.copy_from_slice(point.as_bytes());
        PasskeyPublicKey(out)
    }

    /// The 33-byte compressed encoding of the same point.
    pub fn compressed_public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Signs a prehashed digest, the way a WebAuthn authenticator does.
    pub fn sign_digest(
        &self,
        digest: &MessageDigest,
    ) -> Result<PasskeySignature, super::signatures::SignatureError> {
        let signature: P256Signature = self
            .signing_key
            .sign_prehash(digest.as_bytes())
            .map_err(|_| super::signatures::SignatureError::SigningFailed)?;
        PasskeySignature::try_from_slice(&signature.to_bytes())
            .map_err(|_| super::signatures::SignatureError::SigningFailed)
    }
}

impl fmt::Debug for PasskeyKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasskeyKeypair(pub={:?})", self.public_key())
    }
}
