//! # Signature Verification
//!
//! ECDSA P-256 verification over prehashed 32-byte digests. This is the
//! single cryptographic check behind every authorization decision in
//! Warden.
//!
//! We verify the digest as-is (`verify_prehash`), never re-hashing it.
//! WebAuthn authenticators sign `SHA-256(authenticatorData || clientDataHash)`
//! and hand the relying party that digest; hashing it again would make
//! every real passkey signature fail.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey};
use thiserror::Error;

use super::keys::{MessageDigest, PasskeyPublicKey, PasskeySignature};

/// Errors during signature operations.
///
/// Deliberately coarse: "the key does not parse as a curve point" and
/// "the signature does not match" are different variants, but neither
/// says anything about *why* the math failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("malformed signature scalars")]
    MalformedSignature,

    #[error("public key is not a valid P-256 point")]
    InvalidPublicKey,

    #[error("signing failed")]
    SigningFailed,
}

/// Verify a P-256 signature over a prehashed digest.
///
/// # Errors
///
/// - [`SignatureError::InvalidPublicKey`] if the stored key bytes are
///   well-formed but not a point on the curve.
/// - [`SignatureError::MalformedSignature`] if `r` or `s` is zero or out
///   of range.
/// - [`SignatureError::VerificationFailed`] on a mismatch.
pub fn verify_prehash(
    public_key: &PasskeyPublicKey,
    digest: &MessageDigest,
    signature: &PasskeySignature,
) -> Result<(), SignatureError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key.as_bytes())
        .map_err(|_| SignatureError::InvalidPublicKey)?;

    let signature = P256Signature::from_slice(signature.as_bytes())
        .map_err(|_| SignatureError::MalformedSignature)?;

    verifying_key
        .verify_prehash(digest.as_bytes(), &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Boolean form of [`verify_prehash`]. All failure modes are just `false`.
///
/// # Example
///
/// ```
/// use warden_protocol::crypto::{verify, MessageDigest, PasskeyKeypair};
///
/// let device = PasskeyKeypair::generate();
/// let digest = MessageDigest::of(b"withdraw 500 to bob");
/// let signature = device.sign_digest(&digest).unwrap();
///
/// assert!(verify(&device.public_key(), &digest, &signature));
/// ```
pub fn verify(
    public_key: &PasskeyPublicKey,
    digest: &MessageDigest,
    signature: &PasskeySignature,
) -> bool {
    verify_prehash(public_key, digest, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PasskeyKeypair;

    #[test]
    fn test_sign_and_verify() {
        let kp = PasskeyKeypair::generate();
        let digest = MessageDigest::of(b"hello, world");
        let sig = kp.sign_digest(&digest).unwrap();
        assert!(verify(&kp.public_key(), &digest, &sig));
    }

    #[test]
    fn test_wrong_digest_fails() {
        let kp = PasskeyKeypair::generate();
        let sig = kp.sign_digest(&MessageDigest::of(b"correct")).unwrap();
        assert_eq!(
            verify_prehash(&kp.public_key(), &MessageDigest::of(b"wrong"), &sig),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = PasskeyKeypair::generate();
        let kp2 = PasskeyKeypair::generate();
        let digest = MessageDigest::of(b"test message");
        let sig = kp1.sign_digest(&digest).unwrap();
        assert!(!verify(&kp2.public_key(), &digest, &sig));
    }

    #[test]
    fn test_zero_signature_is_malformed() {
        let kp = PasskeyKeypair::generate();
        let digest = MessageDigest::of(b"doesn't matter");
        let sig = PasskeySignature::from_bytes([0u8; 64]);
        assert_eq!(
            verify_prehash(&kp.public_key(), &digest, &sig),
            Err(SignatureError::MalformedSignature)
        );
    }

    #[test]
    fn test_off_curve_key_is_rejected_at_verification() {
        let mut bytes = [0x11u8; 65];
        bytes[0] = 0x04;
        let pk = PasskeyPublicKey::from_sec1_bytes(&bytes).unwrap();
        let kp = PasskeyKeypair::generate();
        let digest = MessageDigest::of(b"anything");
        let sig = kp.sign_digest(&digest).unwrap();
        assert_eq!(
            verify_prehash(&pk, &digest, &sig),
            Err(SignatureError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_digest_is_not_rehashed() {
        // Signing the SHA-256 of the digest must not verify against the digest.
        let kp = PasskeyKeypair::generate();
        let digest = MessageDigest::of(b"payload");
        let double = MessageDigest::of(digest.as_bytes());
        let sig = kp.sign_digest(&double).unwrap();
        assert!(!verify(&kp.public_key(), &digest, &sig));
    }
}
