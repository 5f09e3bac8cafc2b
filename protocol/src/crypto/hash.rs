//! # Hashing Utilities
//!
//! SHA-256 is the only hash function in Warden. WebAuthn authenticators
//! sign SHA-256 digests, the P-256 signatures we verify are over SHA-256
//! digests, and canonical authorization digests are SHA-256 too. One hash
//! function, one set of test vectors.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use warden_protocol::crypto::sha256_array;
///
/// let hash = sha256_array(b"warden");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-2.
        let hash = sha256_array(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_empty_vector() {
        assert_eq!(
            hex::encode(sha256_array(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
