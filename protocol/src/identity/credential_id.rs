//! Passkey credential identifiers.

use std::fmt;

use crate::config::CREDENTIAL_ID_LENGTH;
use crate::crypto::hash::sha256_array;
use crate::encoding::decode_fixed;

/// A 32-byte opaque handle for one passkey of one wallet.
///
/// Unique per wallet, not globally: two wallets may register the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialId([u8; CREDENTIAL_ID_LENGTH]);

impl CredentialId {
    pub fn from_bytes(bytes: [u8; CREDENTIAL_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Hashes a raw WebAuthn credential id (any length) down to 32 bytes.
    pub fn from_raw_id(raw: &[u8]) -> Self {
        Self(sha256_array(raw))
    }

    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_ID_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed::<CREDENTIAL_ID_LENGTH>(s).map(Self)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({}..)", &self.to_hex()[..12])
    }
}

hex_serde!(CredentialId);
