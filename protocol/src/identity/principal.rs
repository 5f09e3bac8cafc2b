//! Ledger principals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque ledger identity.
///
/// Compared byte-for-byte. No normalization happens here: `"Alice"` and
/// `"alice"` are different wallets.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The vault's own custody account on the host ledger.
    pub fn custody() -> Self {
        Self::new(crate::config::CUSTODY_PRINCIPAL)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Self(s)
    }
}
