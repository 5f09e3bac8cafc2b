//! Hex encoding helpers shared by the fixed-width byte newtypes.
//!
//! Keys, signatures, digests and credential ids all travel as lowercase hex
//! strings in JSON. The [`hex_serde!`] macro gives each newtype the same
//! serde representation without pulling in a serde-arrays dependency.

/// Decodes a hex string (optionally `0x`-prefixed) into exactly `N` bytes.
pub fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed)?;
    if bytes.len() != N {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Implements hex-string `Serialize`/`Deserialize` for a newtype that has
/// `to_hex(&self) -> String` and `from_hex(&str) -> Result<Self, E>` where
/// `E: Display`.
macro_rules! hex_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                <$ty>::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
