//! Base64url encoding as used on the wire.
//!
//! Every binary field of the protocol (keys, signatures, hashes, message data)
//! travels as padded base64url. Decoding accepts both padded and unpadded
//! input since some peers strip the trailing `=`.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::TypesError;

const URL_SAFE_PADDED: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode raw bytes as padded base64url.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_PADDED.encode(bytes)
}

/// Decode a base64url string (padding optional).
pub fn decode(encoded: &str) -> Result<Vec<u8>, TypesError> {
    URL_SAFE_PADDED
        .decode(encoded)
        .map_err(|e| TypesError::InvalidBase64(format!("{encoded:?}: {e}")))
}

/// Decode a base64url string that must hold exactly `N` bytes.
pub fn decode_array<const N: usize>(encoded: &str) -> Result<[u8; N], TypesError> {
    let bytes = decode(encoded)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| TypesError::InvalidLength {
        expected: N,
        actual,
    })
}

/// An arbitrary binary payload kept in its base64url form.
///
/// The encoded string is what gets hashed and signed around, so it is stored
/// verbatim instead of being re-encoded from bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Base64UrlData(String);

impl Base64UrlData {
    /// Wrap raw bytes.
    pub fn encode(bytes: impl AsRef<[u8]>) -> Self {
        Self(encode(bytes))
    }

    /// Validate and wrap an already-encoded string.
    pub fn parse(encoded: impl Into<String>) -> Result<Self, TypesError> {
        let encoded = encoded.into();
        decode(&encoded)?;
        Ok(Self(encoded))
    }

    /// The decoded bytes.
    pub fn decode(&self) -> Vec<u8> {
        // Validated at construction.
        decode(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Base64UrlData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Base64UrlData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Base64UrlData({} chars)", self.0.len())
    }
}

impl Serialize for Base64UrlData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Base64UrlData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_padded() {
        assert_eq!(encode(b"a"), "YQ==");
    }

    #[test]
    fn decode_accepts_missing_padding() {
        assert_eq!(decode("YQ").unwrap(), b"a");
        assert_eq!(decode("YQ==").unwrap(), b"a");
    }

    #[test]
    fn decode_uses_url_alphabet() {
        let bytes = [0xfb, 0xff];
        let encoded = encode(bytes);
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn decode_array_checks_length() {
        let err = decode_array::<32>(&encode([1u8; 31])).unwrap_err();
        assert_eq!(
            err,
            TypesError::InvalidLength {
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Base64UrlData::parse("not base64!").is_err());
    }

    #[test]
    fn serde_keeps_encoding_verbatim() {
        let data = Base64UrlData::encode(br#"{"object":"lao"}"#);
        let json = serde_json::to_string(&data).unwrap();
        let back: Base64UrlData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
        assert_eq!(back.decode(), br#"{"object":"lao"}"#);
    }
}
