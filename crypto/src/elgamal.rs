//! ElGamal encryption over the Ed25519 group, for secret-ballot votes.
//!
//! Payloads of up to [`MAX_EMBED_LEN`] bytes are embedded into a curve point:
//! a random 32-byte compressed encoding whose first byte holds the payload
//! length and whose following bytes hold the payload. Encodings that do not
//! decompress to a prime-order point are discarded and redrawn.
//!
//! A ciphertext is `K ‖ C` (two compressed points, 64 bytes) with
//! `K = k·G` and `C = k·Y + M` for the election key `Y`.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::Scalar;
use lao_types::{base64url, Base64UrlData};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

use crate::CryptoError;

/// Largest payload that fits in one point: (255 - 8 - 8) / 8.
pub const MAX_EMBED_LEN: usize = 29;

const MAX_EMBED_ATTEMPTS: usize = 1024;

/// The public election key announced in `election#key`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ElectionPublicKey(EdwardsPoint);

/// The matching secret scalar. Only the key holder can tally secret ballots.
pub struct ElectionSecretKey(Scalar);

pub struct ElectionKeyPair {
    pub public: ElectionPublicKey,
    pub secret: ElectionSecretKey,
}

impl ElectionKeyPair {
    pub fn generate() -> Self {
        let secret = Scalar::random(&mut OsRng);
        Self {
            public: ElectionPublicKey(EdwardsPoint::mul_base(&secret)),
            secret: ElectionSecretKey(secret),
        }
    }
}

impl ElectionPublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        decompress(bytes).map(Self)
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&base64url::decode_array::<32>(encoded)?)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn encoded(&self) -> String {
        base64url::encode(self.to_bytes())
    }

    /// Encrypt a short payload.
    pub fn encrypt(&self, payload: &[u8]) -> Result<Base64UrlData, CryptoError> {
        let message = embed(payload)?;
        let k = Scalar::random(&mut OsRng);
        let big_k = EdwardsPoint::mul_base(&k);
        let shared = self.0 * k;
        let c = shared + message;

        let mut out = [0u8; 64];
        out[..32].copy_from_slice(big_k.compress().as_bytes());
        out[32..].copy_from_slice(c.compress().as_bytes());
        Ok(Base64UrlData::encode(out))
    }

    /// Encrypt a ballot option index as two big-endian bytes.
    pub fn encrypt_vote_index(&self, index: u16) -> Result<Base64UrlData, CryptoError> {
        self.encrypt(&index.to_be_bytes())
    }
}

impl ElectionSecretKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(Scalar::from_canonical_bytes(*bytes)).map(Self)
    }

    pub fn public_key(&self) -> ElectionPublicKey {
        ElectionPublicKey(EdwardsPoint::mul_base(&self.0))
    }

    /// Decrypt a `K ‖ C` ciphertext back into its payload.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes = base64url::decode(ciphertext)?;
        if bytes.len() != 64 {
            return Err(CryptoError::InvalidCiphertext(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut k_bytes = [0u8; 32];
        let mut c_bytes = [0u8; 32];
        k_bytes.copy_from_slice(&bytes[..32]);
        c_bytes.copy_from_slice(&bytes[32..]);

        let big_k = decompress(&k_bytes)?;
        let c = decompress(&c_bytes)?;
        let message = c - big_k * self.0;
        extract(&message)
    }

    /// Decrypt a ballot produced by [`ElectionPublicKey::encrypt_vote_index`].
    pub fn decrypt_vote_index(&self, ciphertext: &str) -> Result<u16, CryptoError> {
        let payload = self.decrypt(ciphertext)?;
        let bytes: [u8; 2] = payload.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidCiphertext(format!("vote payload of {} bytes", payload.len()))
        })?;
        Ok(u16::from_be_bytes(bytes))
    }
}

impl Drop for ElectionSecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

fn decompress(bytes: &[u8; 32]) -> Result<EdwardsPoint, CryptoError> {
    CompressedEdwardsY(*bytes)
        .decompress()
        .ok_or(CryptoError::InvalidPoint)
}

fn embed(payload: &[u8]) -> Result<EdwardsPoint, CryptoError> {
    if payload.len() > MAX_EMBED_LEN {
        return Err(CryptoError::PayloadTooLong {
            len: payload.len(),
            max: MAX_EMBED_LEN,
        });
    }
    let mut buf = [0u8; 32];
    for _ in 0..MAX_EMBED_ATTEMPTS {
        OsRng.fill_bytes(&mut buf);
        buf[0] = payload.len() as u8;
        buf[1..1 + payload.len()].copy_from_slice(payload);

        let Some(point) = CompressedEdwardsY(buf).decompress() else {
            continue;
        };
        if point.is_torsion_free() && point.compress().to_bytes() == buf {
            return Ok(point);
        }
    }
    Err(CryptoError::EmbeddingFailed)
}

fn extract(point: &EdwardsPoint) -> Result<Vec<u8>, CryptoError> {
    let bytes = point.compress().to_bytes();
    let len = bytes[0] as usize;
    if len > MAX_EMBED_LEN {
        return Err(CryptoError::InvalidCiphertext(format!(
            "embedded length {len} out of range"
        )));
    }
    Ok(bytes[1..1 + len].to_vec())
}

impl fmt::Debug for ElectionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElectionPublicKey({})", self.encoded())
    }
}

impl Serialize for ElectionPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded())
    }
}

impl<'de> Deserialize<'de> for ElectionPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_encoded(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let kp = ElectionKeyPair::generate();
        let ct = kp.public.encrypt(b"hello").unwrap();
        assert_eq!(kp.secret.decrypt(ct.as_str()).unwrap(), b"hello");
    }

    #[test]
    fn ciphertext_is_64_bytes() {
        let kp = ElectionKeyPair::generate();
        let ct = kp.public.encrypt_vote_index(3).unwrap();
        assert_eq!(ct.decode().len(), 64);
    }

    #[test]
    fn encryption_is_randomized() {
        let kp = ElectionKeyPair::generate();
        let a = kp.public.encrypt_vote_index(1).unwrap();
        let b = kp.public.encrypt_vote_index(1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn vote_index_boundaries() {
        let kp = ElectionKeyPair::generate();
        for idx in [0u16, 1, 255, 256, u16::MAX] {
            let ct = kp.public.encrypt_vote_index(idx).unwrap();
            assert_eq!(kp.secret.decrypt_vote_index(ct.as_str()).unwrap(), idx);
        }
    }

    #[test]
    fn empty_and_max_payloads() {
        let kp = ElectionKeyPair::generate();
        let ct = kp.public.encrypt(b"").unwrap();
        assert!(kp.secret.decrypt(ct.as_str()).unwrap().is_empty());

        let max = [0x5A; MAX_EMBED_LEN];
        let ct = kp.public.encrypt(&max).unwrap();
        assert_eq!(kp.secret.decrypt(ct.as_str()).unwrap(), max);
    }

    #[test]
    fn payload_too_long_is_rejected() {
        let kp = ElectionKeyPair::generate();
        assert_eq!(
            kp.public.encrypt(&[0u8; MAX_EMBED_LEN + 1]).unwrap_err(),
            CryptoError::PayloadTooLong {
                len: MAX_EMBED_LEN + 1,
                max: MAX_EMBED_LEN
            }
        );
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let kp = ElectionKeyPair::generate();
        let short = base64url::encode([0u8; 40]);
        assert!(matches!(
            kp.secret.decrypt(&short),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn public_key_roundtrips_through_encoding() {
        let kp = ElectionKeyPair::generate();
        let encoded = kp.public.encoded();
        assert_eq!(ElectionPublicKey::from_encoded(&encoded).unwrap(), kp.public);
        assert_eq!(kp.secret.public_key(), kp.public);

        let json = serde_json::to_string(&kp.public).unwrap();
        let back: ElectionPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kp.public);
    }

    #[test]
    fn wrong_secret_does_not_recover_index() {
        let kp = ElectionKeyPair::generate();
        let other = ElectionKeyPair::generate();
        let ct = kp.public.encrypt_vote_index(7).unwrap();
        assert_ne!(other.secret.decrypt_vote_index(ct.as_str()).ok(), Some(7));
    }
}
