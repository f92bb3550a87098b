//! SHA-256 identifiers.
//!
//! Each part is fed to the hasher as its UTF-8 byte length in decimal followed
//! by the bytes themselves, so `("ab", "c")` and `("a", "bc")` never collide.

use lao_types::{Base64UrlData, Hash, MessageId, Signature};
use sha2::{Digest, Sha256};

/// Hash an ordered tuple of strings.
pub fn hash(parts: &[&str]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(part.as_bytes());
    }
    Hash::from_bytes(hasher.finalize().into())
}

/// `message_id = Hash(data, signature)` over their base64url forms.
pub fn message_id(data: &Base64UrlData, signature: &Signature) -> MessageId {
    hash(&[data.as_str(), &signature.encoded()]).into()
}
