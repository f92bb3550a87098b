//! Content-addressed identifiers.
//!
//! Every id in the protocol is a SHA-256 digest carried as padded base64url.
//! The encoded string is kept verbatim because ids are themselves hashed into
//! other ids, and ordering is defined over the encoding.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::base64url;
use crate::TypesError;

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            encoded: String,
            bytes: [u8; 32],
        }

        impl $name {
            /// Wrap a raw 32-byte digest.
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self {
                    encoded: base64url::encode(bytes),
                    bytes,
                }
            }

            /// Parse a base64url digest, keeping the encoding as given.
            pub fn parse(encoded: &str) -> Result<Self, TypesError> {
                let bytes = base64url::decode_array::<32>(encoded)?;
                Ok(Self {
                    encoded: encoded.to_string(),
                    bytes,
                })
            }

            pub fn as_str(&self) -> &str {
                &self.encoded
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.bytes
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.encoded)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.encoded[..8])
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.encoded)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

digest_id! {
    /// A derived identifier: LAO, election, question, vote, roll call, meeting,
    /// consensus instance.
    Hash
}

digest_id! {
    /// The id of a signed envelope: `Hash(data, signature)`.
    MessageId
}

impl From<MessageId> for Hash {
    fn from(id: MessageId) -> Self {
        Self {
            encoded: id.encoded,
            bytes: id.bytes,
        }
    }
}

impl From<Hash> for MessageId {
    fn from(hash: Hash) -> Self {
        Self {
            encoded: hash.encoded,
            bytes: hash.bytes,
        }
    }
}
