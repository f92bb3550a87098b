//! Hierarchical publish/subscribe addresses.
//!
//! A channel is a slash-delimited path rooted at `/root`. The second segment,
//! when present, is the id of the LAO the channel belongs to.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::{Hash, PublicKey, TypesError};

const ROOT: &str = "/root";

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(String);

impl Channel {
    /// The root channel, on which LAO creations are published.
    pub fn root() -> Self {
        Self(ROOT.to_string())
    }

    pub fn parse(path: &str) -> Result<Self, TypesError> {
        let rest = path
            .strip_prefix(ROOT)
            .ok_or_else(|| TypesError::InvalidChannel(path.to_string()))?;
        if !rest.is_empty() {
            let segments = rest
                .strip_prefix('/')
                .ok_or_else(|| TypesError::InvalidChannel(path.to_string()))?;
            if segments.split('/').any(str::is_empty) {
                return Err(TypesError::InvalidChannel(path.to_string()));
            }
        }
        Ok(Self(path.to_string()))
    }

    /// `/root/<lao_id>`
    pub fn lao(lao_id: &Hash) -> Self {
        Self::root().sub_channel(lao_id.as_str())
    }

    /// `/root/<lao_id>/<election_id>`
    pub fn election(lao_id: &Hash, election_id: &Hash) -> Self {
        Self::lao(lao_id).sub_channel(election_id.as_str())
    }

    /// `/root/<lao_id>/consensus`
    pub fn consensus(lao_id: &Hash) -> Self {
        Self::lao(lao_id).sub_channel("consensus")
    }

    /// `/root/<lao_id>/social/<sender>`
    pub fn social(lao_id: &Hash, sender: &PublicKey) -> Self {
        Self::lao(lao_id)
            .sub_channel("social")
            .sub_channel(&sender.encoded())
    }

    /// `/root/<lao_id>/social/reactions`
    pub fn reactions(lao_id: &Hash) -> Self {
        Self::lao(lao_id).sub_channel("social").sub_channel("reactions")
    }

    /// Append one path segment.
    pub fn sub_channel(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').skip(2)
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    /// Whether this is exactly `/root/<lao_id>`.
    pub fn is_lao_channel(&self) -> bool {
        self.segments().count() == 1
    }

    /// The LAO id this channel belongs to, if any.
    pub fn lao_id(&self) -> Option<Hash> {
        self.segments().next().and_then(|s| Hash::parse(s).ok())
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Strict descendant check.
    pub fn is_sub_channel_of(&self, other: &Channel) -> bool {
        self.0.len() > other.0.len()
            && self.0.starts_with(&other.0)
            && self.0.as_bytes()[other.0.len()] == b'/'
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({})", self.0)
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lao_id() -> Hash {
        Hash::from_bytes([1u8; 32])
    }

    #[test]
    fn parse_accepts_rooted_paths() {
        assert!(Channel::parse("/root").unwrap().is_root());
        let ch = Channel::parse("/root/abc/consensus").unwrap();
        assert_eq!(ch.segments().collect::<Vec<_>>(), vec!["abc", "consensus"]);
    }

    #[test]
    fn parse_rejects_bad_paths() {
        for bad in ["", "root", "/rootx", "/root/", "/root//a", "/other/a", "/root/a/"] {
            assert!(Channel::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn lao_channel_helpers() {
        let id = lao_id();
        let lao = Channel::lao(&id);
        assert!(lao.is_lao_channel());
        assert_eq!(lao.lao_id(), Some(id.clone()));

        let consensus = Channel::consensus(&id);
        assert!(!consensus.is_lao_channel());
        assert_eq!(consensus.lao_id(), Some(id.clone()));
        assert_eq!(consensus.parent(), Some(lao.clone()));
        assert!(consensus.is_sub_channel_of(&lao));
        assert!(!lao.is_sub_channel_of(&consensus));

        let reactions = Channel::reactions(&id);
        assert!(reactions.as_str().ends_with("/social/reactions"));
    }

    #[test]
    fn parent_is_strict_prefix() {
        let ch = Channel::lao(&lao_id()).sub_channel("x").sub_channel("y");
        let parent = ch.parent().unwrap();
        assert!(ch.is_sub_channel_of(&parent));
        assert_eq!(Channel::root().parent(), None);
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_sub_channel() {
        let a = Channel::parse("/root/ab").unwrap();
        let b = Channel::parse("/root/abc").unwrap();
        assert!(!b.is_sub_channel_of(&a));
    }

    #[test]
    fn root_has_no_lao() {
        assert_eq!(Channel::root().lao_id(), None);
    }
}
