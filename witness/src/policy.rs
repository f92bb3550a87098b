//! Which payloads skip witnessing.

use lao_messages::data::{Action, Object, ObjectAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::WitnessError;

/// Exemptions, written as `"object#action"` or `"object#*"`.
/// `message#witness` is always exempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct WitnessPolicy {
    objects: BTreeSet<Object>,
    pairs: BTreeSet<ObjectAction>,
}

impl Default for WitnessPolicy {
    fn default() -> Self {
        Self {
            objects: [Object::Consensus, Object::Chirp, Object::Reaction].into(),
            pairs: [
                ObjectAction::new(Object::Lao, Action::Greet),
                ObjectAction::new(Object::Election, Action::CastVote),
            ]
            .into(),
        }
    }
}

impl WitnessPolicy {
    /// A policy that witnesses everything but witness signatures.
    pub fn witness_all() -> Self {
        Self {
            objects: BTreeSet::new(),
            pairs: BTreeSet::new(),
        }
    }

    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, WitnessError> {
        let mut policy = Self::witness_all();
        for entry in entries {
            let entry = entry.as_ref();
            let invalid = || WitnessError::InvalidPolicy(entry.to_string());
            let (object, action) = entry.split_once('#').ok_or_else(invalid)?;
            let object = Object::parse(object).ok_or_else(invalid)?;
            if action == "*" {
                policy.objects.insert(object);
            } else {
                let action = Action::parse(action).ok_or_else(invalid)?;
                policy.pairs.insert(ObjectAction::new(object, action));
            }
        }
        Ok(policy)
    }

    pub fn is_exempt(&self, pair: ObjectAction) -> bool {
        pair == ObjectAction::new(Object::Message, Action::Witness)
            || self.objects.contains(&pair.object)
            || self.pairs.contains(&pair)
    }

    pub fn entries(&self) -> Vec<String> {
        self.objects
            .iter()
            .map(|o| format!("{o}#*"))
            .chain(self.pairs.iter().map(|p| p.to_string()))
            .collect()
    }
}

impl TryFrom<Vec<String>> for WitnessPolicy {
    type Error = WitnessError;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_entries(&entries)
    }
}

impl From<WitnessPolicy> for Vec<String> {
    fn from(policy: WitnessPolicy) -> Self {
        policy.entries()
    }
}
