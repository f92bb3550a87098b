//! `meeting#*` payloads.

use lao_types::{Hash, MessageId, Timestamp};
use serde::{Deserialize, Serialize};

use super::{non_empty, non_negative, not_before, Validate};
use crate::{MessageError, WitnessSignature};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMeeting {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
}

impl Validate for CreateMeeting {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("creation", self.creation)?;
        not_before("start", self.start, "creation", self.creation)?;
        if let Some(end) = self.end {
            not_before("end", end, "start", self.start)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateMeeting {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    pub last_modified: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
    pub modification_id: MessageId,
    pub modification_signatures: Vec<WitnessSignature>,
}

impl Validate for StateMeeting {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("creation", self.creation)?;
        not_before("last_modified", self.last_modified, "creation", self.creation)?;
        not_before("start", self.start, "creation", self.creation)?;
        if let Some(end) = self.end {
            not_before("end", end, "start", self.start)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting(start: i64, end: Option<i64>) -> CreateMeeting {
        CreateMeeting {
            id: Hash::from_bytes([1u8; 32]),
            name: "Weekly".into(),
            creation: Timestamp::new(100),
            location: None,
            start: Timestamp::new(start),
            end: end.map(Timestamp::new),
        }
    }

    #[test]
    fn end_is_optional() {
        assert!(meeting(150, None).validate().is_ok());
        assert!(meeting(150, Some(200)).validate().is_ok());
    }

    #[test]
    fn ordering_is_enforced() {
        assert!(meeting(50, None).validate().is_err());
        assert!(meeting(150, Some(120)).validate().is_err());
    }

    #[test]
    fn absent_location_is_not_serialized() {
        let json = serde_json::to_value(meeting(150, None)).unwrap();
        assert!(json.get("location").is_none());
        assert!(json.get("end").is_none());
    }
}
