//! The signed envelope every payload travels in.

use lao_crypto::{message_id, public_from_private, sign_message, verify_signature};
use lao_types::{Base64UrlData, KeyPair, MessageId, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::{Data, MessageError};

/// A witness's signature over a message id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WitnessSignature {
    pub witness: PublicKey,
    pub signature: Signature,
}

impl WitnessSignature {
    pub fn sign(message_id: &MessageId, private: &PrivateKey) -> Self {
        Self {
            witness: public_from_private(private),
            signature: sign_message(message_id.as_bytes(), private),
        }
    }

    pub fn verify(&self, message_id: &MessageId) -> bool {
        verify_signature(message_id.as_bytes(), &self.signature, &self.witness)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageGeneral {
    pub data: Base64UrlData,
    pub sender: PublicKey,
    pub signature: Signature,
    pub message_id: MessageId,
    pub witness_signatures: Vec<WitnessSignature>,
}

impl MessageGeneral {
    /// Encode, sign and address a payload.
    pub fn new(keys: &KeyPair, data: &Data) -> Result<Self, MessageError> {
        let bytes = data.encode()?;
        let signature = sign_message(&bytes, &keys.private);
        let data = Base64UrlData::encode(&bytes);
        Ok(Self {
            message_id: message_id(&data, &signature),
            data,
            sender: keys.public,
            signature,
            witness_signatures: Vec::new(),
        })
    }

    /// Check that the message id matches and the sender signed the data.
    pub fn verify(&self) -> Result<(), MessageError> {
        let computed = message_id(&self.data, &self.signature);
        if computed != self.message_id {
            return Err(MessageError::InvalidMessageId {
                carried: self.message_id.clone(),
                computed,
            });
        }
        if !verify_signature(&self.data.decode(), &self.signature, &self.sender) {
            return Err(MessageError::InvalidSignature(self.sender));
        }
        Ok(())
    }

    pub fn decode_data(&self) -> Result<Data, MessageError> {
        Data::decode(&self.data.decode())
    }

    /// Split the attached witness signatures into valid and invalid ones.
    pub fn partition_witness_signatures(&self) -> (Vec<WitnessSignature>, Vec<WitnessSignature>) {
        self.witness_signatures
            .iter()
            .cloned()
            .partition(|ws| ws.verify(&self.message_id))
    }

    /// Countersign as a witness. The message id does not cover witness
    /// signatures, so it is unchanged.
    pub fn add_witness_signature(&mut self, private: &PrivateKey) {
        let ws = WitnessSignature::sign(&self.message_id, private);
        if !self.witness_signatures.iter().any(|s| s.witness == ws.witness) {
            self.witness_signatures.push(ws);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::WitnessMessageSignature;
    use lao_crypto::generate_keypair;

    fn sample(keys: &KeyPair) -> MessageGeneral {
        let data = Data::WitnessMessage(WitnessMessageSignature {
            message_id: MessageId::from_bytes([1u8; 32]),
            signature: Signature([2u8; 64]),
        });
        MessageGeneral::new(keys, &data).unwrap()
    }

    #[test]
    fn new_message_verifies() {
        let keys = generate_keypair();
        let msg = sample(&keys);
        assert!(msg.verify().is_ok());
        assert!(matches!(msg.decode_data().unwrap(), Data::WitnessMessage(_)));
    }

    #[test]
    fn tampered_data_changes_id() {
        let keys = generate_keypair();
        let mut msg = sample(&keys);
        msg.data = Base64UrlData::encode(b"{}");
        assert!(matches!(msg.verify(), Err(MessageError::InvalidMessageId { .. })));
    }

    #[test]
    fn wrong_sender_is_rejected() {
        let keys = generate_keypair();
        let mut msg = sample(&keys);
        msg.sender = generate_keypair().public;
        assert!(matches!(msg.verify(), Err(MessageError::InvalidSignature(_))));
    }

    #[test]
    fn witness_signatures_are_partitioned() {
        let keys = generate_keypair();
        let witness = generate_keypair();
        let mut msg = sample(&keys);
        msg.add_witness_signature(&witness.private);
        msg.add_witness_signature(&witness.private);
        assert_eq!(msg.witness_signatures.len(), 1);

        msg.witness_signatures.push(WitnessSignature {
            witness: generate_keypair().public,
            signature: Signature([0u8; 64]),
        });
        let (valid, invalid) = msg.partition_witness_signatures();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].witness, witness.public);
        assert_eq!(invalid.len(), 1);
        assert!(msg.verify().is_ok());
    }

    #[test]
    fn envelope_json_roundtrip() {
        let msg = sample(&generate_keypair());
        let json = serde_json::to_string(&msg).unwrap();
        let back: MessageGeneral = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
