//! One handler per object. Each matches on the payloads of its object and
//! applies them to the repository or engine that owns the fact.

mod consensus;
mod election;
mod lao;
mod meeting;
mod roll_call;
mod social;
mod witness;

pub use consensus::ConsensusHandler;
pub use election::ElectionHandler;
pub use lao::LaoHandler;
pub use meeting::MeetingHandler;
pub use roll_call::RollCallHandler;
pub use social::SocialHandler;
pub use witness::{apply_witness_signature, promote, register_for_witnessing, WitnessHandler};

use lao_messages::WitnessSignature;
use lao_store::Lao;
use lao_types::MessageId;
use lao_witness::witness_quorum;
use std::collections::BTreeSet;

use crate::error::DataHandlingError;

/// Check the witness signatures a `state` message carries over the
/// modification it certifies. Every current witness must have signed.
fn check_modification_signatures(
    lao: &Lao,
    modification_id: &MessageId,
    signatures: &[WitnessSignature],
) -> Result<(), DataHandlingError> {
    let mut signed = BTreeSet::new();
    for signature in signatures {
        if !lao.is_witness(&signature.witness) {
            return Err(DataHandlingError::Unauthorized {
                sender: signature.witness,
                action: "certify a modification".into(),
            });
        }
        if !signature.verify(modification_id) {
            return Err(DataHandlingError::InvalidSignature(signature.witness));
        }
        signed.insert(signature.witness);
    }
    if signed.len() < witness_quorum(lao.witnesses.len()) {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "modification {modification_id} carries {} of {} witness signatures",
            signed.len(),
            lao.witnesses.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A client state with a LAO, and envelopes to feed handlers.

    use super::*;
    use crate::context::{ClientState, HandlerContext};
    use crate::events::EventBus;
    use lao_crypto::{generate_keypair, message_id, sign_message};
    use lao_messages::data::CreateLao;
    use lao_messages::Data;
    use lao_types::{Base64UrlData, Channel, Clock, Hash, KeyPair, SystemClock, Timestamp};
    use lao_witness::WitnessPolicy;
    use std::sync::Arc;

    pub struct Fixture {
        pub state: ClientState,
        pub organizer: KeyPair,
        pub witnesses: Vec<KeyPair>,
        pub lao: Hash,
    }

    impl Fixture {
        /// A LAO created by a fresh organizer, with `witnesses` fresh
        /// witnesses. The local key is the organizer's.
        pub async fn new(witnesses: usize) -> Self {
            let organizer = generate_keypair();
            let witnesses: Vec<KeyPair> = (0..witnesses).map(|_| generate_keypair()).collect();
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let state = ClientState::new(
                organizer.public,
                WitnessPolicy::default(),
                clock,
                Arc::new(EventBus::new()),
            );
            let create = CreateLao::new(
                "LAO",
                Timestamp::new(1_000),
                organizer.public,
                witnesses.iter().map(|w| w.public).collect(),
            );
            let lao = create.id.clone();
            state
                .laos
                .insert(lao.clone(), Lao::from_create(&create, MessageId::from_bytes([0u8; 32])))
                .await
                .unwrap();
            Self {
                state,
                organizer,
                witnesses,
                lao,
            }
        }

        pub fn ctx(&self, sender: &KeyPair, channel: Channel, data: &Data) -> HandlerContext {
            ctx(sender, channel, data)
        }
    }

    /// Context of `data` signed by `sender` and received on `channel`.
    pub fn ctx(sender: &KeyPair, channel: Channel, data: &Data) -> HandlerContext {
        let bytes = data.encode().unwrap();
        let signature = sign_message(&bytes, &sender.private);
        HandlerContext {
            message_id: message_id(&Base64UrlData::encode(&bytes), &signature),
            sender: sender.public,
            lao_id: channel.lao_id(),
            channel,
            witness_signatures: Vec::new(),
            local: sender.public,
            now: Timestamp::new(2_000),
        }
    }
}
