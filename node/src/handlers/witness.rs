//! `message#witness` and the witnessing side effect of every handled
//! message.

use async_trait::async_trait;
use lao_election::ElectionError;
use lao_messages::{Data, ObjectAction, WitnessSignature};
use lao_store::{EntityKey, StoreError};
use lao_types::{MessageId, PublicKey};
use lao_witness::{Promotion, RegisterOutcome, WitnessError, WitnessMessage, WitnessSubject};

use crate::context::{ClientState, HandlerContext, HandlerOutput, WitnessRequest};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// `message#witness`: a witness signature for an applied message.
pub struct WitnessHandler;

#[async_trait]
impl Handler for WitnessHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        let Data::WitnessMessage(witness) = data else {
            return Err(unsupported(data.object_action()));
        };
        let lao_id = ctx.require_lao()?;
        let lao = state.lao(lao_id).await?;
        if !lao.is_witness(&ctx.sender) {
            return Err(WitnessError::NotAWitness(ctx.sender).into());
        }
        let signature = WitnessSignature {
            witness: ctx.sender,
            signature: witness.signature,
        };
        if !signature.verify(&witness.message_id) {
            return Err(DataHandlingError::InvalidSignature(ctx.sender));
        }
        if !state.messages.contains(&witness.message_id).await {
            return Err(DataHandlingError::UnknownMessage(witness.message_id));
        }
        apply_witness_signature(state, &witness.message_id, signature).await?;
        Ok(HandlerOutput::none())
    }
}

/// Record a verified witness signature over a stored message, promoting the
/// message's subject when it completes the quorum.
///
/// A message that was never registered (its payload is exempt from
/// witnessing) only keeps the signature.
pub async fn apply_witness_signature(
    state: &ClientState,
    message_id: &MessageId,
    signature: WitnessSignature,
) -> Result<bool, DataHandlingError> {
    let witness: PublicKey = signature.witness;
    state.messages.add_witness_signature(message_id, signature).await;
    let promotion = {
        let mut engine = state.witness.lock().await;
        let promotion = engine.get(message_id).map(Promotion::from);
        match engine.add_signature(message_id, witness) {
            Ok(true) => promotion,
            Ok(false) => None,
            Err(WitnessError::UnknownMessage(_)) => {
                tracing::debug!(message_id = %message_id, witness = %witness, "signature on unregistered message kept");
                None
            }
            Err(e) => return Err(e.into()),
        }
    };
    match promotion {
        Some(promotion) => {
            promote(state, promotion).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Start collecting witness signatures for a handled message.
///
/// Returns the promotion when the LAO has no witnesses and the subject is
/// witnessed at once.
pub async fn register_for_witnessing(
    state: &ClientState,
    ctx: &HandlerContext,
    pair: ObjectAction,
    request: Option<WitnessRequest>,
) -> Option<Promotion> {
    let request = match request {
        Some(request) => request,
        None => WitnessRequest::new(ctx.lao_id.as_ref()?, WitnessSubject::Message, pair.to_string()),
    };
    let lao = state.laos.get(&request.lao).await?;
    let message = WitnessMessage::new(
        ctx.message_id.clone(),
        request.lao,
        request.subject,
        request.title,
        request.description,
        ctx.now,
    );
    let outcome = state.witness.lock().await.register(message, &lao.witnesses);
    match outcome {
        RegisterOutcome::Promoted(promotion) => Some(promotion),
        RegisterOutcome::Pending { .. } | RegisterOutcome::Duplicate => None,
    }
}

/// Mark the subject of a completed witnessing as witnessed.
pub async fn promote(state: &ClientState, promotion: Promotion) {
    let lao = &promotion.lao_id;
    let result: Result<(), DataHandlingError> = match &promotion.subject {
        WitnessSubject::Lao => state
            .laos
            .update(lao, |l| {
                l.witnessed = true;
                Ok::<_, StoreError>(())
            })
            .await
            .map_err(Into::into),
        WitnessSubject::RollCall(id) => state
            .roll_calls
            .mark_witnessed(lao, id)
            .await
            .map(|_| ())
            .map_err(Into::into),
        WitnessSubject::Meeting(id) => state
            .meetings
            .update(&EntityKey::new(lao, id), |m| {
                m.witnessed = true;
                Ok::<_, StoreError>(())
            })
            .await
            .map_err(Into::into),
        WitnessSubject::Election(id) => state
            .elections
            .mark_witnessed(lao, id)
            .await
            .map_err(|e: ElectionError| e.into()),
        WitnessSubject::Message => Ok(()),
    };
    if let Err(e) = result {
        tracing::warn!(
            message_id = %promotion.message_id,
            lao = %lao,
            error = %e,
            "witnessed subject is gone"
        );
        return;
    }
    state.events.emit(NodeEvent::Witnessed {
        lao: promotion.lao_id,
        message_id: promotion.message_id,
        subject: promotion.subject,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Fixture;
    use lao_crypto::{generate_keypair, sign_message};
    use lao_messages::data::{AddChirp, WitnessMessageSignature};
    use lao_messages::MessageGeneral;
    use lao_types::{Channel, Timestamp};

    async fn stored_message(fx: &Fixture) -> MessageGeneral {
        let data = Data::AddChirp(AddChirp {
            text: "hello".into(),
            parent_id: None,
            timestamp: Timestamp::new(5),
        });
        let message = MessageGeneral::new(&fx.organizer, &data).unwrap();
        let channel = Channel::social(&fx.lao, &fx.organizer.public);
        fx.state.messages.insert(&channel, message.clone()).await;
        message
    }

    fn witness_data(fx: &Fixture, index: usize, message_id: &MessageId) -> Data {
        Data::WitnessMessage(WitnessMessageSignature {
            message_id: message_id.clone(),
            signature: sign_message(message_id.as_bytes(), &fx.witnesses[index].private),
        })
    }

    #[tokio::test]
    async fn quorum_of_all_witnesses_promotes() {
        let fx = Fixture::new(2).await;
        let message = stored_message(&fx).await;
        let mut events = fx.state.events.stream();
        let pair = Data::AddChirp(AddChirp {
            text: "hello".into(),
            parent_id: None,
            timestamp: Timestamp::new(5),
        })
        .object_action();
        let ctx = HandlerContext {
            message_id: message.message_id.clone(),
            ..fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &witness_data(&fx, 0, &message.message_id))
        };
        let request = WitnessRequest::new(&fx.lao, WitnessSubject::Lao, "LAO update");
        assert!(register_for_witnessing(&fx.state, &ctx, pair, Some(request))
            .await
            .is_none());

        for i in 0..2 {
            let data = witness_data(&fx, i, &message.message_id);
            let ctx = fx.ctx(&fx.witnesses[i], Channel::lao(&fx.lao), &data);
            WitnessHandler.handle(&fx.state, &ctx, data).await.unwrap();
        }

        assert!(fx.state.witness.lock().await.is_retired(&message.message_id));
        let stored = fx.state.messages.get(&message.message_id).await.unwrap();
        assert_eq!(stored.message.witness_signatures.len(), 2);
        assert!(fx.state.laos.get(&fx.lao).await.unwrap().witnessed);
        match events.recv().await.unwrap() {
            NodeEvent::Witnessed { message_id, subject, .. } => {
                assert_eq!(message_id, message.message_id);
                assert_eq!(subject, WitnessSubject::Lao);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_witness_is_refused() {
        let fx = Fixture::new(1).await;
        let message = stored_message(&fx).await;
        let outsider = generate_keypair();
        let data = Data::WitnessMessage(WitnessMessageSignature {
            message_id: message.message_id.clone(),
            signature: sign_message(message.message_id.as_bytes(), &outsider.private),
        });
        let ctx = fx.ctx(&outsider, Channel::lao(&fx.lao), &data);
        let err = WitnessHandler.handle(&fx.state, &ctx, data).await.unwrap_err();
        assert_eq!(err, DataHandlingError::Witness(WitnessError::NotAWitness(outsider.public)));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let fx = Fixture::new(1).await;
        let message = stored_message(&fx).await;
        let data = Data::WitnessMessage(WitnessMessageSignature {
            message_id: message.message_id.clone(),
            signature: sign_message(b"something else", &fx.witnesses[0].private),
        });
        let ctx = fx.ctx(&fx.witnesses[0], Channel::lao(&fx.lao), &data);
        let err = WitnessHandler.handle(&fx.state, &ctx, data).await.unwrap_err();
        assert_eq!(err, DataHandlingError::InvalidSignature(fx.witnesses[0].public));
    }

    #[tokio::test]
    async fn signature_before_message_waits_for_it() {
        let fx = Fixture::new(1).await;
        let missing = MessageId::from_bytes([4u8; 32]);
        let data = witness_data(&fx, 0, &missing);
        let ctx = fx.ctx(&fx.witnesses[0], Channel::lao(&fx.lao), &data);
        let err = WitnessHandler.handle(&fx.state, &ctx, data).await.unwrap_err();
        assert_eq!(err.dependency(), Some(missing.into()));
    }

    #[tokio::test]
    async fn promote_marks_the_lao() {
        let fx = Fixture::new(1).await;
        let mut events = fx.state.events.stream();
        promote(
            &fx.state,
            Promotion {
                message_id: MessageId::from_bytes([1u8; 32]),
                lao_id: fx.lao.clone(),
                subject: WitnessSubject::Lao,
            },
        )
        .await;
        assert!(fx.state.laos.get(&fx.lao).await.unwrap().witnessed);
        assert!(matches!(events.recv().await.unwrap(), NodeEvent::Witnessed { .. }));
    }
}
