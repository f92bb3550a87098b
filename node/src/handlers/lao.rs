use async_trait::async_trait;
use lao_messages::data::{CreateLao, GreetLao, StateLao, UpdateLao};
use lao_messages::Data;
use lao_store::{Lao, StoreError};
use lao_types::Channel;
use lao_witness::WitnessSubject;

use super::{check_modification_signatures, promote};
use crate::context::{ClientState, HandlerContext, HandlerOutput, WitnessRequest};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// `lao#create`, `lao#update_properties`, `lao#state`, `lao#greet`.
pub struct LaoHandler;

#[async_trait]
impl Handler for LaoHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        match data {
            Data::CreateLao(create) => create_lao(state, ctx, create).await,
            Data::UpdateLao(update) => update_lao(state, ctx, update).await,
            Data::StateLao(lao_state) => state_lao(state, ctx, lao_state).await,
            Data::GreetLao(greet) => greet_lao(state, ctx, greet).await,
            other => Err(unsupported(other.object_action())),
        }
    }
}

async fn create_lao(
    state: &ClientState,
    ctx: &HandlerContext,
    create: CreateLao,
) -> Result<HandlerOutput, DataHandlingError> {
    if !ctx.channel.is_root() {
        return Err(DataHandlingError::WrongChannel(ctx.channel.to_string()));
    }
    if create.organizer != ctx.sender {
        return Err(DataHandlingError::Unauthorized {
            sender: ctx.sender,
            action: "create a LAO for another organizer".into(),
        });
    }
    let lao = Lao::from_create(&create, ctx.message_id.clone());
    state.laos.insert(create.id.clone(), lao).await.map_err(|e| match e {
        StoreError::Duplicate(_) => DataHandlingError::Conflict(format!("LAO {} already exists", create.id)),
        other => other.into(),
    })?;
    tracing::info!(lao = %create.id, name = %create.name, witnesses = create.witnesses.len(), "LAO created");
    state.events.emit(NodeEvent::LaoCreated { lao: create.id.clone() });
    Ok(HandlerOutput::none()
        .satisfies(&create.id)
        .witnessed_as(WitnessRequest::new(&create.id, WitnessSubject::Lao, "New LAO").with_description(create.name)))
}

async fn update_lao(
    state: &ClientState,
    ctx: &HandlerContext,
    update: UpdateLao,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    if update.id != *lao_id {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "update of LAO {} published on {}",
            update.id, ctx.channel
        )));
    }
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "update the LAO")?;

    let message_id = ctx.message_id.clone();
    let applied = state
        .laos
        .update(lao_id, |l| Ok::<_, StoreError>(l.apply_update(&update, message_id)))
        .await?;
    if !applied {
        tracing::debug!(lao = %lao_id, "outdated LAO update ignored");
        return Ok(HandlerOutput::none());
    }

    // Open entries now need the new witness set.
    let witnesses = update.witnesses.iter().copied().collect();
    let promotions = state.witness.lock().await.reevaluate(lao_id, &witnesses);
    for promotion in promotions {
        promote(state, promotion).await;
    }
    tracing::info!(lao = %lao_id, name = %update.name, witnesses = update.witnesses.len(), "LAO updated");
    state.events.emit(NodeEvent::LaoUpdated { lao: lao_id.clone() });
    Ok(HandlerOutput::none()
        .witnessed_as(WitnessRequest::new(lao_id, WitnessSubject::Lao, "LAO update").with_description(update.name)))
}

async fn state_lao(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_state: StateLao,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    if lao_state.id != *lao_id {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "state of LAO {} published on {}",
            lao_state.id, ctx.channel
        )));
    }
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "publish the LAO state")?;
    if lao_state.organizer != lao.organizer || lao_state.creation != lao.creation {
        return Err(DataHandlingError::Conflict(format!(
            "state of LAO {lao_id} changes immutable fields"
        )));
    }
    check_modification_signatures(&lao, &lao_state.modification_id, &lao_state.modification_signatures)?;

    let applied = state
        .laos
        .update(lao_id, |l| Ok::<_, StoreError>(l.apply_state(&lao_state)))
        .await?;
    if applied {
        tracing::info!(lao = %lao_id, modification = %lao_state.modification_id, "LAO state certified");
        state.events.emit(NodeEvent::LaoUpdated { lao: lao_id.clone() });
    }
    Ok(HandlerOutput::none())
}

async fn greet_lao(
    state: &ClientState,
    ctx: &HandlerContext,
    greet: GreetLao,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    if greet.lao != *lao_id {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "greeting for LAO {} published on {}",
            greet.lao, ctx.channel
        )));
    }
    let lao = state.lao(lao_id).await?;
    if !lao.is_organizer(&greet.frontend) {
        return Err(DataHandlingError::Unauthorized {
            sender: greet.frontend,
            action: "front the LAO".into(),
        });
    }
    let peers: Vec<String> = greet.peers.into_iter().map(|p| p.address).collect();
    tracing::info!(lao = %lao_id, address = %greet.address, peers = peers.len(), "LAO greeting");
    state.events.emit(NodeEvent::LaoGreeted {
        lao: lao_id.clone(),
        address: greet.address,
        peers,
    });
    Ok(HandlerOutput::none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{ctx, Fixture};
    use crate::handlers::register_for_witnessing;
    use lao_crypto::generate_keypair;
    use lao_messages::data::PeerAddress;
    use lao_messages::{Action, Object, ObjectAction, WitnessSignature};
    use lao_types::{MessageId, Timestamp};

    fn update(fx: &Fixture, name: &str, at: i64, witnesses: Vec<lao_types::PublicKey>) -> Data {
        Data::UpdateLao(UpdateLao {
            id: fx.lao.clone(),
            name: name.into(),
            last_modified: Timestamp::new(at),
            witnesses,
        })
    }

    #[tokio::test]
    async fn create_on_root_by_organizer() {
        let fx = Fixture::new(0).await;
        let organizer = generate_keypair();
        let create = CreateLao::new("Club", Timestamp::new(10), organizer.public, vec![]);
        let data = Data::CreateLao(create.clone());
        let c = ctx(&organizer, Channel::root(), &data);

        let out = LaoHandler.handle(&fx.state, &c, data).await.unwrap();
        assert_eq!(out.satisfied, vec![create.id.clone()]);
        assert_eq!(out.witness.unwrap().subject, WitnessSubject::Lao);
        let lao = fx.state.laos.get(&create.id).await.unwrap();
        assert_eq!(lao.name, "Club");
        assert!(lao.witnessed);
    }

    #[tokio::test]
    async fn create_for_someone_else_is_unauthorized() {
        let fx = Fixture::new(0).await;
        let create = CreateLao::new("Club", Timestamp::new(10), generate_keypair().public, vec![]);
        let data = Data::CreateLao(create);
        let c = ctx(&fx.organizer, Channel::root(), &data);
        let err = LaoHandler.handle(&fx.state, &c, data).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn create_off_root_is_wrong_channel() {
        let fx = Fixture::new(0).await;
        let create = CreateLao::new("Club", Timestamp::new(10), fx.organizer.public, vec![]);
        let data = Data::CreateLao(create);
        let c = ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        let err = LaoHandler.handle(&fx.state, &c, data).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::WrongChannel(_)));
    }

    #[tokio::test]
    async fn update_by_attendee_is_unauthorized() {
        let fx = Fixture::new(0).await;
        let data = update(&fx, "Renamed", 2_000, vec![]);
        let attendee = generate_keypair();
        let c = fx.ctx(&attendee, Channel::lao(&fx.lao), &data);
        let err = LaoHandler.handle(&fx.state, &c, data).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn update_of_unknown_lao_waits_for_it() {
        let fx = Fixture::new(0).await;
        let other = lao_types::Hash::from_bytes([5u8; 32]);
        let data = Data::UpdateLao(UpdateLao {
            id: other.clone(),
            name: "X".into(),
            last_modified: Timestamp::new(5),
            witnesses: vec![],
        });
        let c = fx.ctx(&fx.organizer, Channel::lao(&other), &data);
        let err = LaoHandler.handle(&fx.state, &c, data).await.unwrap_err();
        assert_eq!(err.dependency(), Some(other));
    }

    #[tokio::test]
    async fn dropping_a_witness_completes_open_entries() {
        let fx = Fixture::new(2).await;
        // An entry that only the first witness signed.
        let pending = fx.ctx(
            &fx.organizer,
            Channel::lao(&fx.lao),
            &update(&fx, "Pending", 1_500, fx.witnesses.iter().map(|w| w.public).collect()),
        );
        let pair = ObjectAction::new(Object::Lao, Action::UpdateProperties);
        assert!(register_for_witnessing(
            &fx.state,
            &pending,
            pair,
            Some(crate::context::WitnessRequest::new(&fx.lao, WitnessSubject::Lao, "LAO update")),
        )
        .await
        .is_none());
        fx.state
            .witness
            .lock()
            .await
            .add_signature(&pending.message_id, fx.witnesses[0].public)
            .unwrap();

        let data = update(&fx, "Smaller", 2_000, vec![fx.witnesses[0].public]);
        let c = fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        LaoHandler.handle(&fx.state, &c, data).await.unwrap();

        let engine = fx.state.witness.lock().await;
        assert!(engine.is_retired(&pending.message_id));
        let lao = fx.state.laos.get(&fx.lao).await.unwrap();
        assert_eq!(lao.name, "Smaller");
    }

    #[tokio::test]
    async fn outdated_update_is_ignored() {
        let fx = Fixture::new(0).await;
        let data = update(&fx, "Old", 500, vec![]);
        let c = fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        let out = LaoHandler.handle(&fx.state, &c, data).await.unwrap();
        assert!(out.witness.is_none());
        assert_eq!(fx.state.laos.get(&fx.lao).await.unwrap().name, "LAO");
    }

    #[tokio::test]
    async fn state_needs_every_witness_signature() {
        let fx = Fixture::new(2).await;
        let lao = fx.state.laos.get(&fx.lao).await.unwrap();
        let modification = MessageId::from_bytes([8u8; 32]);
        let mut lao_state = StateLao {
            id: fx.lao.clone(),
            name: "Certified".into(),
            creation: lao.creation,
            last_modified: Timestamp::new(1_100),
            organizer: lao.organizer,
            witnesses: lao.witnesses.iter().copied().collect(),
            modification_id: modification.clone(),
            modification_signatures: vec![WitnessSignature::sign(&modification, &fx.witnesses[0].private)],
        };

        let data = Data::StateLao(lao_state.clone());
        let c = fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        let err = LaoHandler.handle(&fx.state, &c, data).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::InvalidDataFormat(_)));

        lao_state
            .modification_signatures
            .push(WitnessSignature::sign(&modification, &fx.witnesses[1].private));
        let data = Data::StateLao(lao_state);
        let c = fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        LaoHandler.handle(&fx.state, &c, data).await.unwrap();
        let lao = fx.state.laos.get(&fx.lao).await.unwrap();
        assert_eq!(lao.name, "Certified");
        assert!(lao.witnessed);
        assert_eq!(lao.modification_id, modification);
    }

    #[tokio::test]
    async fn greet_emits_peers() {
        let fx = Fixture::new(0).await;
        let mut events = fx.state.events.stream();
        let server = generate_keypair();
        let data = Data::GreetLao(GreetLao {
            lao: fx.lao.clone(),
            frontend: fx.organizer.public,
            address: "wss://a.example/client".into(),
            peers: vec![PeerAddress {
                address: "wss://b.example/server".into(),
            }],
        });
        let c = fx.ctx(&server, Channel::lao(&fx.lao).sub_channel("greet"), &data);
        LaoHandler.handle(&fx.state, &c, data).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            NodeEvent::LaoGreeted {
                lao: fx.lao.clone(),
                address: "wss://a.example/client".into(),
                peers: vec!["wss://b.example/server".into()],
            }
        );
    }
}
