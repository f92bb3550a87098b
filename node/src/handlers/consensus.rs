use async_trait::async_trait;
use lao_consensus::{AcceptOutcome, ElectContext, ElectOutcome, InstanceState};
use lao_messages::data::{ConsensusElect, ConsensusElectAccept, ConsensusFailure, ConsensusLearn};
use lao_messages::Data;
use lao_types::{Channel, Hash, MessageId};

use crate::context::{ClientState, HandlerContext, HandlerOutput};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// `consensus#*` on the LAO's consensus channel.
///
/// Only elect, elect_accept, learn and failure move an instance. The Paxos
/// phases in between are checked against their elect and stored.
pub struct ConsensusHandler;

#[async_trait]
impl Handler for ConsensusHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        let lao_id = ctx.require_lao()?.clone();
        ctx.require_channel(&Channel::consensus(&lao_id))?;
        match data {
            Data::ConsensusElect(elect) => handle_elect(state, ctx, &lao_id, elect).await,
            Data::ConsensusElectAccept(answer) => handle_elect_accept(state, ctx, &lao_id, answer).await,
            Data::ConsensusLearn(learn) => handle_learn(state, learn).await,
            Data::ConsensusFailure(failure) => handle_failure(state, failure).await,
            Data::ConsensusPrepare(d) => check_reference(state, &d.message_id, &d.instance_id).await,
            Data::ConsensusPromise(d) => check_reference(state, &d.message_id, &d.instance_id).await,
            Data::ConsensusPropose(d) => check_reference(state, &d.message_id, &d.instance_id).await,
            Data::ConsensusAccept(d) => check_reference(state, &d.message_id, &d.instance_id).await,
            other => Err(unsupported(other.object_action())),
        }
    }
}

async fn handle_elect(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_id: &Hash,
    elect: ConsensusElect,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao = state.lao(lao_id).await?;
    let elect_ctx = ElectContext {
        message_id: ctx.message_id.clone(),
        channel: ctx.channel.clone(),
        sender: ctx.sender,
        nodes: lao.consensus_nodes(),
    };
    let (outcome, decided) = {
        let mut engine = state.consensus.lock().await;
        let outcome = engine.handle_elect(elect_ctx, &elect, ctx.now);
        let decided = engine
            .instance(&ctx.message_id)
            .is_some_and(|i| i.state == InstanceState::Accepted);
        (outcome, decided)
    };

    let mut output = HandlerOutput::none();
    match outcome {
        ElectOutcome::Duplicate | ElectOutcome::Stale => return Ok(output),
        ElectOutcome::Started { superseded, learn } => {
            tracing::info!(
                instance_id = %elect.instance_id,
                elect = %ctx.message_id,
                object = %elect.key.object_type,
                property = %elect.key.property,
                value = %elect.value,
                "consensus started"
            );
            if let Some(old) = superseded {
                state.events.emit(NodeEvent::ConsensusDecided {
                    instance_id: elect.instance_id.clone(),
                    elect: old,
                    accepted: false,
                });
            }
            state.events.emit(NodeEvent::ConsensusStarted {
                instance_id: elect.instance_id.clone(),
                elect: ctx.message_id.clone(),
            });
            if let Some(learn) = learn {
                output = output.publish(ctx.channel.clone(), learn);
            }
        }
    }
    if decided {
        decided_event(state, &elect.instance_id, &ctx.message_id, true);
    }
    Ok(output)
}

async fn handle_elect_accept(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_id: &Hash,
    answer: ConsensusElectAccept,
) -> Result<HandlerOutput, DataHandlingError> {
    // The LAO must be known for its nodes to be.
    state.lao(lao_id).await?;
    let outcome = state.consensus.lock().await.handle_elect_accept(
        ctx.sender,
        ctx.message_id.clone(),
        &answer,
        ctx.now,
    )?;
    match outcome {
        AcceptOutcome::Ignored => {
            tracing::debug!(elect = %answer.message_id, sender = %ctx.sender, "answer ignored");
            Ok(HandlerOutput::none())
        }
        AcceptOutcome::Counted | AcceptOutcome::Refused => Ok(HandlerOutput::none()),
        AcceptOutcome::Accepted { learn } => {
            decided_event(state, &answer.instance_id, &answer.message_id, true);
            Ok(match learn {
                Some(learn) => HandlerOutput::none().publish(ctx.channel.clone(), learn),
                None => HandlerOutput::none(),
            })
        }
    }
}

async fn handle_learn(state: &ClientState, learn: ConsensusLearn) -> Result<HandlerOutput, DataHandlingError> {
    if state.consensus.lock().await.handle_learn(&learn)? {
        decided_event(state, &learn.instance_id, &learn.message_id, learn.value.decision);
    }
    Ok(HandlerOutput::none())
}

async fn handle_failure(state: &ClientState, failure: ConsensusFailure) -> Result<HandlerOutput, DataHandlingError> {
    if state.consensus.lock().await.handle_failure(&failure)? {
        tracing::info!(instance_id = %failure.instance_id, elect = %failure.message_id, "consensus failed");
        decided_event(state, &failure.instance_id, &failure.message_id, false);
    }
    Ok(HandlerOutput::none())
}

async fn check_reference(
    state: &ClientState,
    elect_id: &MessageId,
    instance_id: &Hash,
) -> Result<HandlerOutput, DataHandlingError> {
    state.consensus.lock().await.check_reference(elect_id, instance_id)?;
    Ok(HandlerOutput::none())
}

fn decided_event(state: &ClientState, instance_id: &Hash, elect: &MessageId, accepted: bool) {
    state.events.emit(NodeEvent::ConsensusDecided {
        instance_id: instance_id.clone(),
        elect: elect.clone(),
        accepted,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Fixture;
    use lao_consensus::ConsensusError;
    use lao_messages::data::consensus::{LearnValue, PrepareValue};
    use lao_messages::data::{ConsensusKey, ConsensusPrepare};
    use lao_types::{KeyPair, Timestamp};

    fn elect() -> ConsensusElect {
        ConsensusElect::new(
            ConsensusKey {
                object_type: "roll_call".into(),
                id: Hash::from_bytes([6u8; 32]),
                property: "state".into(),
            },
            "started",
            Timestamp::new(1_500),
        )
    }

    async fn run(fx: &Fixture, sender: &KeyPair, data: Data) -> (HandlerContext, Result<HandlerOutput, DataHandlingError>) {
        let c = fx.ctx(sender, Channel::consensus(&fx.lao), &data);
        let result = ConsensusHandler.handle(&fx.state, &c, data).await;
        (c, result)
    }

    fn accept(elect: &ConsensusElect, elect_id: &MessageId) -> Data {
        Data::ConsensusElectAccept(ConsensusElectAccept {
            instance_id: elect.instance_id.clone(),
            message_id: elect_id.clone(),
            accept: true,
        })
    }

    #[tokio::test]
    async fn majority_of_witnesses_decides() {
        let fx = Fixture::new(3).await;
        let elect = elect();
        let (elect_ctx, out) = run(&fx, &fx.organizer, Data::ConsensusElect(elect.clone())).await;
        assert!(out.unwrap().publications.is_empty());

        let (_, out) = run(&fx, &fx.witnesses[0], accept(&elect, &elect_ctx.message_id)).await;
        assert!(out.unwrap().publications.is_empty());
        let mut events = fx.state.events.stream();
        run(&fx, &fx.witnesses[1], accept(&elect, &elect_ctx.message_id)).await.1.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            NodeEvent::ConsensusDecided {
                instance_id: elect.instance_id.clone(),
                elect: elect_ctx.message_id.clone(),
                accepted: true,
            }
        );
        let engine = fx.state.consensus.lock().await;
        assert_eq!(engine.instance(&elect_ctx.message_id).unwrap().state, InstanceState::Accepted);
    }

    #[tokio::test]
    async fn lone_organizer_decides_and_publishes_learn() {
        let fx = Fixture::new(0).await;
        let elect = elect();
        let (_, out) = run(&fx, &fx.organizer, Data::ConsensusElect(elect.clone())).await;
        let out = out.unwrap();
        assert_eq!(out.publications.len(), 1);
        assert_eq!(out.publications[0].channel, Channel::consensus(&fx.lao));
        assert!(matches!(
            &out.publications[0].data,
            Data::ConsensusLearn(l) if l.value == LearnValue { decision: true }
        ));
    }

    #[tokio::test]
    async fn answer_before_elect_waits() {
        let fx = Fixture::new(3).await;
        let elect = elect();
        let missing = MessageId::from_bytes([7u8; 32]);
        let (_, out) = run(&fx, &fx.witnesses[0], accept(&elect, &missing)).await;
        assert_eq!(out.unwrap_err().dependency(), Some(missing.into()));
    }

    #[tokio::test]
    async fn prepare_with_wrong_instance_is_rejected() {
        let fx = Fixture::new(3).await;
        let elect = elect();
        let (elect_ctx, _) = run(&fx, &fx.organizer, Data::ConsensusElect(elect)).await;
        let other = Hash::from_bytes([9u8; 32]);
        let prepare = Data::ConsensusPrepare(ConsensusPrepare {
            instance_id: other.clone(),
            message_id: elect_ctx.message_id.clone(),
            created_at: Timestamp::new(1_600),
            value: PrepareValue { proposed_try: 1 },
        });
        let (_, out) = run(&fx, &fx.witnesses[0], prepare).await;
        assert!(matches!(
            out.unwrap_err(),
            DataHandlingError::Consensus(ConsensusError::InstanceMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn elect_off_consensus_channel_is_wrong_channel() {
        let fx = Fixture::new(0).await;
        let data = Data::ConsensusElect(elect());
        let c = fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        let err = ConsensusHandler.handle(&fx.state, &c, data).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::WrongChannel(_)));
    }

    #[tokio::test]
    async fn learn_after_local_quorum_is_not_reapplied() {
        let fx = Fixture::new(1).await;
        let elect = elect();
        let (elect_ctx, _) = run(&fx, &fx.organizer, Data::ConsensusElect(elect.clone())).await;
        run(&fx, &fx.witnesses[0], accept(&elect, &elect_ctx.message_id)).await.1.unwrap();
        let mut events = fx.state.events.stream();
        let learn = Data::ConsensusLearn(ConsensusLearn {
            instance_id: elect.instance_id.clone(),
            message_id: elect_ctx.message_id.clone(),
            created_at: Timestamp::new(1_700),
            value: LearnValue { decision: true },
            acceptor_signatures: vec![],
        });
        run(&fx, &fx.organizer, learn).await.1.unwrap();
        assert!(events.try_recv().is_err());
    }
}
