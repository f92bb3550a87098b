use async_trait::async_trait;
use lao_messages::data::{CastVote, ElectionKey, ElectionResult, ElectionSetup, EndElection, OpenElection};
use lao_messages::{ids, Data};
use lao_types::{Channel, Hash};
use lao_witness::WitnessSubject;

use crate::context::{ClientState, HandlerContext, HandlerOutput, WitnessRequest};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// Elections: setup on the LAO channel, everything else on the election's
/// own channel.
pub struct ElectionHandler;

#[async_trait]
impl Handler for ElectionHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        match data {
            Data::ElectionSetup(setup) => setup_election(state, ctx, setup).await,
            Data::ElectionKey(key) => election_key(state, ctx, key).await,
            Data::OpenElection(open) => open_election(state, ctx, open).await,
            Data::CastVote(cast) => cast_vote(state, ctx, cast).await,
            Data::EndElection(end) => end_election(state, ctx, end).await,
            Data::ElectionResult(result) => election_result(state, ctx, result).await,
            other => Err(unsupported(other.object_action())),
        }
    }
}

async fn setup_election(
    state: &ClientState,
    ctx: &HandlerContext,
    setup: ElectionSetup,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    if setup.lao != *lao_id {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "election for LAO {} published on {}",
            setup.lao, ctx.channel
        )));
    }
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "set up an election")?;
    if setup.id != ids::election_id(lao_id, setup.created_at, &setup.name) {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "election id {} does not derive from its creation and name",
            setup.id
        )));
    }

    state.elections.setup(&setup).await?;
    changed(state, lao_id, &setup.id);
    Ok(HandlerOutput::none().satisfies(&setup.id).witnessed_as(
        WitnessRequest::new(lao_id, WitnessSubject::Election(setup.id.clone()), "New election")
            .with_description(setup.name),
    ))
}

/// The key comes from the server holding the secret half, not from the
/// organizer, so any sender is accepted. The first key wins.
async fn election_key(
    state: &ClientState,
    ctx: &HandlerContext,
    key: ElectionKey,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::election(lao_id, &key.election))?;
    state.elections.set_key(lao_id, &key).await?;
    tracing::info!(lao = %lao_id, election = %key.election, sender = %ctx.sender, "election key set");
    changed(state, lao_id, &key.election);
    Ok(HandlerOutput::none())
}

async fn open_election(
    state: &ClientState,
    ctx: &HandlerContext,
    open: OpenElection,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::election(lao_id, &open.election))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "open an election")?;
    state.elections.open(lao_id, &open).await?;
    changed(state, lao_id, &open.election);
    Ok(HandlerOutput::none())
}

async fn cast_vote(
    state: &ClientState,
    ctx: &HandlerContext,
    cast: CastVote,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::election(lao_id, &cast.election))?;
    let outcome = state
        .elections
        .cast_vote(lao_id, ctx.sender, &ctx.message_id, &cast)
        .await?;
    if outcome.outdated > 0 {
        tracing::debug!(
            election = %cast.election,
            sender = %ctx.sender,
            outdated = outcome.outdated,
            "older votes kept out"
        );
    }
    Ok(HandlerOutput::none())
}

async fn end_election(
    state: &ClientState,
    ctx: &HandlerContext,
    end: EndElection,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::election(lao_id, &end.election))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "end an election")?;
    let outcome = state.elections.end(lao_id, &end).await?;
    state.events.emit(NodeEvent::ElectionEnded {
        lao: lao_id.clone(),
        election: end.election.clone(),
        matches: outcome.matches(),
        invalid_ballots: outcome.invalid_ballots.len(),
    });
    Ok(HandlerOutput::none())
}

async fn election_result(
    state: &ClientState,
    ctx: &HandlerContext,
    result: ElectionResult,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    // The payload does not name its election; the channel does.
    let election = ctx
        .channel
        .segments()
        .nth(1)
        .ok_or_else(|| DataHandlingError::WrongChannel(ctx.channel.to_string()))
        .and_then(|segment| {
            Hash::parse(segment).map_err(|e| DataHandlingError::WrongChannel(format!("{}: {e}", ctx.channel)))
        })?;
    ctx.require_channel(&Channel::election(lao_id, &election))?;
    state.elections.apply_result(lao_id, &election, &result).await?;
    tracing::info!(lao = %lao_id, election = %election, questions = result.questions.len(), "election results received");
    changed(state, lao_id, &election);
    Ok(HandlerOutput::none())
}

fn changed(state: &ClientState, lao: &Hash, election: &Hash) {
    state.events.emit(NodeEvent::ElectionChanged {
        lao: lao.clone(),
        election: election.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Fixture;
    use lao_crypto::{generate_keypair, ElectionKeyPair};
    use lao_election::{ElectionError, ElectionState};
    use lao_messages::data::{ElectionVersion, QuestionResult, QuestionResultEntry, Vote};
    use lao_types::{KeyPair, Timestamp};

    fn setup(fx: &Fixture, version: ElectionVersion) -> ElectionSetup {
        ElectionSetup::new(
            fx.lao.clone(),
            "Board",
            version,
            Timestamp::new(1_100),
            Timestamp::new(1_200),
            Timestamp::new(5_000),
            vec![("Chair?".into(), vec!["Ann".into(), "Bob".into()], false)],
        )
    }

    async fn run(fx: &Fixture, sender: &KeyPair, channel: Channel, data: Data) -> Result<HandlerOutput, DataHandlingError> {
        let c = fx.ctx(sender, channel, &data);
        ElectionHandler.handle(&fx.state, &c, data).await
    }

    async fn opened(fx: &Fixture, version: ElectionVersion) -> ElectionSetup {
        let setup = setup(fx, version);
        run(fx, &fx.organizer, Channel::lao(&fx.lao), Data::ElectionSetup(setup.clone()))
            .await
            .unwrap();
        let open = OpenElection {
            lao: fx.lao.clone(),
            election: setup.id.clone(),
            opened_at: Timestamp::new(1_200),
        };
        run(fx, &fx.organizer, Channel::election(&fx.lao, &setup.id), Data::OpenElection(open))
            .await
            .unwrap();
        setup
    }

    fn vote(setup: &ElectionSetup, at: i64, index: u16) -> Data {
        Data::CastVote(CastVote {
            lao: setup.lao.clone(),
            election: setup.id.clone(),
            created_at: Timestamp::new(at),
            votes: vec![Vote::open(&setup.id, &setup.questions[0].id, index)],
        })
    }

    #[tokio::test]
    async fn setup_satisfies_the_election() {
        let fx = Fixture::new(0).await;
        let setup = setup(&fx, ElectionVersion::OpenBallot);
        let out = run(&fx, &fx.organizer, Channel::lao(&fx.lao), Data::ElectionSetup(setup.clone()))
            .await
            .unwrap();
        assert_eq!(out.satisfied, vec![setup.id.clone()]);
        assert_eq!(out.witness.unwrap().subject, WitnessSubject::Election(setup.id.clone()));
        assert!(fx.state.elections.contains(&fx.lao, &setup.id).await);
    }

    #[tokio::test]
    async fn vote_before_setup_waits_for_it() {
        let fx = Fixture::new(0).await;
        let setup = setup(&fx, ElectionVersion::OpenBallot);
        let voter = generate_keypair();
        let err = run(&fx, &voter, Channel::election(&fx.lao, &setup.id), vote(&setup, 1_300, 0))
            .await
            .unwrap_err();
        assert_eq!(err.dependency(), Some(setup.id));
    }

    #[tokio::test]
    async fn latest_vote_of_a_sender_counts() {
        let fx = Fixture::new(0).await;
        let setup = opened(&fx, ElectionVersion::OpenBallot).await;
        let channel = Channel::election(&fx.lao, &setup.id);
        let voter = generate_keypair();
        run(&fx, &voter, channel.clone(), vote(&setup, 1_400, 1)).await.unwrap();
        run(&fx, &voter, channel.clone(), vote(&setup, 1_300, 0)).await.unwrap();

        let mut events = fx.state.events.stream();
        let end = EndElection {
            lao: fx.lao.clone(),
            election: setup.id.clone(),
            created_at: Timestamp::new(4_000),
            registered_votes: String::new(),
        };
        run(&fx, &fx.organizer, channel, Data::EndElection(end)).await.unwrap();

        let election = fx.state.elections.get(&fx.lao, &setup.id).await.unwrap();
        let results = &election.results[&setup.questions[0].id];
        assert!(results.contains(&QuestionResult {
            ballot_option: "Bob".into(),
            count: 1
        }));
        assert!(!results.iter().any(|r| r.ballot_option == "Ann" && r.count > 0));
        assert!(matches!(
            events.recv().await.unwrap(),
            NodeEvent::ElectionEnded { matches: false, invalid_ballots: 0, .. }
        ));
    }

    #[tokio::test]
    async fn vote_on_lao_channel_is_wrong_channel() {
        let fx = Fixture::new(0).await;
        let setup = opened(&fx, ElectionVersion::OpenBallot).await;
        let err = run(&fx, &generate_keypair(), Channel::lao(&fx.lao), vote(&setup, 1_300, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DataHandlingError::WrongChannel(_)));
    }

    #[tokio::test]
    async fn attendee_cannot_end() {
        let fx = Fixture::new(0).await;
        let setup = opened(&fx, ElectionVersion::OpenBallot).await;
        let end = EndElection {
            lao: fx.lao.clone(),
            election: setup.id.clone(),
            created_at: Timestamp::new(4_000),
            registered_votes: String::new(),
        };
        let err = run(&fx, &generate_keypair(), Channel::election(&fx.lao, &setup.id), Data::EndElection(end))
            .await
            .unwrap_err();
        assert!(matches!(err, DataHandlingError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn first_key_wins() {
        let fx = Fixture::new(0).await;
        let setup = setup(&fx, ElectionVersion::SecretBallot);
        run(&fx, &fx.organizer, Channel::lao(&fx.lao), Data::ElectionSetup(setup.clone()))
            .await
            .unwrap();
        let channel = Channel::election(&fx.lao, &setup.id);
        let server = generate_keypair();
        let first = ElectionKeyPair::generate();
        let key = |k: &ElectionKeyPair| {
            Data::ElectionKey(ElectionKey {
                election: setup.id.clone(),
                election_key: k.public,
            })
        };
        run(&fx, &server, channel.clone(), key(&first)).await.unwrap();
        let err = run(&fx, &server, channel, key(&ElectionKeyPair::generate()))
            .await
            .unwrap_err();
        assert_eq!(err, DataHandlingError::Election(ElectionError::KeyAlreadySet(setup.id.clone())));
        let election = fx.state.elections.get(&fx.lao, &setup.id).await.unwrap();
        assert_eq!(election.election_key, Some(first.public));
    }

    #[tokio::test]
    async fn result_is_addressed_by_channel() {
        let fx = Fixture::new(0).await;
        let setup = opened(&fx, ElectionVersion::OpenBallot).await;
        let channel = Channel::election(&fx.lao, &setup.id);
        let end = EndElection {
            lao: fx.lao.clone(),
            election: setup.id.clone(),
            created_at: Timestamp::new(4_000),
            registered_votes: String::new(),
        };
        run(&fx, &fx.organizer, channel.clone(), Data::EndElection(end)).await.unwrap();

        let result = ElectionResult {
            questions: vec![QuestionResultEntry {
                id: setup.questions[0].id.clone(),
                result: vec![QuestionResult {
                    ballot_option: "Ann".into(),
                    count: 7,
                }],
            }],
        };
        run(&fx, &generate_keypair(), channel, Data::ElectionResult(result)).await.unwrap();
        let election = fx.state.elections.get(&fx.lao, &setup.id).await.unwrap();
        assert_eq!(election.state, ElectionState::ResultsReady);
        assert!(election.results[&setup.questions[0].id].contains(&QuestionResult {
            ballot_option: "Ann".into(),
            count: 7
        }));
    }
}
