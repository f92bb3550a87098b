//! The election entity, replaced as a whole on every transition.

use lao_crypto::ElectionPublicKey;
use lao_messages::data::{CastVote, ElectionQuestion, ElectionSetup, ElectionVersion, QuestionResult, Vote};
use lao_types::{Channel, Hash, MessageId, PublicKey, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

use crate::ballot::check_vote;
use crate::ElectionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectionState {
    Created,
    Opened,
    Closed,
    ResultsReady,
}

/// One vote of one `cast_vote` message, with the facts needed to order it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedVote {
    pub sender: PublicKey,
    pub message_id: MessageId,
    pub created_at: Timestamp,
    /// Position of the vote inside its `cast_vote`.
    pub position: usize,
    pub vote: Vote,
}

impl RecordedVote {
    fn supersedes(&self, other: &RecordedVote) -> bool {
        (self.created_at, self.message_id.as_str()) > (other.created_at, other.message_id.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Election {
    pub id: Hash,
    pub lao: Hash,
    pub name: String,
    pub channel: Channel,
    pub creation: Timestamp,
    pub start: Timestamp,
    pub end: Timestamp,
    pub questions: Vec<ElectionQuestion>,
    pub version: ElectionVersion,
    pub election_key: Option<ElectionPublicKey>,
    /// Latest vote of each sender, per question.
    pub votes_by_sender: BTreeMap<PublicKey, BTreeMap<Hash, RecordedVote>>,
    /// Every accepted `cast_vote`, by message id.
    pub message_order: BTreeMap<MessageId, PublicKey>,
    pub state: ElectionState,
    pub opened_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub registered_votes: Option<String>,
    pub results: BTreeMap<Hash, BTreeSet<QuestionResult>>,
    pub witnessed: bool,
}

impl Election {
    pub fn from_setup(setup: &ElectionSetup) -> Self {
        Self {
            id: setup.id.clone(),
            lao: setup.lao.clone(),
            name: setup.name.clone(),
            channel: Channel::election(&setup.lao, &setup.id),
            creation: setup.created_at,
            start: setup.start_time,
            end: setup.end_time,
            questions: setup.questions.clone(),
            version: setup.version,
            election_key: None,
            votes_by_sender: BTreeMap::new(),
            message_order: BTreeMap::new(),
            state: ElectionState::Created,
            opened_at: None,
            ended_at: None,
            registered_votes: None,
            results: BTreeMap::new(),
            witnessed: false,
        }
    }

    pub fn question(&self, id: &Hash) -> Result<&ElectionQuestion, ElectionError> {
        self.questions
            .iter()
            .find(|q| q.id == *id)
            .ok_or_else(|| ElectionError::UnknownQuestion {
                election: self.id.clone(),
                question: id.clone(),
            })
    }

    pub fn is_secret_ballot(&self) -> bool {
        self.version == ElectionVersion::SecretBallot
    }

    pub fn set_key(&mut self, key: ElectionPublicKey) -> Result<(), ElectionError> {
        match self.election_key {
            Some(existing) if existing == key => Ok(()),
            Some(_) => Err(ElectionError::KeyAlreadySet(self.id.clone())),
            None => {
                self.election_key = Some(key);
                Ok(())
            }
        }
    }

    pub fn open(&mut self, opened_at: Timestamp) -> Result<(), ElectionError> {
        self.expect_state(ElectionState::Created)?;
        self.state = ElectionState::Opened;
        self.opened_at = Some(opened_at);
        Ok(())
    }

    /// Record the votes of one `cast_vote`. Either every vote is valid and
    /// the newer ones replace the sender's previous choices, or nothing
    /// changes. Returns how many votes replaced or added a choice.
    pub fn record_cast(
        &mut self,
        sender: PublicKey,
        message_id: &MessageId,
        cast: &CastVote,
    ) -> Result<usize, ElectionError> {
        self.expect_state(ElectionState::Opened)?;
        if cast.created_at < self.start || cast.created_at > self.end {
            return Err(ElectionError::OutsideWindow {
                created_at: cast.created_at,
                start: self.start,
                end: self.end,
            });
        }
        for vote in &cast.votes {
            check_vote(vote, self.version, self.question(&vote.question)?)?;
        }

        let mut applied = 0;
        let ballots = self.votes_by_sender.entry(sender).or_default();
        for (position, vote) in cast.votes.iter().enumerate() {
            let recorded = RecordedVote {
                sender,
                message_id: message_id.clone(),
                created_at: cast.created_at,
                position,
                vote: vote.clone(),
            };
            match ballots.get(&vote.question) {
                Some(previous) if !recorded.supersedes(previous) => {}
                _ => {
                    ballots.insert(vote.question.clone(), recorded);
                    applied += 1;
                }
            }
        }
        self.message_order.insert(message_id.clone(), sender);
        Ok(applied)
    }

    /// The votes that count: the latest one per sender and question.
    pub fn counted_votes(&self) -> impl Iterator<Item = &RecordedVote> {
        self.votes_by_sender.values().flat_map(|ballots| ballots.values())
    }

    pub fn close(&mut self, ended_at: Timestamp) -> Result<(), ElectionError> {
        self.expect_state(ElectionState::Opened)?;
        self.state = ElectionState::Closed;
        self.ended_at = Some(ended_at);
        Ok(())
    }

    /// Store results, from a local tally or an `election#result`.
    pub fn set_results(
        &mut self,
        results: impl IntoIterator<Item = (Hash, Vec<QuestionResult>)>,
    ) -> Result<(), ElectionError> {
        if !matches!(self.state, ElectionState::Closed | ElectionState::ResultsReady) {
            return Err(ElectionError::WrongState {
                state: self.state,
                expected: ElectionState::Closed,
            });
        }
        let mut next = BTreeMap::new();
        for (question, counts) in results {
            self.question(&question)?;
            next.insert(question, counts.into_iter().collect());
        }
        self.results = next;
        self.state = ElectionState::ResultsReady;
        Ok(())
    }

    fn expect_state(&self, expected: ElectionState) -> Result<(), ElectionError> {
        if self.state != expected {
            return Err(ElectionError::WrongState {
                state: self.state,
                expected,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ElectionSetup {
        ElectionSetup::new(
            Hash::from_bytes([1u8; 32]),
            "Board",
            ElectionVersion::OpenBallot,
            Timestamp::new(100),
            Timestamp::new(110),
            Timestamp::new(200),
            vec![("Chair?".into(), vec!["Ann".into(), "Bob".into()], false)],
        )
    }

    fn cast(election: &Election, index: u16, at: i64) -> CastVote {
        CastVote {
            lao: election.lao.clone(),
            election: election.id.clone(),
            created_at: Timestamp::new(at),
            votes: vec![Vote::open(&election.id, &election.questions[0].id, index)],
        }
    }

    #[test]
    fn votes_need_an_open_election() {
        let mut e = Election::from_setup(&setup());
        let c = cast(&e, 0, 150);
        assert!(matches!(
            e.record_cast(PublicKey([1; 32]), &MessageId::from_bytes([1; 32]), &c),
            Err(ElectionError::WrongState { state: ElectionState::Created, .. })
        ));
        e.open(Timestamp::new(110)).unwrap();
        assert_eq!(e.record_cast(PublicKey([1; 32]), &MessageId::from_bytes([1; 32]), &c), Ok(1));
        e.close(Timestamp::new(200)).unwrap();
        assert!(e
            .record_cast(PublicKey([1; 32]), &MessageId::from_bytes([2; 32]), &cast(&e, 1, 160))
            .is_err());
    }

    #[test]
    fn votes_outside_window_are_rejected() {
        let mut e = Election::from_setup(&setup());
        e.open(Timestamp::new(110)).unwrap();
        for at in [109, 201] {
            assert!(matches!(
                e.record_cast(PublicKey([1; 32]), &MessageId::from_bytes([1; 32]), &cast(&e, 0, at)),
                Err(ElectionError::OutsideWindow { .. })
            ));
        }
        assert!(e.votes_by_sender.is_empty());
    }

    #[test]
    fn later_vote_replaces_earlier_one() {
        let mut e = Election::from_setup(&setup());
        e.open(Timestamp::new(110)).unwrap();
        let sender = PublicKey([1; 32]);
        e.record_cast(sender, &MessageId::from_bytes([9; 32]), &cast(&e, 1, 160)).unwrap();
        // Arrives later but was cast earlier.
        assert_eq!(e.record_cast(sender, &MessageId::from_bytes([8; 32]), &cast(&e, 0, 150)), Ok(0));
        let counted: Vec<_> = e.counted_votes().collect();
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].message_id, MessageId::from_bytes([9; 32]));
        assert_eq!(e.message_order.len(), 2);
    }

    #[test]
    fn replay_is_idempotent() {
        let mut e = Election::from_setup(&setup());
        e.open(Timestamp::new(110)).unwrap();
        let sender = PublicKey([1; 32]);
        let c = cast(&e, 1, 160);
        let id = MessageId::from_bytes([9; 32]);
        assert_eq!(e.record_cast(sender, &id, &c), Ok(1));
        let before = e.clone();
        assert_eq!(e.record_cast(sender, &id, &c), Ok(0));
        assert_eq!(e, before);
    }

    #[test]
    fn unknown_question_rejects_whole_cast() {
        let mut e = Election::from_setup(&setup());
        e.open(Timestamp::new(110)).unwrap();
        let mut c = cast(&e, 0, 150);
        c.votes.push(Vote::open(&e.id, &Hash::from_bytes([0; 32]), 0));
        assert!(matches!(
            e.record_cast(PublicKey([1; 32]), &MessageId::from_bytes([1; 32]), &c),
            Err(ElectionError::UnknownQuestion { .. })
        ));
        assert!(e.counted_votes().next().is_none());
    }

    #[test]
    fn results_need_a_closed_election() {
        let mut e = Election::from_setup(&setup());
        let q = e.questions[0].id.clone();
        assert!(e.set_results([(q.clone(), vec![])]).is_err());
        e.open(Timestamp::new(110)).unwrap();
        e.close(Timestamp::new(200)).unwrap();
        e.set_results([(q, vec![])]).unwrap();
        assert_eq!(e.state, ElectionState::ResultsReady);
    }
}
