//! `election#*` payloads.

use lao_crypto::ElectionPublicKey;
use lao_types::{Base64UrlData, Hash, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{ensure, non_empty, non_negative, not_before, Validate};
use crate::{ids, MessageError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionVersion {
    OpenBallot,
    SecretBallot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotingMethod {
    Plurality,
    Approval,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectionQuestion {
    pub id: Hash,
    pub question: String,
    pub voting_method: VotingMethod,
    pub ballot_options: Vec<String>,
    pub write_in: bool,
}

impl ElectionQuestion {
    pub fn new(election_id: &Hash, question: &str, ballot_options: Vec<String>, write_in: bool) -> Self {
        Self {
            id: ids::question_id(election_id, question),
            question: question.to_string(),
            voting_method: VotingMethod::Plurality,
            ballot_options,
            write_in,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectionSetup {
    pub id: Hash,
    pub lao: Hash,
    pub name: String,
    pub version: ElectionVersion,
    pub created_at: Timestamp,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub questions: Vec<ElectionQuestion>,
}

impl ElectionSetup {
    /// Build a setup, deriving the election id and every question id.
    /// `questions` are `(text, ballot options, write-in allowed)`.
    pub fn new(
        lao: Hash,
        name: &str,
        version: ElectionVersion,
        created_at: Timestamp,
        start_time: Timestamp,
        end_time: Timestamp,
        questions: Vec<(String, Vec<String>, bool)>,
    ) -> Self {
        let id = ids::election_id(&lao, created_at, name);
        let questions = questions
            .into_iter()
            .map(|(q, options, write_in)| ElectionQuestion::new(&id, &q, options, write_in))
            .collect();
        Self {
            id,
            lao,
            name: name.to_string(),
            version,
            created_at,
            start_time,
            end_time,
            questions,
        }
    }
}

impl Validate for ElectionSetup {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("created_at", self.created_at)?;
        not_before("start_time", self.start_time, "created_at", self.created_at)?;
        not_before("end_time", self.end_time, "start_time", self.start_time)?;
        let expected = ids::election_id(&self.lao, self.created_at, &self.name);
        ensure(self.id == expected, || {
            format!("election id {} does not match its fields", self.id)
        })?;
        ensure(!self.questions.is_empty(), || "election without questions".into())?;

        let mut texts = HashSet::new();
        for q in &self.questions {
            non_empty("question", &q.question)?;
            ensure(texts.insert(q.question.as_str()), || {
                format!("duplicate question {:?}", q.question)
            })?;
            ensure(q.id == ids::question_id(&self.id, &q.question), || {
                format!("question id {} does not match its fields", q.id)
            })?;
            ensure(!q.ballot_options.is_empty(), || {
                format!("question {:?} has no ballot options", q.question)
            })?;
            ensure(q.ballot_options.len() <= usize::from(u16::MAX), || {
                format!("question {:?} has too many ballot options", q.question)
            })?;
            let mut options = HashSet::new();
            ensure(q.ballot_options.iter().all(|o| options.insert(o.as_str())), || {
                format!("question {:?} repeats a ballot option", q.question)
            })?;
        }
        Ok(())
    }
}

/// Announces the public key secret ballots are encrypted under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectionKey {
    pub election: Hash,
    pub election_key: ElectionPublicKey,
}

impl Validate for ElectionKey {
    fn validate(&self) -> Result<(), MessageError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenElection {
    pub lao: Hash,
    pub election: Hash,
    pub opened_at: Timestamp,
}

impl Validate for OpenElection {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("opened_at", self.opened_at)
    }
}

/// A ballot selection: an option index on open ballots, a ciphertext of the
/// index on secret ballots.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteValue {
    Index(u16),
    Ciphertext(Base64UrlData),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vote {
    pub id: Hash,
    pub question: Hash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_in: Option<String>,
}

impl Vote {
    pub fn open(election: &Hash, question: &Hash, index: u16) -> Self {
        Self::with_value(election, question, VoteValue::Index(index))
    }

    pub fn encrypted(election: &Hash, question: &Hash, ciphertext: Base64UrlData) -> Self {
        Self::with_value(election, question, VoteValue::Ciphertext(ciphertext))
    }

    pub fn write_in(election: &Hash, question: &Hash, text: &str) -> Self {
        Self {
            id: ids::vote_id(election, question, text),
            question: question.clone(),
            vote: None,
            write_in: Some(text.to_string()),
        }
    }

    fn with_value(election: &Hash, question: &Hash, value: VoteValue) -> Self {
        let mut vote = Self {
            id: question.clone(),
            question: question.clone(),
            vote: Some(value),
            write_in: None,
        };
        vote.id = ids::vote_id(election, question, &vote.selector());
        vote
    }

    /// The string hashed into the vote id.
    pub fn selector(&self) -> String {
        match (&self.vote, &self.write_in) {
            (Some(VoteValue::Index(i)), _) => i.to_string(),
            (Some(VoteValue::Ciphertext(c)), _) => c.as_str().to_string(),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.vote, Some(VoteValue::Ciphertext(_)))
    }

    pub fn expected_id(&self, election: &Hash) -> Hash {
        ids::vote_id(election, &self.question, &self.selector())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastVote {
    pub lao: Hash,
    pub election: Hash,
    pub created_at: Timestamp,
    pub votes: Vec<Vote>,
}

impl Validate for CastVote {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("created_at", self.created_at)?;
        ensure(!self.votes.is_empty(), || "cast_vote without votes".into())?;
        let mut questions = HashSet::new();
        for vote in &self.votes {
            ensure(vote.vote.is_some() != vote.write_in.is_some(), || {
                format!("vote {} must carry exactly one of `vote` and `write_in`", vote.id)
            })?;
            ensure(questions.insert(&vote.question), || {
                format!("question {} answered twice", vote.question)
            })?;
            ensure(vote.id == vote.expected_id(&self.election), || {
                format!("vote id {} does not match its fields", vote.id)
            })?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndElection {
    pub lao: Hash,
    pub election: Hash,
    pub created_at: Timestamp,
    /// Hash of the sorted counted vote ids, or `""` when nobody voted.
    pub registered_votes: String,
}

impl Validate for EndElection {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("created_at", self.created_at)?;
        if !self.registered_votes.is_empty() {
            Hash::parse(&self.registered_votes)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionResult {
    pub ballot_option: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionResultEntry {
    pub id: Hash,
    pub result: Vec<QuestionResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectionResult {
    pub questions: Vec<QuestionResultEntry>,
}

impl Validate for ElectionResult {
    fn validate(&self) -> Result<(), MessageError> {
        let mut seen = HashSet::new();
        for q in &self.questions {
            ensure(seen.insert(&q.id), || format!("question {} reported twice", q.id))?;
        }
        Ok(())
    }
}
