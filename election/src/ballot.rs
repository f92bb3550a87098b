//! Per-vote checks and plaintext extraction.

use lao_crypto::ElectionSecretKey;
use lao_messages::data::election::{ElectionQuestion, ElectionVersion, VoteValue};
use lao_messages::data::Vote;

use crate::ElectionError;

/// The ballot index of an open-ballot vote.
pub fn plaintext_index(vote: &Vote) -> Result<u16, ElectionError> {
    match &vote.vote {
        Some(VoteValue::Index(index)) => Ok(*index),
        Some(VoteValue::Ciphertext(_)) => Err(ElectionError::EncryptedBallot(vote.id.clone())),
        None => Err(ElectionError::NoSelection(vote.id.clone())),
    }
}

/// The ballot index of a vote, decrypting it if needed.
pub fn decrypt_index(vote: &Vote, key: &ElectionSecretKey) -> Result<u16, ElectionError> {
    match &vote.vote {
        Some(VoteValue::Ciphertext(ciphertext)) => Ok(key.decrypt_vote_index(ciphertext.as_str())?),
        _ => plaintext_index(vote),
    }
}

/// Check a vote against the ballot kind and the question it answers.
///
/// Encrypted indices can only be range-checked once decrypted.
pub fn check_vote(
    vote: &Vote,
    version: ElectionVersion,
    question: &ElectionQuestion,
) -> Result<(), ElectionError> {
    if vote.write_in.is_some() && !question.write_in {
        return Err(ElectionError::WriteInNotAllowed(question.id.clone()));
    }
    match (version, &vote.vote) {
        (ElectionVersion::OpenBallot, Some(VoteValue::Ciphertext(_))) => {
            Err(ElectionError::EncryptedBallot(vote.id.clone()))
        }
        (ElectionVersion::SecretBallot, Some(VoteValue::Index(_))) => {
            Err(ElectionError::PlaintextBallot(vote.id.clone()))
        }
        (_, Some(VoteValue::Index(index))) => check_range(question, *index),
        _ => Ok(()),
    }
}

pub(crate) fn check_range(question: &ElectionQuestion, index: u16) -> Result<(), ElectionError> {
    if usize::from(index) >= question.ballot_options.len() {
        return Err(ElectionError::OptionOutOfRange {
            question: question.id.clone(),
            index,
            options: question.ballot_options.len(),
        });
    }
    Ok(())
}
