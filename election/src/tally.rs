//! Deterministic tally.
//!
//! Clients may receive votes in any order, so counted votes are first put in
//! canonical order: by the encoding of the carrying message id, then by
//! position inside that message. The digest of the ordered vote ids is what
//! the organizer announces in `election#end`.

use lao_crypto::{hash, ElectionSecretKey};
use lao_messages::data::QuestionResult;
use lao_types::Hash;
use std::collections::BTreeMap;

use crate::ballot::{check_range, decrypt_index, plaintext_index};
use crate::{Election, RecordedVote};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    /// Digest of the ordered vote ids, `""` when nobody voted.
    pub registered_votes: String,
    /// Per-question counts. `None` for a secret ballot without the key.
    pub results: Option<BTreeMap<Hash, Vec<QuestionResult>>>,
    /// Ids of counted votes whose ballot could not be read.
    pub invalid: Vec<Hash>,
}

impl Tally {
    /// Ballots that fail to decrypt or pick a missing option are left out of
    /// the counts and listed in `invalid`; they still enter the digest.
    pub fn compute(election: &Election, key: Option<&ElectionSecretKey>) -> Self {
        let ordered = canonical_order(election.counted_votes());
        let registered_votes = registered_votes_digest(&ordered);
        let mut invalid = Vec::new();
        let results = if election.is_secret_ballot() && key.is_none() {
            None
        } else {
            let mut results = BTreeMap::new();
            for question in &election.questions {
                let mut selections = Vec::new();
                for recorded in ordered.iter().filter(|v| v.vote.question == question.id) {
                    if let Some(text) = &recorded.vote.write_in {
                        selections.push(Selection::WriteIn(text));
                        continue;
                    }
                    let index = match key {
                        Some(key) => decrypt_index(&recorded.vote, key),
                        None => plaintext_index(&recorded.vote),
                    };
                    match index.and_then(|i| check_range(question, i).map(|_| i)) {
                        Ok(index) => selections.push(Selection::Option(index)),
                        Err(e) => {
                            tracing::warn!(vote = %recorded.vote.id, error = %e, "ballot not counted");
                            invalid.push(recorded.vote.id.clone());
                        }
                    }
                }
                results.insert(
                    question.id.clone(),
                    count_votes(&question.ballot_options, selections),
                );
            }
            Some(results)
        };
        Self {
            registered_votes,
            results,
            invalid,
        }
    }
}

/// What one counted vote picked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection<'a> {
    Option(u16),
    WriteIn(&'a str),
}

/// Explicit stable sort, independent of arrival order.
pub fn canonical_order<'a>(votes: impl IntoIterator<Item = &'a RecordedVote>) -> Vec<&'a RecordedVote> {
    let mut ordered: Vec<&RecordedVote> = votes.into_iter().collect();
    ordered.sort_by(|a, b| {
        a.message_id
            .as_str()
            .cmp(b.message_id.as_str())
            .then(a.position.cmp(&b.position))
    });
    ordered
}

pub fn registered_votes_digest(ordered: &[&RecordedVote]) -> String {
    if ordered.is_empty() {
        return String::new();
    }
    let ids: Vec<&str> = ordered.iter().map(|v| v.vote.id.as_str()).collect();
    hash(&ids).as_str().to_string()
}

/// Count selections per ballot option. Every option is listed, in ballot
/// order, followed by write-ins in order of first appearance.
pub fn count_votes<'a>(
    options: &[String],
    selections: impl IntoIterator<Item = Selection<'a>>,
) -> Vec<QuestionResult> {
    let mut counts: Vec<QuestionResult> = options
        .iter()
        .map(|o| QuestionResult {
            ballot_option: o.clone(),
            count: 0,
        })
        .collect();
    for selection in selections {
        let slot = match selection {
            Selection::Option(index) => usize::from(index),
            Selection::WriteIn(text) => match counts.iter().position(|c| c.ballot_option == text) {
                Some(slot) => slot,
                None => {
                    counts.push(QuestionResult {
                        ballot_option: text.to_string(),
                        count: 0,
                    });
                    counts.len() - 1
                }
            },
        };
        if let Some(entry) = counts.get_mut(slot) {
            entry.count += 1;
        }
    }
    counts
}
