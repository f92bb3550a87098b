//! Election operations against the election repository.

use lao_crypto::ElectionSecretKey;
use lao_messages::data::{CastVote, ElectionKey, ElectionResult, ElectionSetup, EndElection, OpenElection, QuestionResult};
use lao_store::{EntityKey, KeyedRepository, StoreError};
use lao_types::{Hash, MessageId, PublicKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{Election, ElectionError, Tally};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CastOutcome {
    /// Votes that replaced or added a choice.
    pub applied: usize,
    /// Votes older than what the sender already had on record.
    pub outdated: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndOutcome {
    /// The digest this client computed.
    pub registered_votes: String,
    /// The digest the organizer announced.
    pub announced: String,
    pub results: Option<BTreeMap<Hash, Vec<QuestionResult>>>,
    pub invalid_ballots: Vec<Hash>,
}

impl EndOutcome {
    pub fn matches(&self) -> bool {
        self.registered_votes == self.announced
    }
}

pub struct ElectionEngine {
    elections: KeyedRepository<EntityKey, Election>,
    secret_keys: RwLock<HashMap<Hash, Arc<ElectionSecretKey>>>,
}

impl Default for ElectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ElectionEngine {
    pub fn new() -> Self {
        Self {
            elections: KeyedRepository::new("elections"),
            secret_keys: RwLock::new(HashMap::new()),
        }
    }

    pub async fn setup(&self, setup: &ElectionSetup) -> Result<Election, ElectionError> {
        let election = Election::from_setup(setup);
        self.elections
            .insert(EntityKey::new(&setup.lao, &setup.id), election.clone())
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => ElectionError::AlreadyExists(setup.id.clone()),
                other => other.into(),
            })?;
        tracing::info!(
            election = %setup.id,
            lao = %setup.lao,
            questions = setup.questions.len(),
            version = ?setup.version,
            "election set up"
        );
        Ok(election)
    }

    pub async fn set_key(&self, lao: &Hash, key: &ElectionKey) -> Result<(), ElectionError> {
        self.update(lao, &key.election, |e| e.set_key(key.election_key)).await
    }

    /// Hold the secret key of an election this client organizes, so it can
    /// tally secret ballots.
    pub async fn install_secret_key(&self, election: &Hash, key: ElectionSecretKey) {
        self.secret_keys
            .write()
            .await
            .insert(election.clone(), Arc::new(key));
    }

    pub async fn open(&self, lao: &Hash, open: &OpenElection) -> Result<(), ElectionError> {
        self.update(lao, &open.election, |e| e.open(open.opened_at)).await?;
        tracing::info!(election = %open.election, "election opened");
        Ok(())
    }

    pub async fn cast_vote(
        &self,
        lao: &Hash,
        sender: PublicKey,
        message_id: &MessageId,
        cast: &CastVote,
    ) -> Result<CastOutcome, ElectionError> {
        let applied = self
            .update(lao, &cast.election, |e| e.record_cast(sender, message_id, cast))
            .await?;
        let outcome = CastOutcome {
            applied,
            outdated: cast.votes.len() - applied,
        };
        tracing::debug!(
            election = %cast.election,
            sender = %sender,
            message_id = %message_id,
            applied = outcome.applied,
            outdated = outcome.outdated,
            "votes recorded"
        );
        Ok(outcome)
    }

    /// Close the election and tally it. A digest that differs from the
    /// announced one is reported in the outcome, not as an error.
    pub async fn end(&self, lao: &Hash, end: &EndElection) -> Result<EndOutcome, ElectionError> {
        let key = self.secret_keys.read().await.get(&end.election).cloned();
        let outcome = self
            .update(lao, &end.election, |e| {
                e.close(end.created_at)?;
                let tally = Tally::compute(e, key.as_deref());
                e.registered_votes = Some(end.registered_votes.clone());
                if let Some(results) = &tally.results {
                    e.set_results(results.clone())?;
                }
                Ok(EndOutcome {
                    registered_votes: tally.registered_votes,
                    announced: end.registered_votes.clone(),
                    results: tally.results,
                    invalid_ballots: tally.invalid,
                })
            })
            .await?;
        if outcome.matches() {
            tracing::info!(election = %end.election, "election ended");
        } else {
            tracing::warn!(
                election = %end.election,
                computed = %outcome.registered_votes,
                announced = %outcome.announced,
                "registered votes differ from the announced digest"
            );
        }
        Ok(outcome)
    }

    /// Published results replace any local tally.
    pub async fn apply_result(
        &self,
        lao: &Hash,
        election: &Hash,
        result: &ElectionResult,
    ) -> Result<(), ElectionError> {
        let entries = result
            .questions
            .iter()
            .map(|q| (q.id.clone(), q.result.clone()));
        self.update(lao, election, |e| e.set_results(entries)).await
    }

    pub async fn get(&self, lao: &Hash, election: &Hash) -> Option<Election> {
        self.elections.get(&EntityKey::new(lao, election)).await
    }

    pub async fn contains(&self, lao: &Hash, election: &Hash) -> bool {
        self.elections.contains(&EntityKey::new(lao, election)).await
    }

    pub async fn elections_of(&self, lao: &Hash) -> Vec<Election> {
        let mut all: Vec<Election> = self
            .elections
            .snapshot(|k| k.lao == *lao)
            .await
            .into_iter()
            .map(|(_, e)| e)
            .collect();
        all.sort_by(|a, b| (a.creation, &a.id).cmp(&(b.creation, &b.id)));
        all
    }

    /// Witnesses certified the setup.
    pub async fn mark_witnessed(&self, lao: &Hash, election: &Hash) -> Result<(), ElectionError> {
        self.update(lao, election, |e| {
            e.witnessed = true;
            Ok(())
        })
        .await
    }

    pub async fn teardown(&self, lao: &Hash) -> usize {
        let removed: Vec<Hash> = self
            .elections
            .snapshot(|k| k.lao == *lao)
            .await
            .into_iter()
            .map(|(k, _)| k.id)
            .collect();
        self.elections.retain(|k| k.lao != *lao).await;
        let mut keys = self.secret_keys.write().await;
        for id in &removed {
            keys.remove(id);
        }
        removed.len()
    }

    pub fn repository(&self) -> &KeyedRepository<EntityKey, Election> {
        &self.elections
    }

    async fn update<R>(
        &self,
        lao: &Hash,
        election: &Hash,
        f: impl FnOnce(&mut Election) -> Result<R, ElectionError>,
    ) -> Result<R, ElectionError> {
        self.elections
            .update(&EntityKey::new(lao, election), f)
            .await
            .map_err(|e| match e {
                ElectionError::Store(StoreError::NotFound(_)) => {
                    ElectionError::UnknownElection(election.clone())
                }
                other => other,
            })
    }
}
