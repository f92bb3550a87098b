use proptest::prelude::*;

use lao_crypto::ElectionKeyPair;
use lao_election::{plaintext_index, Election, ElectionError, Tally};
use lao_messages::data::{CastVote, ElectionSetup, ElectionVersion, Vote};
use lao_types::{Hash, MessageId, PublicKey, Timestamp};

fn setup() -> ElectionSetup {
    ElectionSetup::new(
        Hash::from_bytes([1u8; 32]),
        "Budget",
        ElectionVersion::OpenBallot,
        Timestamp::new(0),
        Timestamp::new(0),
        Timestamp::new(1_000),
        vec![
            ("Q1".into(), vec!["a".into(), "b".into(), "c".into()], false),
            ("Q2".into(), vec!["x".into(), "y".into()], false),
        ],
    )
}

/// (sender, message byte, created_at, index for Q1, index for Q2)
type Cast = (u8, u8, i64, u16, u16);

fn casts() -> impl Strategy<Value = Vec<Cast>> {
    prop::collection::vec((0u8..6, any::<u8>(), 0i64..1_000, 0u16..3, 0u16..2), 0..25)
}

fn apply(setup: &ElectionSetup, casts: &[Cast]) -> Election {
    let mut election = Election::from_setup(setup);
    election.open(Timestamp::new(0)).unwrap();
    for (sender, message, at, i1, i2) in casts {
        let cast = CastVote {
            lao: setup.lao.clone(),
            election: setup.id.clone(),
            created_at: Timestamp::new(*at),
            votes: vec![
                Vote::open(&setup.id, &setup.questions[0].id, *i1),
                Vote::open(&setup.id, &setup.questions[1].id, *i2),
            ],
        };
        // Message ids are unique per content in practice.
        let mut id = [*message; 32];
        id[0] = *sender;
        id[1..9].copy_from_slice(&at.to_be_bytes());
        id[9] = *i1 as u8;
        id[10] = *i2 as u8;
        election
            .record_cast(PublicKey([*sender; 32]), &MessageId::from_bytes(id), &cast)
            .unwrap();
    }
    election
}

proptest! {
    /// Any arrival order of the same casts yields the same tally.
    #[test]
    fn tally_is_order_independent(casts in casts(), seed in any::<u64>()) {
        let setup = setup();
        let mut shuffled = casts.clone();
        // Deterministic Fisher-Yates driven by the seed.
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }
        let a = Tally::compute(&apply(&setup, &casts), None);
        let b = Tally::compute(&apply(&setup, &shuffled), None);
        prop_assert_eq!(a, b);
    }

    /// Each sender contributes at most one vote per question.
    #[test]
    fn one_counted_vote_per_sender_and_question(casts in casts()) {
        let setup = setup();
        let election = apply(&setup, &casts);
        let senders: std::collections::BTreeSet<u8> = casts.iter().map(|c| c.0).collect();
        let tally = Tally::compute(&election, None);
        let results = tally.results.unwrap();
        for q in &setup.questions {
            let total: u64 = results[&q.id].iter().map(|r| r.count).sum();
            prop_assert_eq!(total, senders.len() as u64);
        }
        prop_assert_eq!(tally.registered_votes.is_empty(), casts.is_empty());
    }

    #[test]
    fn encrypted_vote_has_no_plaintext_index(index in any::<u16>()) {
        let keys = ElectionKeyPair::generate();
        let election = Hash::from_bytes([2u8; 32]);
        let question = Hash::from_bytes([3u8; 32]);
        let vote = Vote::encrypted(&election, &question, keys.public.encrypt_vote_index(index).unwrap());
        prop_assert_eq!(plaintext_index(&vote), Err(ElectionError::EncryptedBallot(vote.id.clone())));
    }
}
