use proptest::prelude::*;

use lao_crypto::keypair_from_seed;
use lao_messages::data::{CreateLao, Vote};
use lao_messages::{ids, Data, MessageError, MessageGeneral};
use lao_types::{Hash, Timestamp};

proptest! {
    /// A signed LAO creation verifies and decodes back to itself.
    #[test]
    fn signed_create_lao_verifies(seed in prop::array::uniform32(any::<u8>()), name in "[a-zA-Z ]{1,24}", creation in 0i64..4_000_000_000) {
        prop_assume!(!name.trim().is_empty());
        let keys = keypair_from_seed(&seed);
        let data = Data::CreateLao(CreateLao::new(&name, Timestamp::new(creation), keys.public, vec![]));
        let msg = MessageGeneral::new(&keys, &data).unwrap();
        prop_assert!(msg.verify().is_ok());
        prop_assert_eq!(msg.decode_data().unwrap(), data);
    }

    /// Vote ids are a pure function of (election, question, selector).
    #[test]
    fn vote_id_is_pure(e in prop::array::uniform32(any::<u8>()), q in prop::array::uniform32(any::<u8>()), index in any::<u16>()) {
        let election = Hash::from_bytes(e);
        let question = Hash::from_bytes(q);
        let a = Vote::open(&election, &question, index);
        let b = Vote::open(&election, &question, index);
        prop_assert_eq!(&a.id, &b.id);
        prop_assert_eq!(a.id, ids::vote_id(&election, &question, &index.to_string()));
    }

    /// Arbitrary bytes never panic the decoder and never decode to an
    /// unsupported pair silently.
    #[test]
    fn decoder_is_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        match Data::decode(&bytes) {
            Ok(data) => prop_assert!(Data::is_supported(data.object_action())),
            Err(MessageError::Json(_) | MessageError::InvalidData(_) | MessageError::Unsupported { .. } | MessageError::Types(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
        }
    }
}
