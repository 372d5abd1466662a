//! Property tests for fragment framing and reassembly

use bleuchat_core::{fragment_payload, MessageEnvelope, PeerId, Reassembler, Timestamp};
use proptest::prelude::*;

fn arb_peer_id() -> impl Strategy<Value = PeerId> {
    any::<[u8; 16]>().prop_map(PeerId::from_bytes)
}

fn arb_body() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9 .,!?é😀]{1,1500}").unwrap()
}

proptest! {
    /// Exactly one envelope, and only once the declared length is reached
    #[test]
    fn emits_once_at_declared_length(
        sender in arb_peer_id(),
        body in arb_body(),
        timestamp in 0u64..=u64::MAX / 2,
        mtu in 4usize..=512,
    ) {
        let envelope = MessageEnvelope::chat(sender, "Prop", body, Timestamp::new(timestamp));
        let encoded = envelope.encode().unwrap();
        prop_assume!(encoded.len() <= 4096);

        let fragments = fragment_payload(&encoded, mtu).unwrap();
        let mut reassembler = Reassembler::default();
        let mut emitted = Vec::new();

        for (i, fragment) in fragments.iter().enumerate() {
            prop_assert!(fragment.len() <= mtu);
            let out = reassembler.ingest(sender, fragment, Timestamp::new(0)).unwrap();
            if i + 1 < fragments.len() {
                prop_assert!(out.is_none());
            }
            emitted.extend(out);
        }

        prop_assert_eq!(emitted.len(), 1);
        prop_assert_eq!(&emitted[0], &envelope);
        prop_assert_eq!(reassembler.pending_count(), 0);
    }

    /// Arbitrary bytes never panic and never leave more than one buffer per peer
    #[test]
    fn garbage_never_panics(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32)) {
        let peer = PeerId::from_bytes([7; 16]);
        let mut reassembler = Reassembler::default();
        for chunk in &chunks {
            let _ = reassembler.ingest(peer, chunk, Timestamp::new(0));
            prop_assert!(reassembler.pending_count() <= 1);
        }
    }
}
