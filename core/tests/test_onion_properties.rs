//! Property-based tests for onion construction and peeling.

use onionnet_core::crypto::{AEAD_TAG_LEN, IV_LEN, WRAPPED_KEY_LEN};
use onionnet_core::{build_onion, Address, Circuit, OnionError, Relay, ADDRESS_WIDTH};
use proptest::prelude::*;

fn three_relays() -> Vec<Relay> {
    (1..=3).map(|i| Relay::new(i, Address::new(4000 + i))).collect()
}

fn circuit_for(relays: &[Relay]) -> Circuit {
    Circuit::from_hops(relays.iter().map(Relay::record).collect()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: peeling all three layers in order yields the message and address
    #[test]
    fn prop_three_hop_roundtrip(
        message in prop::collection::vec(any::<u8>(), 0..2048),
        destination in any::<u32>(),
    ) {
        let relays = three_relays();
        let final_address = Address::new(destination);
        let onion = build_onion(&circuit_for(&relays), final_address, &message).unwrap();

        let mut envelope = onion.envelope;
        for (index, relay) in relays.iter().enumerate() {
            let peeled = relay.peel(&envelope).unwrap();
            let expected = relays
                .get(index + 1)
                .map(Relay::address)
                .unwrap_or(final_address);
            prop_assert_eq!(peeled.next_hop, expected);
            envelope = peeled.remainder;
        }
        prop_assert_eq!(envelope, message);
    }

    /// Property: any single flipped bit at the entry hop is detected
    #[test]
    fn prop_bit_flip_detected(
        message in prop::collection::vec(any::<u8>(), 1..256),
        bit_seed in any::<usize>(),
    ) {
        let relays = three_relays();
        let onion = build_onion(&circuit_for(&relays), Address::new(9001), &message).unwrap();

        let bit = bit_seed % (onion.envelope.len() * 8);
        let mut tampered = onion.envelope.clone();
        tampered[bit / 8] ^= 1 << (bit % 8);

        let err = relays[0].peel(&tampered).unwrap_err();
        if bit / 8 < WRAPPED_KEY_LEN {
            prop_assert!(err.is_unwrap_error(), "key segment flip gave {:?}", err);
        } else {
            prop_assert!(err.is_decrypt_error(), "ciphertext flip gave {:?}", err);
        }
    }

    /// Property: envelope growth per hop is constant
    #[test]
    fn prop_layer_overhead_constant(
        message in prop::collection::vec(any::<u8>(), 0..1024),
    ) {
        let relays = three_relays();
        let onion = build_onion(&circuit_for(&relays), Address::new(1), &message).unwrap();
        let per_layer = WRAPPED_KEY_LEN + IV_LEN + AEAD_TAG_LEN + ADDRESS_WIDTH;
        prop_assert_eq!(onion.envelope.len(), message.len() + 3 * per_layer);
    }
}

#[test]
fn test_truncated_envelopes_never_decrypt() {
    let relays = three_relays();
    let onion = build_onion(&circuit_for(&relays), Address::new(9001), b"hello").unwrap();

    for len in 0..onion.envelope.len() {
        let err = relays[0].peel(&onion.envelope[..len]).unwrap_err();
        if len < WRAPPED_KEY_LEN {
            assert!(matches!(err, OnionError::MalformedFrame(_)), "len {}", len);
        } else {
            assert!(err.is_decrypt_error(), "len {} gave {:?}", len, err);
        }
    }
}
