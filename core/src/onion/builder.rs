// Onion construction: nesting one encrypted layer per hop
//
// Built inside-out. The exit layer carries the final address and payload;
// every earlier layer carries the address of the hop that receives the
// envelope built just before it:
//
//   exit:   E3 = wrap(k3, pk3) || enc(k3, pad(final) || payload)
//   middle: E2 = wrap(k2, pk2) || enc(k2, pad(addr3) || E3)
//   entry:  E1 = wrap(k1, pk1) || enc(k1, pad(addr2) || E2)
//
// E1 goes to the entry relay.

use super::circuit::Circuit;
use super::codec::{encode_layer, join_envelope, Address};
use super::error::OnionError;
use crate::crypto::{generate_symmetric_key, sym_encrypt, wrap_key};
use crate::transport::MAX_ENVELOPE_SIZE;

/// A finished onion and the address it must be handed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Onion {
    /// Entry relay address
    pub entry: Address,
    /// Outermost envelope
    pub envelope: Vec<u8>,
}

/// Encrypt a single layer for one hop with a fresh layer key
fn seal_layer(
    hop_public_key: &x25519_dalek::PublicKey,
    next_hop: Address,
    inner: &[u8],
) -> Result<Vec<u8>, OnionError> {
    let content = encode_layer(next_hop, inner);
    let layer_key = generate_symmetric_key();
    let ciphertext = sym_encrypt(&layer_key, &content)?;
    let wrapped_key = wrap_key(&layer_key, hop_public_key)?;
    Ok(join_envelope(&wrapped_key, &ciphertext))
}

/// Build the nested envelope for `payload` addressed to `final_address`.
///
/// Does not chunk: a payload whose onion exceeds `MAX_ENVELOPE_SIZE` is
/// rejected before anything is sent.
pub fn build_onion(
    circuit: &Circuit,
    final_address: Address,
    payload: &[u8],
) -> Result<Onion, OnionError> {
    let mut next_hop = final_address;
    let mut envelope = payload.to_vec();

    for hop in circuit.hops().iter().rev() {
        envelope = seal_layer(&hop.x25519_public_key(), next_hop, &envelope)?;
        next_hop = hop.address;
    }

    if envelope.len() > MAX_ENVELOPE_SIZE {
        return Err(OnionError::EnvelopeTooLarge {
            size: envelope.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }

    tracing::debug!(
        entry = %circuit.entry().address,
        hops = circuit.len(),
        bytes = envelope.len(),
        "onion built"
    );

    Ok(Onion {
        entry: circuit.entry().address,
        envelope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{RelayKeyPair, AEAD_TAG_LEN, IV_LEN, WRAPPED_KEY_LEN};
    use crate::directory::NodeRecord;
    use crate::onion::codec::ADDRESS_WIDTH;

    fn circuit_of(count: u32) -> (Circuit, Vec<RelayKeyPair>) {
        let keys: Vec<_> = (0..count).map(|_| RelayKeyPair::generate()).collect();
        let hops = keys
            .iter()
            .zip(0..count)
            .map(|(k, i)| NodeRecord::new(i, k.public_key_bytes(), Address::new(4000 + i)))
            .collect();
        (Circuit::from_hops(hops).unwrap(), keys)
    }

    #[test]
    fn test_onion_addressed_to_entry() {
        let (circuit, _) = circuit_of(3);
        let onion = build_onion(&circuit, Address::new(9001), b"hello").unwrap();
        assert_eq!(onion.entry, Address::new(4000));
    }

    #[test]
    fn test_onion_size_is_deterministic() {
        let (circuit, _) = circuit_of(3);
        let payload = b"hello";
        let onion = build_onion(&circuit, Address::new(9001), payload).unwrap();

        let per_layer = WRAPPED_KEY_LEN + IV_LEN + AEAD_TAG_LEN + ADDRESS_WIDTH;
        assert_eq!(onion.envelope.len(), payload.len() + 3 * per_layer);
    }

    #[test]
    fn test_onions_differ_for_same_input() {
        let (circuit, _) = circuit_of(3);
        let first = build_onion(&circuit, Address::new(9001), b"same").unwrap();
        let second = build_onion(&circuit, Address::new(9001), b"same").unwrap();
        assert_ne!(first.envelope, second.envelope);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let (circuit, _) = circuit_of(3);
        let payload = vec![0u8; MAX_ENVELOPE_SIZE];
        let result = build_onion(&circuit, Address::new(9001), &payload);
        assert!(matches!(result, Err(OnionError::EnvelopeTooLarge { .. })));
    }

    #[test]
    fn test_low_order_hop_key_rejected() {
        let hops = vec![NodeRecord::new(1, [0u8; 32], Address::new(4001))];
        let circuit = Circuit::from_hops(hops).unwrap();
        let result = build_onion(&circuit, Address::new(9001), b"x");
        assert!(matches!(
            result,
            Err(OnionError::Crypto(crate::crypto::CryptoError::InvalidPublicKey))
        ));
    }
}
