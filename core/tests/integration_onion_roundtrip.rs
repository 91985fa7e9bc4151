//! End-to-end onion routing over an in-memory network
//!
//! Verifies the complete three-hop flow:
//! 1. Relays register with the directory
//! 2. Sender builds a circuit and an onion
//! 3. Each relay peels exactly one layer and forwards
//! 4. The exit delivers the plaintext to the final address
//!
//! Run with: cargo test --test integration_onion_roundtrip

use onionnet_core::crypto::WRAPPED_KEY_LEN;
use onionnet_core::{
    build_onion, send_onion, Address, Circuit, Directory, MemoryTransport, NodeRegistry,
    OnionError, Relay, Transport, TransportError,
};
use std::collections::HashMap;

const FINAL_ADDRESS: Address = Address::new(9001);

async fn network_of(ids: &[u32]) -> (NodeRegistry, HashMap<Address, Relay>) {
    let registry = NodeRegistry::new();
    let mut relays = HashMap::new();
    for &id in ids {
        let relay = Relay::new(id, Address::new(4000 + id));
        registry.register(relay.record()).await.unwrap();
        relays.insert(relay.address(), relay);
    }
    (registry, relays)
}

/// Drain the transport, letting whichever relay owns each address handle it,
/// until something lands on an address no relay owns.
async fn run_until_delivered(
    relays: &HashMap<Address, Relay>,
    transport: &MemoryTransport,
) -> (Vec<Address>, Address, Vec<u8>) {
    let mut path = Vec::new();
    loop {
        let mut deliveries = transport.take_deliveries();
        assert_eq!(deliveries.len(), 1, "exactly one envelope in flight");
        let delivery = deliveries.remove(0);

        match relays.get(&delivery.address) {
            Some(relay) => {
                path.push(delivery.address);
                relay.handle(&delivery.bytes, transport).await.unwrap();
            }
            None => return (path, delivery.address, delivery.bytes),
        }
    }
}

#[tokio::test]
async fn test_hello_to_9001_through_four_node_registry() {
    let (registry, relays) = network_of(&[1, 2, 3, 4]).await;
    let transport = MemoryTransport::new();

    let sent = send_onion(&registry, &transport, FINAL_ADDRESS, b"hello")
        .await
        .unwrap();

    let (path, final_address, payload) = run_until_delivered(&relays, &transport).await;

    assert_eq!(path, sent.circuit.addresses());
    assert_eq!(final_address, FINAL_ADDRESS);
    assert_eq!(payload, b"hello");
}

#[tokio::test]
async fn test_each_hop_learns_only_next_address() {
    let (registry, relays) = network_of(&[1, 2, 3, 4]).await;
    let nodes = registry.list_nodes().await.unwrap();
    let circuit = Circuit::from_hops(vec![nodes[2].clone(), nodes[0].clone(), nodes[3].clone()])
        .unwrap();

    let onion = build_onion(&circuit, FINAL_ADDRESS, b"hello").unwrap();
    assert_eq!(onion.entry, Address::new(4003));

    let entry = relays[&Address::new(4003)].peel(&onion.envelope).unwrap();
    assert_eq!(entry.next_hop, Address::new(4001));
    assert!(!entry.remainder.windows(5).any(|w| w == b"hello"));

    let middle = relays[&Address::new(4001)].peel(&entry.remainder).unwrap();
    assert_eq!(middle.next_hop, Address::new(4004));

    let exit = relays[&Address::new(4004)].peel(&middle.remainder).unwrap();
    assert_eq!(exit.next_hop, FINAL_ADDRESS);
    assert_eq!(exit.remainder, b"hello");
}

#[tokio::test]
async fn test_two_node_registry_never_sends() {
    let (registry, _) = network_of(&[1, 2]).await;
    let transport = MemoryTransport::new();

    let err = send_onion(&registry, &transport, FINAL_ADDRESS, b"hello")
        .await
        .unwrap_err();

    assert!(matches!(err, OnionError::InsufficientNodes { available: 2, required: 3 }));
    assert_eq!(transport.delivery_count(), 0);
}

#[tokio::test]
async fn test_short_envelope_rejected_before_decryption() {
    let (_, relays) = network_of(&[1]).await;
    let relay = &relays[&Address::new(4001)];
    let transport = MemoryTransport::new();

    for len in [0, 1, WRAPPED_KEY_LEN - 1] {
        let err = relay.handle(&vec![0u8; len], &transport).await.unwrap_err();
        assert!(matches!(err, OnionError::MalformedFrame(_)), "len {}", len);
    }
    assert_eq!(transport.delivery_count(), 0);
}

#[tokio::test]
async fn test_unreachable_next_hop_is_terminal() {
    let (registry, relays) = network_of(&[1, 2, 3]).await;
    let nodes = registry.list_nodes().await.unwrap();
    let circuit = Circuit::from_hops(nodes).unwrap();
    let onion = build_onion(&circuit, FINAL_ADDRESS, b"hello").unwrap();

    let transport = MemoryTransport::new().with_unreachable(Address::new(4002));
    let err = relays[&Address::new(4001)]
        .handle(&onion.envelope, &transport)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OnionError::Transport(TransportError::Unreachable { .. })
    ));
    assert_eq!(transport.delivery_count(), 0);
}

#[tokio::test]
async fn test_concurrent_messages_are_independent() {
    let (registry, relays) = network_of(&[1, 2, 3, 4, 5]).await;
    let nodes = registry.list_nodes().await.unwrap();
    let relays = std::sync::Arc::new(relays);

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let relays = relays.clone();
        let nodes = nodes.clone();
        handles.push(tokio::spawn(async move {
            let circuit = onionnet_core::build_circuit(&nodes, 3).unwrap();
            let message = format!("message {}", i).into_bytes();
            let destination = Address::new(9000 + i);
            let onion = build_onion(&circuit, destination, &message).unwrap();

            let mut envelope = onion.envelope;
            let mut address = onion.entry;
            while let Some(relay) = relays.get(&address) {
                let peeled = relay.peel(&envelope).unwrap();
                address = peeled.next_hop;
                envelope = peeled.remainder;
            }
            (address, destination, envelope, message)
        }));
    }

    for handle in handles {
        let (address, destination, delivered, message) = handle.await.unwrap();
        assert_eq!(address, destination);
        assert_eq!(delivered, message);
    }
}

#[tokio::test]
async fn test_memory_transport_response_reaches_sender() {
    let (registry, _) = network_of(&[1, 2, 3]).await;
    let transport = MemoryTransport::new();
    let sent = send_onion(&registry, &transport, FINAL_ADDRESS, b"hi")
        .await
        .unwrap();
    assert!(sent.response.is_empty());

    let direct = transport.send(FINAL_ADDRESS, b"x".to_vec()).await;
    assert!(direct.is_ok());
}
