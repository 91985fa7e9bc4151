// Circuit Building: choosing the relays one message will traverse
//
// A circuit is a uniform random sample of distinct registered relays. The
// sampled order is the hop order: index 0 is the entry, the last is the exit.

use super::codec::Address;
use super::error::OnionError;
use crate::directory::{NodeId, NodeRecord};
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Hops per circuit
pub const CIRCUIT_LENGTH: usize = 3;

/// Ordered relay path for a single message. Never persisted or reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    hops: Vec<NodeRecord>,
}

impl Circuit {
    /// Build a circuit from an explicit hop order.
    ///
    /// Fails if the list is empty or names a node twice.
    pub fn from_hops(hops: Vec<NodeRecord>) -> Result<Self, OnionError> {
        if hops.is_empty() {
            return Err(OnionError::InvalidCircuitLength(0));
        }

        let mut seen = HashSet::new();
        let mut first_repeat = None;
        for hop in &hops {
            if !seen.insert(hop.node_id) && first_repeat.is_none() {
                first_repeat = Some(hop.node_id);
            }
        }

        match first_repeat {
            Some(node_id) => Err(OnionError::RepeatedHop {
                node_id,
                distinct: seen.len(),
                hops: hops.len(),
            }),
            None => Ok(Self { hops }),
        }
    }

    pub fn hops(&self) -> &[NodeRecord] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn entry(&self) -> &NodeRecord {
        &self.hops[0]
    }

    pub fn exit(&self) -> &NodeRecord {
        &self.hops[self.hops.len() - 1]
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.hops.iter().map(|hop| hop.node_id).collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.hops.iter().map(|hop| hop.address).collect()
    }
}

/// Select `length` distinct relays at random, in random order.
///
/// Duplicate `node_id`s in `available` count once. Never returns a shorter
/// circuit than requested.
pub fn build_circuit(available: &[NodeRecord], length: usize) -> Result<Circuit, OnionError> {
    if length == 0 {
        return Err(OnionError::InvalidCircuitLength(length));
    }

    let mut seen = HashSet::new();
    let mut candidates: Vec<NodeRecord> = available
        .iter()
        .filter(|node| seen.insert(node.node_id))
        .cloned()
        .collect();

    if candidates.len() < length {
        return Err(OnionError::InsufficientNodes {
            available: candidates.len(),
            required: length,
        });
    }

    let mut rng = rand::thread_rng();
    let (selected, _) = candidates.partial_shuffle(&mut rng, length);
    let circuit = Circuit {
        hops: selected.to_vec(),
    };

    tracing::debug!(hops = ?circuit.node_ids(), "circuit selected");
    Ok(circuit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create_test_nodes(count: u32) -> Vec<NodeRecord> {
        (0..count)
            .map(|i| NodeRecord::new(i, [i as u8; 32], Address::new(4000 + i)))
            .collect()
    }

    #[test]
    fn test_build_circuit_length_and_distinct() {
        let nodes = create_test_nodes(10);
        for _ in 0..50 {
            let circuit = build_circuit(&nodes, CIRCUIT_LENGTH).unwrap();
            assert_eq!(circuit.len(), CIRCUIT_LENGTH);

            let ids: HashSet<_> = circuit.node_ids().into_iter().collect();
            assert_eq!(ids.len(), CIRCUIT_LENGTH);
        }
    }

    #[test]
    fn test_build_circuit_exact_pool() {
        let nodes = create_test_nodes(3);
        let circuit = build_circuit(&nodes, 3).unwrap();
        let mut ids = circuit.node_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_build_circuit_insufficient_nodes() {
        for count in 0..CIRCUIT_LENGTH as u32 {
            let nodes = create_test_nodes(count);
            let result = build_circuit(&nodes, CIRCUIT_LENGTH);
            assert_eq!(
                result,
                Err(OnionError::InsufficientNodes {
                    available: count as usize,
                    required: CIRCUIT_LENGTH,
                })
            );
        }
    }

    #[test]
    fn test_build_circuit_duplicates_count_once() {
        let mut nodes = create_test_nodes(2);
        nodes.push(nodes[0].clone());
        nodes.push(nodes[1].clone());

        let result = build_circuit(&nodes, 3);
        assert!(matches!(
            result,
            Err(OnionError::InsufficientNodes { available: 2, required: 3 })
        ));
    }

    #[test]
    fn test_build_circuit_zero_length() {
        let nodes = create_test_nodes(5);
        assert_eq!(
            build_circuit(&nodes, 0),
            Err(OnionError::InvalidCircuitLength(0))
        );
    }

    #[test]
    fn test_build_circuit_every_node_reaches_every_position() {
        let nodes = create_test_nodes(4);
        let mut positions: HashMap<(usize, NodeId), usize> = HashMap::new();

        for _ in 0..2000 {
            let circuit = build_circuit(&nodes, 3).unwrap();
            for (position, id) in circuit.node_ids().into_iter().enumerate() {
                *positions.entry((position, id)).or_default() += 1;
            }
        }

        // 4 nodes × 3 positions, each expected ~500 times
        assert_eq!(positions.len(), 12);
        assert!(positions.values().all(|&count| count > 300));
    }

    #[test]
    fn test_circuit_entry_and_exit() {
        let circuit = Circuit::from_hops(create_test_nodes(3)).unwrap();
        assert_eq!(circuit.entry().node_id, 0);
        assert_eq!(circuit.exit().node_id, 2);
        assert_eq!(
            circuit.addresses(),
            vec![Address::new(4000), Address::new(4001), Address::new(4002)]
        );
    }

    #[test]
    fn test_circuit_from_hops_rejects_repeats() {
        let nodes = create_test_nodes(4);
        let hops = vec![
            nodes[1].clone(),
            nodes[2].clone(),
            nodes[1].clone(),
            nodes[3].clone(),
        ];
        assert_eq!(
            Circuit::from_hops(hops),
            Err(OnionError::RepeatedHop {
                node_id: 1,
                distinct: 3,
                hops: 4,
            })
        );
        assert_eq!(
            Circuit::from_hops(vec![]),
            Err(OnionError::InvalidCircuitLength(0))
        );
    }
}
