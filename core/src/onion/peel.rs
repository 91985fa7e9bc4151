// Relay Peeling Engine: removing exactly one layer per hop
//
// Every relay runs the same steps on every envelope, whatever its position:
//   split → unwrap key → decrypt → decode → forward remainder to next address
//
// The relay never looks inside the remainder. At the exit hop it happens to
// be the plaintext and the address happens to be the recipient.
// No per-circuit state is kept between envelopes.

use super::codec::{decode_layer, split_envelope, Address};
use super::error::OnionError;
use crate::crypto::{generate_key_pair, sym_decrypt, unwrap_key, RelayKeyPair};
use crate::directory::{NodeId, NodeRecord};
use crate::transport::Transport;

/// What a relay recovers from one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeledLayer {
    /// Where the remainder goes next
    pub next_hop: Address,
    /// Opaque bytes for the next hop (inner envelope or final payload)
    pub remainder: Vec<u8>,
}

/// Remove one layer with the relay's key pair.
///
/// Envelopes shorter than the wrapped-key segment are rejected before any
/// decryption is attempted.
pub fn peel_layer(envelope: &[u8], keys: &RelayKeyPair) -> Result<PeeledLayer, OnionError> {
    let (wrapped_key, ciphertext) = split_envelope(envelope)?;
    let layer_key = unwrap_key(wrapped_key, keys)?;
    let content = sym_decrypt(&layer_key, ciphertext)?;
    let (next_hop, remainder) = decode_layer(&content)?;

    Ok(PeeledLayer {
        next_hop,
        remainder: remainder.to_vec(),
    })
}

/// A relay's identity plus its long-lived key pair.
///
/// Read-only after construction, so one instance can serve any number of
/// concurrent envelopes behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Relay {
    node_id: NodeId,
    address: Address,
    keys: RelayKeyPair,
}

impl Relay {
    /// New relay with a freshly generated key pair
    pub fn new(node_id: NodeId, address: Address) -> Self {
        Self::with_keys(node_id, address, generate_key_pair())
    }

    pub fn with_keys(node_id: NodeId, address: Address, keys: RelayKeyPair) -> Self {
        Self {
            node_id,
            address,
            keys,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Key pair access for debug endpoints and tests
    pub fn keys(&self) -> &RelayKeyPair {
        &self.keys
    }

    /// Directory entry advertising this relay
    pub fn record(&self) -> NodeRecord {
        NodeRecord::new(self.node_id, self.keys.public_key_bytes(), self.address)
    }

    pub fn peel(&self, envelope: &[u8]) -> Result<PeeledLayer, OnionError> {
        match peel_layer(envelope, &self.keys) {
            Ok(peeled) => {
                tracing::debug!(
                    node_id = self.node_id,
                    next_hop = %peeled.next_hop,
                    bytes = peeled.remainder.len(),
                    "layer peeled"
                );
                Ok(peeled)
            }
            Err(e) => {
                tracing::warn!(node_id = self.node_id, error = %e, "envelope dropped");
                Err(e)
            }
        }
    }

    /// Send an already-peeled remainder to its next hop.
    ///
    /// One attempt, no retry. Returns the downstream response body.
    pub async fn forward(
        &self,
        peeled: &PeeledLayer,
        transport: &dyn Transport,
    ) -> Result<Vec<u8>, OnionError> {
        transport
            .send(peeled.next_hop, peeled.remainder.clone())
            .await
            .map_err(|e| {
                tracing::warn!(
                    node_id = self.node_id,
                    next_hop = %peeled.next_hop,
                    error = %e,
                    "forward failed"
                );
                OnionError::from(e)
            })
    }

    /// Peel then forward. Nothing is sent if peeling fails.
    pub async fn handle(
        &self,
        envelope: &[u8],
        transport: &dyn Transport,
    ) -> Result<PeeledLayer, OnionError> {
        let peeled = self.peel(envelope)?;
        self.forward(&peeled, transport).await?;
        Ok(peeled)
    }
}
