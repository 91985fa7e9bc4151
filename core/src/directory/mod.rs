//! Node directory: who the relays are and how to reach them
//!
//! The registry is a plain node-id → public-key map. Circuit building only
//! consumes `list_nodes`; liveness and freshness are not checked here.

use crate::onion::codec::Address;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::PublicKey;

/// Stable relay identity within one run
pub type NodeId = u32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),
}

/// A registered relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: NodeId,
    /// X25519 public key, hex in JSON
    #[serde(rename = "pubKey", with = "hex::serde")]
    pub public_key: [u8; 32],
    pub address: Address,
}

impl NodeRecord {
    pub fn new(node_id: NodeId, public_key: [u8; 32], address: Address) -> Self {
        Self {
            node_id,
            public_key,
            address,
        }
    }

    pub fn x25519_public_key(&self) -> PublicKey {
        PublicKey::from(self.public_key)
    }
}

/// Register/list access to the node directory
#[async_trait]
pub trait Directory: Send + Sync {
    async fn register(&self, record: NodeRecord) -> Result<(), DirectoryError>;
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, DirectoryError>;
}

/// In-memory node registry
///
/// Re-registering an existing `node_id` replaces its entry in place, so list
/// order stays the order in which nodes first appeared.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<Vec<NodeRecord>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: NodeRecord) {
        let mut nodes = self.nodes.write();
        match nodes.iter_mut().find(|n| n.node_id == record.node_id) {
            Some(existing) => *existing = record,
            None => nodes.push(record),
        }
    }

    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.nodes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait]
impl Directory for NodeRegistry {
    async fn register(&self, record: NodeRecord) -> Result<(), DirectoryError> {
        tracing::debug!(node_id = record.node_id, address = %record.address, "node registered");
        self.insert(record);
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, DirectoryError> {
        Ok(self.snapshot())
    }
}
