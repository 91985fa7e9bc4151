// Per-node activity records backing the inspection endpoints
//
// Each node owns one of these behind an `Arc`; handlers update it after
// every request. Nothing here is read by the routing path.

use onionnet_core::{Address, NodeId, PeeledLayer};
use parking_lot::RwLock;
use serde::Serialize;

/// JSON shape shared by every inspection endpoint
#[derive(Debug, Serialize)]
pub struct ResultResponse<T: Serialize> {
    pub result: Option<T>,
}

#[derive(Debug, Default, Clone)]
struct RelaySnapshot {
    last_encrypted: Option<Vec<u8>>,
    last_decrypted: Option<Vec<u8>>,
    last_destination: Option<Address>,
}

/// What a relay last received and where it sent it
#[derive(Debug, Default)]
pub struct RelayActivity {
    inner: RwLock<RelaySnapshot>,
}

impl RelayActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an envelope as it arrives, before peeling
    pub fn record_received(&self, envelope: &[u8]) {
        let mut inner = self.inner.write();
        inner.last_encrypted = Some(envelope.to_vec());
        inner.last_decrypted = None;
        inner.last_destination = None;
    }

    pub fn record_peeled(&self, peeled: &PeeledLayer) {
        let mut inner = self.inner.write();
        inner.last_decrypted = Some(peeled.remainder.clone());
        inner.last_destination = Some(peeled.next_hop);
    }

    pub fn last_encrypted_hex(&self) -> Option<String> {
        self.inner.read().last_encrypted.as_ref().map(hex::encode)
    }

    pub fn last_decrypted_hex(&self) -> Option<String> {
        self.inner.read().last_decrypted.as_ref().map(hex::encode)
    }

    pub fn last_destination(&self) -> Option<Address> {
        self.inner.read().last_destination
    }
}

#[derive(Debug, Default, Clone)]
struct UserSnapshot {
    last_received: Option<String>,
    last_sent: Option<String>,
    last_circuit: Option<Vec<NodeId>>,
}

/// A user's last delivered and last sent messages
#[derive(Debug, Default)]
pub struct UserActivity {
    inner: RwLock<UserSnapshot>,
}

impl UserActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, payload: &[u8]) {
        self.inner.write().last_received = Some(String::from_utf8_lossy(payload).into_owned());
    }

    pub fn record_sent(&self, message: &str, circuit: Vec<NodeId>) {
        let mut inner = self.inner.write();
        inner.last_sent = Some(message.to_string());
        inner.last_circuit = Some(circuit);
    }

    pub fn last_received(&self) -> Option<String> {
        self.inner.read().last_received.clone()
    }

    pub fn last_sent(&self) -> Option<String> {
        self.inner.read().last_sent.clone()
    }

    pub fn last_circuit(&self) -> Option<Vec<NodeId>> {
        self.inner.read().last_circuit.clone()
    }
}
