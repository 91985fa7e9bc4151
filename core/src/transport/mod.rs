//! Transport seam for moving envelopes between hops
//!
//! The onion core treats delivery as a black box: one `send` per hop,
//! at-most-once, with failures reported synchronously to the caller.

use crate::onion::codec::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use thiserror::Error;

/// Largest envelope any transport is expected to carry: 256 KB
pub const MAX_ENVELOPE_SIZE: usize = 256 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Could not reach {address}: {reason}")]
    Unreachable { address: Address, reason: String },
    #[error("{address} rejected delivery with status {status}: {body}")]
    Rejected {
        address: Address,
        status: u16,
        body: String,
    },
    #[error("Payload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

/// Request/response delivery of opaque bytes to an address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `bytes` to `address` and return the receiver's response body.
    async fn send(&self, address: Address, bytes: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// A single recorded delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub address: Address,
    pub bytes: Vec<u8>,
}

/// In-process transport that records deliveries instead of sending them.
///
/// Used to drive multi-hop simulations without sockets: the caller drains
/// the recorded deliveries and hands each one to whichever node owns the
/// address.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    deliveries: Mutex<Vec<Delivery>>,
    unreachable: HashSet<Address>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to `address` fail with `Unreachable`
    pub fn with_unreachable(mut self, address: Address) -> Self {
        self.unreachable.insert(address);
        self
    }

    /// Remove and return everything delivered so far, oldest first
    pub fn take_deliveries(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.deliveries.lock())
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, address: Address, bytes: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if self.unreachable.contains(&address) {
            return Err(TransportError::Unreachable {
                address,
                reason: "marked unreachable".to_string(),
            });
        }
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(TransportError::TooLarge {
                size: bytes.len(),
                max: MAX_ENVELOPE_SIZE,
            });
        }

        tracing::trace!(%address, bytes = bytes.len(), "memory transport delivery");
        self.deliveries.lock().push(Delivery { address, bytes });
        Ok(Vec::new())
    }
}
