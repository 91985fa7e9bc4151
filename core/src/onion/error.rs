use crate::crypto::CryptoError;
use crate::directory::{DirectoryError, NodeId};
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OnionError {
    #[error("Not enough nodes for circuit: {available} available, {required} required")]
    InsufficientNodes { available: usize, required: usize },
    #[error("Invalid circuit length {0}")]
    InvalidCircuitLength(usize),
    #[error("Circuit visits node {node_id} more than once ({distinct} distinct of {hops} hops)")]
    RepeatedHop {
        node_id: NodeId,
        distinct: usize,
        hops: usize,
    },
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge { size: usize, max: usize },
}

impl OnionError {
    /// Key segment could not be unwrapped by this hop
    pub fn is_unwrap_error(&self) -> bool {
        matches!(self, OnionError::Crypto(CryptoError::Unwrap))
    }

    /// Layer ciphertext failed authentication or was malformed
    pub fn is_decrypt_error(&self) -> bool {
        matches!(self, OnionError::Crypto(CryptoError::Decrypt))
    }

    /// Errors caused by the bytes the sender or previous hop supplied
    pub fn is_bad_envelope(&self) -> bool {
        matches!(
            self,
            OnionError::MalformedFrame(_)
                | OnionError::Crypto(CryptoError::Unwrap)
                | OnionError::Crypto(CryptoError::Decrypt)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onion_error_display() {
        let err = OnionError::InsufficientNodes {
            available: 2,
            required: 3,
        };
        assert!(err.to_string().contains("2 available"));

        let err = OnionError::MalformedFrame("short".to_string());
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn test_error_classification() {
        assert!(OnionError::from(CryptoError::Unwrap).is_unwrap_error());
        assert!(OnionError::from(CryptoError::Decrypt).is_decrypt_error());
        assert!(OnionError::MalformedFrame(String::new()).is_bad_envelope());
        assert!(!OnionError::from(CryptoError::Encrypt).is_bad_envelope());
    }
}
