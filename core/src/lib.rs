// OnionNet Core: three-hop onion routing
//
// Circuit builder and relay peeling engine over a hybrid per-hop cipher.
// The node directory and the byte transport are seams (`Directory`,
// `Transport`); concrete HTTP implementations live in the CLI crate.

pub mod crypto;
pub mod directory;
pub mod onion;
pub mod transport;

pub use crypto::{CryptoError, RelayKeyPair, SymmetricKey, WRAPPED_KEY_LEN};
pub use directory::{Directory, DirectoryError, NodeId, NodeRecord, NodeRegistry};
pub use onion::{
    build_circuit, build_onion, peel_layer, send_onion, Address, Circuit, Onion, OnionError,
    PeeledLayer, Relay, SentOnion, ADDRESS_WIDTH, CIRCUIT_LENGTH,
};
pub use transport::{MemoryTransport, Transport, TransportError, MAX_ENVELOPE_SIZE};
