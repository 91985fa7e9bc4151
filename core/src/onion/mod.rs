// Onion routing: layered encryption over fixed-length relay circuits
//
// Each layer reveals only the next hop to the relay that peels it, so no
// single relay sees both where a message came from and where it ends up.

pub mod builder;
pub mod circuit;
pub mod codec;
pub mod error;
pub mod peel;
pub mod sender;

pub use builder::{build_onion, Onion};
pub use circuit::{build_circuit, Circuit, CIRCUIT_LENGTH};
pub use codec::{decode_layer, encode_layer, join_envelope, split_envelope, Address, ADDRESS_WIDTH};
pub use error::OnionError;
pub use peel::{peel_layer, PeeledLayer, Relay};
pub use sender::{send_onion, SentOnion};
