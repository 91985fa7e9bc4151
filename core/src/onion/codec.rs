// Envelope Codec: fixed-width layer framing and the two-part wire format
//
// Layer content (before encryption):
//   address_field (ADDRESS_WIDTH ASCII digits, left-padded with '0') || remainder
//
// Envelope (on the wire):
//   wrapped_key_segment (WRAPPED_KEY_LEN) || iv (IV_LEN) || ciphertext
//
// ADDRESS_WIDTH is a protocol constant shared by builder and peeler. Any
// disagreement shifts every later segment boundary.

use super::error::OnionError;
use crate::crypto::WRAPPED_KEY_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const fn decimal_width(mut value: u64) -> usize {
    let mut width = 1;
    while value >= 10 {
        value /= 10;
        width += 1;
    }
    width
}

/// Width of the address field: enough digits for any `u32` address.
pub const ADDRESS_WIDTH: usize = decimal_width(u32::MAX as u64);

/// Byte used to left-pad the address field
const ADDRESS_PAD: u8 = b'0';

/// Transport-level address of a hop or final recipient (the port number in
/// the HTTP deployment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(u32);

impl Address {
    pub const fn new(value: u32) -> Self {
        Address(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Fixed-width, zero-padded decimal form used inside a layer
    pub fn to_field(self) -> [u8; ADDRESS_WIDTH] {
        let digits = format!("{:0width$}", self.0, width = ADDRESS_WIDTH);
        let mut field = [ADDRESS_PAD; ADDRESS_WIDTH];
        field.copy_from_slice(digits.as_bytes());
        field
    }

    /// Parse an address field produced by [`Address::to_field`]
    pub fn from_field(field: &[u8]) -> Result<Self, OnionError> {
        if field.len() != ADDRESS_WIDTH {
            return Err(OnionError::MalformedFrame(format!(
                "address field is {} bytes, expected {}",
                field.len(),
                ADDRESS_WIDTH
            )));
        }
        if !field.iter().all(u8::is_ascii_digit) {
            return Err(OnionError::MalformedFrame(
                "address field contains non-digit bytes".to_string(),
            ));
        }

        // All-digit input of this width only fails to parse on u32 overflow
        let text = std::str::from_utf8(field)
            .map_err(|_| OnionError::MalformedFrame("address field is not ASCII".to_string()))?;
        text.parse::<u32>()
            .map(Address)
            .map_err(|_| OnionError::MalformedFrame(format!("address {} out of range", text)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Address {
    fn from(port: u16) -> Self {
        Address(u32::from(port))
    }
}

impl FromStr for Address {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Address)
    }
}

/// Frame one layer: `pad(next_hop) || inner`
pub fn encode_layer(next_hop: Address, inner: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ADDRESS_WIDTH + inner.len());
    frame.extend_from_slice(&next_hop.to_field());
    frame.extend_from_slice(inner);
    frame
}

/// Split a layer into its next-hop address and the opaque remainder
pub fn decode_layer(frame: &[u8]) -> Result<(Address, &[u8]), OnionError> {
    if frame.len() < ADDRESS_WIDTH {
        return Err(OnionError::MalformedFrame(format!(
            "layer is {} bytes, shorter than the {}-byte address field",
            frame.len(),
            ADDRESS_WIDTH
        )));
    }

    let (field, remainder) = frame.split_at(ADDRESS_WIDTH);
    let address = Address::from_field(field)?;
    Ok((address, remainder))
}

/// Join the wrapped key and the symmetric blob into one envelope
pub fn join_envelope(wrapped_key: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(wrapped_key.len() + ciphertext.len());
    envelope.extend_from_slice(wrapped_key);
    envelope.extend_from_slice(ciphertext);
    envelope
}

/// Split an envelope at the fixed wrapped-key length
pub fn split_envelope(envelope: &[u8]) -> Result<(&[u8], &[u8]), OnionError> {
    if envelope.len() < WRAPPED_KEY_LEN {
        return Err(OnionError::MalformedFrame(format!(
            "envelope is {} bytes, shorter than the {}-byte wrapped key",
            envelope.len(),
            WRAPPED_KEY_LEN
        )));
    }
    Ok(envelope.split_at(WRAPPED_KEY_LEN))
}
