// Sender side: directory lookup, circuit, onion, one send to the entry relay

use super::builder::build_onion;
use super::circuit::{build_circuit, Circuit, CIRCUIT_LENGTH};
use super::codec::Address;
use super::error::OnionError;
use crate::directory::Directory;
use crate::transport::Transport;

/// Outcome of a successful dispatch
#[derive(Debug, Clone)]
pub struct SentOnion {
    pub circuit: Circuit,
    /// Entry relay's response body
    pub response: Vec<u8>,
}

/// Onion-route `payload` to `final_address` over a fresh circuit.
///
/// Circuit and onion errors are returned before the transport is touched,
/// so a partial onion is never sent.
pub async fn send_onion(
    directory: &dyn Directory,
    transport: &dyn Transport,
    final_address: Address,
    payload: &[u8],
) -> Result<SentOnion, OnionError> {
    let nodes = directory.list_nodes().await?;
    let circuit = build_circuit(&nodes, CIRCUIT_LENGTH)?;
    let onion = build_onion(&circuit, final_address, payload)?;

    tracing::info!(
        entry = %onion.entry,
        circuit = ?circuit.node_ids(),
        bytes = onion.envelope.len(),
        "sending onion"
    );

    let response = transport.send(onion.entry, onion.envelope).await?;
    Ok(SentOnion { circuit, response })
}
