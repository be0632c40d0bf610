//! Outbound chunk transmission — split, frame, send.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use strand_services::{codec::split_unit, PayloadUnit};

/// Send one unit to a neighbor's payload endpoint, re-chunked to the
/// configured chunk size.
pub async fn send_unit(
    socket: &Arc<UdpSocket>,
    peer_addr: SocketAddr,
    unit: &PayloadUnit,
    max_chunk_bytes: usize,
) -> Result<()> {
    let chunks = split_unit(unit, max_chunk_bytes).context("unit split failed")?;
    let total = chunks.len();

    for chunk in chunks {
        socket
            .send_to(&chunk.encode(), peer_addr)
            .await
            .context("failed to send chunk")?;
    }

    tracing::debug!(
        %peer_addr,
        origin = %hex::encode(&unit.origin[..8]),
        sequence = unit.sequence,
        chunks = total,
        bytes = unit.bytes.len(),
        "unit sent"
    );

    Ok(())
}
