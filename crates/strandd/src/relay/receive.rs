//! Inbound chunk loop — parse, validate, reassemble, hand off.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use strand_services::{PayloadUnit, UnitReassembler, WireChunk};
use strand_core::wire::{HEADER_LEN, MAX_CHUNK_PAYLOAD};

pub async fn receive_loop(
    socket: Arc<UdpSocket>,
    reassembler: Arc<UnitReassembler>,
    unit_tx: mpsc::Sender<PayloadUnit>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; HEADER_LEN + MAX_CHUNK_PAYLOAD];

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("chunk receiver shutting down");
                return Ok(());
            }

            result = socket.recv_from(&mut buf) => {
                let (len, from) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "recv_from failed");
                        continue;
                    }
                };

                let chunk = match WireChunk::decode(&buf[..len]) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "malformed chunk datagram, discarding");
                        continue;
                    }
                };

                // copy packed fields to locals before logging
                let sequence = chunk.header.sequence;
                let index = chunk.header.chunk_index;
                let total = chunk.header.total_chunks;
                tracing::trace!(
                    %from,
                    origin = %hex::encode(&chunk.header.origin_id[..8]),
                    sequence,
                    index,
                    total,
                    "chunk received"
                );

                if let Some(unit) = reassembler.accept(chunk).await {
                    tracing::debug!(
                        origin = %hex::encode(&unit.origin[..8]),
                        sequence = unit.sequence,
                        bytes = unit.bytes.len(),
                        "unit reassembled"
                    );
                    if unit_tx.send(unit).await.is_err() {
                        bail!("forward engine dropped, terminating receive loop");
                    }
                }
            }
        }
    }
}
