//! Unit reassembly — collects chunks until a payload unit is whole.
//!
//! Buffers are keyed by `(origin, sequence)` and destroyed the instant the
//! unit completes. Incomplete buffers are aged out so a unit that never
//! completes cannot leak memory.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;

use crate::codec::WireChunk;
use crate::unit::{PayloadUnit, UnitKey, UnitKind};

pub struct UnitReassembler {
    active: Mutex<HashMap<UnitKey, Assembly>>,
    timeout: Duration,
}

struct Assembly {
    kind: UnitKind,
    total_chunks: u32,
    chunks: HashMap<u32, Bytes>,
    started_at: Instant,
}

impl UnitReassembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Insert one chunk. Returns the completed unit once all
    /// `total_chunks` indices are present, in any arrival order.
    ///
    /// A duplicate index overwrites idempotently — never an error. A chunk
    /// whose `total_chunks` disagrees with the existing buffer for the same
    /// key is dropped; the first arrival fixed the unit's shape.
    pub async fn accept(&self, chunk: WireChunk) -> Option<PayloadUnit> {
        let key: UnitKey = (chunk.header.origin_id, chunk.header.sequence);
        let index = chunk.header.chunk_index;
        let total = chunk.header.total_chunks;
        let kind = chunk.kind();

        let mut active = self.active.lock().await;
        self.cleanup_stale(&mut active);

        let assembly = active.entry(key).or_insert_with(|| Assembly {
            kind,
            total_chunks: total,
            chunks: HashMap::new(),
            started_at: Instant::now(),
        });

        if assembly.total_chunks != total {
            tracing::warn!(
                origin = %hex::encode(&key.0[..8]),
                sequence = key.1,
                expected = assembly.total_chunks,
                got = total,
                "chunk disagrees on total count, dropping"
            );
            return None;
        }

        assembly.chunks.insert(index, chunk.bytes);

        if assembly.chunks.len() < assembly.total_chunks as usize {
            return None;
        }

        // complete: concatenate in index order and destroy the buffer
        let assembly = active.remove(&key).expect("assembly present");
        let mut bytes = BytesMut::with_capacity(
            assembly.chunks.values().map(|b| b.len()).sum(),
        );
        for index in 0..assembly.total_chunks {
            bytes.extend_from_slice(&assembly.chunks[&index]);
        }

        Some(PayloadUnit {
            origin: key.0,
            sequence: key.1,
            kind: assembly.kind,
            bytes: bytes.freeze(),
        })
    }

    /// Number of units currently mid-reassembly.
    pub async fn in_progress(&self) -> usize {
        self.active.lock().await.len()
    }

    fn cleanup_stale(&self, active: &mut HashMap<UnitKey, Assembly>) {
        let timeout = self.timeout;
        active.retain(|key, assembly| {
            let stale = assembly.started_at.elapsed() > timeout;
            if stale {
                tracing::warn!(
                    origin = %hex::encode(&key.0[..8]),
                    sequence = key.1,
                    received = assembly.chunks.len(),
                    total = assembly.total_chunks,
                    "discarding stale reassembly buffer"
                );
            }
            !stale
        });
    }
}
