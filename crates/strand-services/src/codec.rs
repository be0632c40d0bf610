//! Chunk codec — split a payload unit into bounded datagrams and decode
//! datagrams back into validated chunks.

use bytes::Bytes;
use zerocopy::{AsBytes, FromBytes};

use strand_core::wire::{
    ChunkHeader, WireError, CHUNK_VERSION, HEADER_LEN, MAX_CHUNK_PAYLOAD,
};

use crate::unit::{PayloadUnit, UnitKind};

/// One decoded (or to-be-sent) wire chunk: validated header plus payload.
#[derive(Debug, Clone)]
pub struct WireChunk {
    pub header: ChunkHeader,
    pub bytes: Bytes,
}

impl WireChunk {
    /// Frame as one datagram: header followed by payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bytes.len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    /// Parse and validate one datagram.
    ///
    /// Rejects truncated headers, unknown versions and type tags,
    /// out-of-range indices, and length mismatches. Malformed datagrams are
    /// for the caller to drop and log, never to crash on.
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        let header = ChunkHeader::read_from_prefix(datagram)
            .ok_or(WireError::TruncatedHeader(datagram.len()))?;

        if header.version != CHUNK_VERSION {
            return Err(WireError::UnknownVersion(header.version));
        }
        // packed fields — copy to locals before use
        let type_tag = header.type_tag;
        let chunk_index = header.chunk_index;
        let total_chunks = header.total_chunks;
        let length = header.length;

        if UnitKind::from_tag(type_tag).is_none() {
            return Err(WireError::UnknownTypeTag(type_tag));
        }
        if total_chunks == 0 || chunk_index >= total_chunks {
            return Err(WireError::ChunkIndexOutOfRange {
                index: chunk_index,
                total: total_chunks,
            });
        }

        let payload = &datagram[HEADER_LEN..];
        if payload.len() != length as usize || payload.len() > MAX_CHUNK_PAYLOAD {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }

        Ok(Self {
            header,
            bytes: Bytes::copy_from_slice(payload),
        })
    }

    pub fn kind(&self) -> UnitKind {
        // validated in decode; constructed from a UnitKind in split_unit
        UnitKind::from_tag(self.header.type_tag).expect("chunk carries a known tag")
    }
}

/// Split one unit into wire chunks, indices `0..total_chunks`.
///
/// `total_chunks = ceil(len / max_chunk_bytes)`; a unit with no bytes
/// (stream end, empty frame) still yields one empty chunk so it is
/// representable on the wire.
pub fn split_unit(unit: &PayloadUnit, max_chunk_bytes: usize) -> Result<Vec<WireChunk>, WireError> {
    let max = max_chunk_bytes.min(MAX_CHUNK_PAYLOAD).max(1);
    let total = unit.bytes.len().div_ceil(max).max(1) as u32;

    let mut chunks = Vec::with_capacity(total as usize);
    for index in 0..total {
        let start = index as usize * max;
        let end = (start + max).min(unit.bytes.len());
        let piece = unit.bytes.slice(start..end);

        chunks.push(WireChunk {
            header: ChunkHeader {
                origin_id: unit.origin,
                sequence: unit.sequence,
                chunk_index: index,
                total_chunks: total,
                length: piece.len() as u32,
                type_tag: unit.kind.type_tag(),
                flags: 0,
                version: CHUNK_VERSION,
            },
            bytes: piece,
        });
    }
    Ok(chunks)
}
