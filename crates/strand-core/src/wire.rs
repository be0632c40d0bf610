//! Strand wire format — the on-wire shape of the payload plane.
//!
//! Every field, every size, every reserved byte is part of the wire format;
//! changing anything here is a breaking change for deployed strands.
//!
//! All types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for safe, allocation-free serialization. There is no
//! unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Origin identity ──────────────────────────────────────────────────────────

/// Origin identifier — BLAKE3 hash of the originating peer's registered name.
/// Forms the dedup key together with the sequence number.
pub type OriginId = [u8; 32];

/// Compute an OriginId from a peer name.
/// The name is the protocol-level identity and must never change for a
/// registered peer.
pub fn origin_id(name: &str) -> OriginId {
    *blake3::hash(name.as_bytes()).as_bytes()
}

// ── Chunk Header ─────────────────────────────────────────────────────────────

/// The atomic unit of payload transmission.
///
/// A payload unit is split into bounded-size chunks, one UDP datagram per
/// chunk, each preceded by this header. The receiver can fully describe and
/// route a chunk before reading a single byte of payload.
///
/// Wire size: 56 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ChunkHeader {
    /// BLAKE3 hash of the origin peer's name.
    pub origin_id: OriginId,

    /// Sequence number of the payload unit at its origin.
    /// `(origin_id, sequence)` identifies the unit across retransmission
    /// and duplication.
    pub sequence: u64,

    /// Zero-based position of this chunk within the unit.
    pub chunk_index: u32,

    /// Total chunk count for the unit. A unit is complete when all indices
    /// `0..total_chunks` have arrived.
    pub total_chunks: u32,

    /// Length of the chunk payload in bytes, not including this header.
    /// Maximum: 65535 bytes. Larger units must be split by the sender.
    pub length: u32,

    /// Chunk kind — see the TAG_* constants. A receiver seeing an unknown
    /// tag silently drops the chunk.
    pub type_tag: u16,

    /// Bit flags. Reserved, must be zero.
    pub flags: u8,

    /// Wire format version. Currently 0x01.
    /// A receiver seeing an unknown version silently drops the chunk.
    pub version: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(ChunkHeader, [u8; 56]);

/// Header size in bytes, as sent on the wire.
pub const HEADER_LEN: usize = 56;

// ── Chunk kinds ──────────────────────────────────────────────────────────────

/// A fragment of an ordinary payload unit (one video frame, one message).
pub const TAG_UNIT_DATA: u16 = 1;

/// End-of-stream marker for one origin. Sent as a single empty chunk with
/// the origin's next sequence number so it rides the normal dedup/forward
/// path and reaches every downstream node exactly once.
pub const TAG_STREAM_END: u16 = 2;

// ── Constants ────────────────────────────────────────────────────────────────

/// Current chunk format version.
pub const CHUNK_VERSION: u8 = 0x01;

/// Maximum chunk payload size in bytes. Bounded by what fits a UDP datagram
/// alongside the header; units larger than this are split by the codec.
pub const MAX_CHUNK_PAYLOAD: usize = 65535;

/// Default split size used by the codec. Well under MAX_CHUNK_PAYLOAD to
/// leave headroom on links with smaller MTUs.
pub const DEFAULT_CHUNK_BYTES: usize = 32 * 1024;

/// Default neighbor handshake timeout in seconds.
/// An attempt that has not reached Connected within this window is aborted
/// and the link returns to Idle.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 15;

/// Default lifetime for an incomplete reassembly buffer in seconds.
pub const REASSEMBLY_TIMEOUT_SECS: u64 = 30;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown chunk type tag: 0x{0:04x}")]
    UnknownTypeTag(u16),

    #[error("unknown chunk version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("chunk payload length {0} exceeds maximum {}", MAX_CHUNK_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("datagram too short for chunk header: {0} bytes")]
    TruncatedHeader(usize),

    #[error("chunk index {index} out of range for total {total}")]
    ChunkIndexOutOfRange { index: u32, total: u32 },
}

// ── Tests ────────────────────────────────────────────────────────────────────
