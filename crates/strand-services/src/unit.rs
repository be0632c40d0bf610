//! Payload unit types — the logical unit a strand relays.

use bytes::Bytes;
use strand_core::wire::{OriginId, TAG_STREAM_END, TAG_UNIT_DATA};

/// Identity of a unit across retransmission and duplication.
pub type UnitKey = (OriginId, u64);

/// What a unit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Ordinary payload (one video frame, one message).
    Data,
    /// End-of-stream marker for the origin. Carries no bytes; rides the
    /// same dedup/forward path as data so termination reaches every
    /// downstream node exactly once.
    StreamEnd,
}

impl UnitKind {
    pub fn type_tag(self) -> u16 {
        match self {
            UnitKind::Data => TAG_UNIT_DATA,
            UnitKind::StreamEnd => TAG_STREAM_END,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            TAG_UNIT_DATA => Some(UnitKind::Data),
            TAG_STREAM_END => Some(UnitKind::StreamEnd),
            _ => None,
        }
    }
}

/// One logical unit in transit through a node.
#[derive(Debug, Clone)]
pub struct PayloadUnit {
    pub origin: OriginId,
    pub sequence: u64,
    pub kind: UnitKind,
    pub bytes: Bytes,
}

impl PayloadUnit {
    pub fn data(origin: OriginId, sequence: u64, bytes: Bytes) -> Self {
        Self {
            origin,
            sequence,
            kind: UnitKind::Data,
            bytes,
        }
    }

    pub fn stream_end(origin: OriginId, sequence: u64) -> Self {
        Self {
            origin,
            sequence,
            kind: UnitKind::StreamEnd,
            bytes: Bytes::new(),
        }
    }

    /// The dedup key.
    pub fn key(&self) -> UnitKey {
        (self.origin, self.sequence)
    }
}
