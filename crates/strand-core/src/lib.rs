//! strand-core — wire format, control-plane schema, and configuration.
//! All other Strand crates depend on this one.

pub mod config;
pub mod control;
pub mod wire;

pub use control::{ControlMessage, PeerIdentity};
pub use wire::{origin_id, ChunkHeader, OriginId};
