//! strand-services — relay state machinery shared by the node daemon.
//!
//! Chunk codec, reassembly buffers, the dedup window, the replicated chain
//! assignment, the per-neighbor link table, and the pending-event queue.
//! Everything here is transport-free: sockets and the coordinator connection
//! live in strandd.

pub mod chain;
pub mod codec;
pub mod dedup;
pub mod link;
pub mod manager;
pub mod pending;
pub mod reassembly;
pub mod unit;

pub use chain::{ChainState, NameRegistry};
pub use codec::{split_unit, WireChunk};
pub use dedup::DedupWindow;
pub use link::{Link, LinkError, LinkState, LinkTable};
pub use manager::{ConnectionManager, Signaler};
pub use pending::PendingEvents;
pub use reassembly::UnitReassembler;
pub use unit::{PayloadUnit, UnitKey, UnitKind};
