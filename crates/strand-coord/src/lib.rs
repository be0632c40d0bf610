//! strand-coord — the rendezvous coordinator.
//!
//! Accepts peer registrations, owns chain order per strand, pushes neighbor
//! updates, and relays handshake messages between nodes. Nodes never compute
//! their own neighbors; every assignment originates here.

pub mod registry;
pub mod server;

pub use registry::{RegistryError, StrandRegistry};
pub use server::Coordinator;
