//! strandd — Strand relay node runtime.
//!
//! The binary wraps [`node::Node`]; the library surface exists so the
//! integration suite can run whole strands in one process over loopback.

pub mod control;
pub mod handshake;
pub mod node;
pub mod relay;
pub mod source;

pub use node::{Node, NodeHandle};
