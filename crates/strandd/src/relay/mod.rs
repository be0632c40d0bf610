//! Payload relay — the data plane.
//!
//! Units arrive as UDP chunk datagrams, reassemble, pass the dedup gate
//! once, reach the local consumer, and leave re-chunked toward the current
//! downstream neighbor.

pub mod forward;
pub mod receive;
pub mod send;
