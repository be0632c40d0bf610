//! Replicated chain assignment and the peer name registry.
//!
//! Neighbors are owned by the coordinator and pushed into this table via
//! control events; a node never computes its own position.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use strand_core::control::PeerIdentity;
use strand_core::wire::{origin_id, OriginId};

/// The node's current view of its strand neighbors.
#[derive(Clone, Default, Debug)]
pub struct ChainState {
    inner: Arc<RwLock<Assignment>>,
}

#[derive(Default, Debug)]
struct Assignment {
    prev: Option<PeerIdentity>,
    next: Option<PeerIdentity>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Option<PeerIdentity> {
        self.inner.read().expect("chain lock").next.clone()
    }

    pub fn prev(&self) -> Option<PeerIdentity> {
        self.inner.read().expect("chain lock").prev.clone()
    }

    /// Apply a coordinator retarget. Returns the previous downstream
    /// neighbor so callers can log the transition.
    pub fn set_next(&self, next: Option<PeerIdentity>) -> Option<PeerIdentity> {
        let mut inner = self.inner.write().expect("chain lock");
        std::mem::replace(&mut inner.next, next)
    }

    pub fn set_prev(&self, prev: Option<PeerIdentity>) {
        self.inner.write().expect("chain lock").prev = prev;
    }

    /// True when this node is the strand tail.
    pub fn is_tail(&self) -> bool {
        self.next().is_none()
    }
}

/// Maps origin ids back to registered peer names for operator-facing logs.
/// Populated from registration and NEW_PEER events.
#[derive(Clone, Default)]
pub struct NameRegistry {
    names: Arc<DashMap<OriginId, String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.names.insert(origin_id(name), name.to_string());
    }

    /// Peer name for an origin id, or a hex prefix when unknown.
    pub fn display(&self, origin: &OriginId) -> String {
        self.names
            .get(origin)
            .map(|n| n.clone())
            .unwrap_or_else(|| hex::encode(&origin[..8]))
    }
}
