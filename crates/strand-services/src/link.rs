//! Per-neighbor link tracking.
//!
//! One Link exists per (local node, neighbor name) pair, created Idle on the
//! first mention of the neighbor. State transitions are published on a watch
//! channel so connect-on-demand callers block on the transition itself
//! instead of polling for readiness.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{watch, Mutex};

/// Connection lifecycle for one neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected(SocketAddr),
    Failed,
}

/// Errors surfaced by connection management.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("handshake with {peer} did not complete within {secs}s")]
    ConnectTimeout { peer: String, secs: u64 },

    #[error("refusing to open a link to self ({0})")]
    SelfLink(String),

    #[error("signaling path to coordinator is closed")]
    SignalerClosed,
}

/// The single channel handle for one neighbor.
pub struct Link {
    state_tx: watch::Sender<LinkState>,
    /// Exclusive handshake attempt lock. Held for the duration of one
    /// offer/answer exchange; `Connecting` implies it is held.
    pub attempt: Mutex<()>,
    remote: std::sync::Mutex<Remote>,
}

#[derive(Default)]
struct Remote {
    primary: Option<SocketAddr>,
    candidates: Vec<SocketAddr>,
}

impl Link {
    fn new() -> Arc<Self> {
        let (state_tx, _) = watch::channel(LinkState::Idle);
        Arc::new(Self {
            state_tx,
            attempt: Mutex::new(()),
            remote: std::sync::Mutex::new(Remote::default()),
        })
    }

    pub fn state(&self) -> LinkState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    pub fn connected_endpoint(&self) -> Option<SocketAddr> {
        match self.state() {
            LinkState::Connected(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn set_connecting(&self) {
        self.state_tx.send_replace(LinkState::Connecting);
    }

    /// Open the channel: record the peer's endpoint (when the handshake
    /// message carried one) and transition to Connected, waking all waiters.
    /// Falls back to a previously applied candidate endpoint.
    pub fn open(&self, endpoint: Option<SocketAddr>) -> Option<SocketAddr> {
        let resolved = {
            let mut remote = self.remote.lock().expect("remote lock");
            if let Some(addr) = endpoint {
                remote.primary = Some(addr);
            }
            remote.primary.or_else(|| remote.candidates.first().copied())
        };
        if let Some(addr) = resolved {
            self.state_tx.send_replace(LinkState::Connected(addr));
        }
        resolved
    }

    /// Apply an auxiliary connectivity hint. Order-independent: with no
    /// primary endpoint yet, the candidate is promoted; otherwise it is
    /// kept as an alternate.
    pub fn apply_candidate(&self, addr: SocketAddr) {
        let mut remote = self.remote.lock().expect("remote lock");
        if remote.primary.is_none() {
            remote.primary = Some(addr);
        } else if remote.primary != Some(addr) && !remote.candidates.contains(&addr) {
            remote.candidates.push(addr);
        }
    }

    /// Close the channel and return to a retryable state.
    pub fn reset(&self) {
        *self.remote.lock().expect("remote lock") = Remote::default();
        self.state_tx.send_replace(LinkState::Idle);
    }

    /// Close the channel after a non-retryable error (the signaling path to
    /// the coordinator is gone). A later coordination event may still reset
    /// the link if the control plane comes back.
    pub fn fail(&self) {
        *self.remote.lock().expect("remote lock") = Remote::default();
        self.state_tx.send_replace(LinkState::Failed);
    }
}

/// All links of one node, keyed by neighbor name.
///
/// Invariant: at most one Link per pair — the table entry IS the channel,
/// so concurrent handshakes cannot produce two.
#[derive(Clone, Default)]
pub struct LinkTable {
    links: Arc<DashMap<String, Arc<Link>>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The link for a neighbor, created Idle on first mention.
    pub fn link(&self, peer: &str) -> Arc<Link> {
        self.links
            .entry(peer.to_string())
            .or_insert_with(Link::new)
            .clone()
    }

    /// The link only if the neighbor has been mentioned before.
    pub fn get(&self, peer: &str) -> Option<Arc<Link>> {
        self.links.get(peer).map(|l| l.clone())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
