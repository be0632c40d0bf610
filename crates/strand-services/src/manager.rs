//! Connection management — serialize handshake attempts per neighbor.
//!
//! The per-neighbor attempt lock is the only handshake serialization point
//! in a node: concurrent triggers (coordinator retargets, lazy connects from
//! the forwarding engine) collapse into a single offer on the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::link::{Link, LinkError, LinkState, LinkTable};

/// The seam to the control plane: how an offer leaves the node.
/// strandd implements this over its coordinator connection; tests use fakes.
pub trait Signaler: Send + Sync {
    fn send_offer(&self, to: &str) -> Result<(), LinkError>;
}

pub struct ConnectionManager {
    self_name: String,
    links: LinkTable,
    signaler: Arc<dyn Signaler>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        self_name: String,
        links: LinkTable,
        signaler: Arc<dyn Signaler>,
        connect_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            self_name,
            links,
            signaler,
            connect_timeout,
        })
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Coordinator retarget handler. Fire-and-forget: the handshake wait
    /// runs on its own task so the caller (the control dispatcher, which
    /// also delivers the answer) is never blocked.
    ///
    /// No-ops: the neighbor is self, the link is already connected or
    /// connecting, or another attempt holds the lock.
    pub fn on_neighbor_update(self: Arc<Self>, next: &str) {
        if next == self.self_name {
            return;
        }
        let link = self.links.link(next);
        match link.state() {
            LinkState::Connected(_) | LinkState::Connecting => return,
            LinkState::Idle | LinkState::Failed => {}
        }
        if link.attempt.try_lock().is_err() {
            return;
        }

        let peer = next.to_string();
        tokio::spawn(async move {
            if let Err(e) = self.ensure_connected(&peer).await {
                tracing::warn!(%peer, error = %e, "neighbor connect failed");
            }
        });
    }

    /// Connect-on-demand. Returns the neighbor's payload endpoint once the
    /// link is Connected, racing nothing: either this call owns the attempt
    /// or it waits on the owner's outcome.
    pub async fn ensure_connected(&self, peer: &str) -> Result<SocketAddr, LinkError> {
        if peer == self.self_name {
            return Err(LinkError::SelfLink(peer.to_string()));
        }
        let link = self.links.link(peer);
        if let Some(addr) = link.connected_endpoint() {
            return Ok(addr);
        }

        let result = match link.attempt.try_lock() {
            Ok(_guard) => {
                link.set_connecting();
                tracing::debug!(peer, "sending offer");
                if let Err(e) = self.signaler.send_offer(peer) {
                    link.fail();
                    return Err(e);
                }
                match self.wait_connected(peer, &link).await {
                    Ok(addr) => Ok(addr),
                    Err(e @ LinkError::SignalerClosed) => {
                        link.fail();
                        Err(e)
                    }
                    Err(e) => {
                        // close the channel, return to a retryable state
                        link.reset();
                        Err(e)
                    }
                }
            }
            // another attempt is in flight, wait for its outcome
            Err(_) => self.wait_connected(peer, &link).await,
        };
        result
    }

    async fn wait_connected(&self, peer: &str, link: &Arc<Link>) -> Result<SocketAddr, LinkError> {
        let mut rx = link.subscribe();
        let wait = rx.wait_for(|s| matches!(s, LinkState::Connected(_)));
        let result = match tokio::time::timeout(self.connect_timeout, wait).await {
            Ok(Ok(state)) => match &*state {
                LinkState::Connected(addr) => Ok(*addr),
                _ => unreachable!("wait_for admits only Connected"),
            },
            Ok(Err(_)) => Err(LinkError::SignalerClosed),
            Err(_) => Err(LinkError::ConnectTimeout {
                peer: peer.to_string(),
                secs: self.connect_timeout.as_secs(),
            }),
        };
        result
    }
}
