//! Coordinator client — registration, the control event dispatcher, and the
//! outbound writer.
//!
//! One TCP connection per node carries the whole control plane as
//! line-delimited JSON. Inbound lines are routed by message type through a
//! single dispatcher; events that arrive before the node's local
//! prerequisites are met are queued and replayed in arrival order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use strand_core::control::{ControlMessage, HandshakePayload, PeerIdentity};
use strand_services::{
    ChainState, ConnectionManager, LinkError, LinkTable, NameRegistry, PendingEvents, Signaler,
};

use crate::handshake;

/// How long registration may take before the node gives up.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a successful registration.
pub struct Registration {
    pub prev: Option<PeerIdentity>,
    pub control_endpoint: SocketAddr,
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

/// Connect to the coordinator and register. A collision or malformed-request
/// error from the coordinator is fatal and never retried automatically.
pub async fn register(
    coordinator: &str,
    name: &str,
    payload_endpoint: SocketAddr,
    strand: &str,
) -> Result<Registration> {
    let stream = TcpStream::connect(coordinator)
        .await
        .with_context(|| format!("failed to connect to coordinator at {coordinator}"))?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let register = ControlMessage::Register {
        name: name.to_string(),
        payload_endpoint,
        strand: strand.to_string(),
    };
    let mut line = register.to_line()?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("failed to send registration")?;

    let mut reply = String::new();
    let n = tokio::time::timeout(REGISTER_TIMEOUT, reader.read_line(&mut reply))
        .await
        .context("timed out waiting for registration reply")?
        .context("coordinator closed during registration")?;
    if n == 0 {
        bail!("coordinator closed during registration");
    }

    match ControlMessage::from_line(reply.trim_end()).context("malformed registration reply")? {
        ControlMessage::RegisterAck {
            prev,
            control_endpoint,
        } => {
            tracing::info!(
                name,
                prev = prev.as_ref().map(|p| p.name.as_str()).unwrap_or("NONE"),
                %control_endpoint,
                "registered with coordinator"
            );
            Ok(Registration {
                prev,
                control_endpoint,
                reader,
                writer,
            })
        }
        ControlMessage::Error { message } => bail!("registration rejected: {message}"),
        other => bail!("unexpected registration reply: {other:?}"),
    }
}

/// Signaler over the coordinator connection: offers leave through the
/// outbound writer queue.
pub struct ControlSignaler {
    pub self_name: String,
    pub payload_endpoint: SocketAddr,
    pub control_tx: mpsc::UnboundedSender<ControlMessage>,
}

impl Signaler for ControlSignaler {
    fn send_offer(&self, to: &str) -> Result<(), LinkError> {
        let offer = ControlMessage::Offer {
            from: self.self_name.clone(),
            to: to.to_string(),
            payload: HandshakePayload {
                endpoint: self.payload_endpoint,
            }
            .to_value(),
        };
        self.control_tx
            .send(offer)
            .map_err(|_| LinkError::SignalerClosed)
    }
}

/// Routes inbound control messages. Handlers are synchronous; anything
/// long-running (the handshake wait) is spawned by the connection manager
/// so the dispatcher can keep delivering the answers those waits depend on.
pub struct Dispatcher {
    pub self_name: String,
    pub payload_endpoint: SocketAddr,
    pub chain: ChainState,
    pub registry: NameRegistry,
    pub links: LinkTable,
    pub manager: Arc<ConnectionManager>,
    pub control_tx: mpsc::UnboundedSender<ControlMessage>,
    pending: PendingEvents<ControlMessage>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_name: String,
        payload_endpoint: SocketAddr,
        chain: ChainState,
        registry: NameRegistry,
        links: LinkTable,
        manager: Arc<ConnectionManager>,
        control_tx: mpsc::UnboundedSender<ControlMessage>,
    ) -> Self {
        Self {
            self_name,
            payload_endpoint,
            chain,
            registry,
            links,
            manager,
            control_tx,
            pending: PendingEvents::new(),
        }
    }

    /// Accept one inbound message: process it when the node is ready,
    /// queue it otherwise.
    pub fn admit(&self, msg: ControlMessage) {
        if let Some(msg) = self.pending.admit(msg) {
            self.handle(msg);
        }
    }

    /// Local prerequisites are met — replay everything held back, in
    /// arrival order, through the same handler.
    pub fn mark_ready(&self) {
        let held = self.pending.mark_ready();
        if !held.is_empty() {
            tracing::info!(count = held.len(), "replaying queued control events");
        }
        for msg in held {
            self.handle(msg);
        }
    }

    fn handle(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::NewPeer { name } => {
                tracing::debug!(peer = %name, "peer joined strand");
                self.registry.record(&name);
            }

            ControlMessage::UpdateNext { node, next } => {
                if node != self.self_name {
                    tracing::warn!(%node, "UPDATE_NEXT addressed to another node, ignoring");
                    return;
                }
                let old = self.chain.set_next(next.clone());
                tracing::info!(
                    old = old.as_ref().map(|p| p.name.as_str()).unwrap_or("NONE"),
                    new = next.as_ref().map(|p| p.name.as_str()).unwrap_or("NONE"),
                    "downstream neighbor updated"
                );
                if let Some(next) = next {
                    self.registry.record(&next.name);
                    self.manager.clone().on_neighbor_update(&next.name);
                }
            }

            ControlMessage::Offer { from, to, payload } => {
                if to != self.self_name {
                    tracing::warn!(%from, %to, "misrouted offer, ignoring");
                    return;
                }
                self.registry.record(&from);
                handshake::on_offer(
                    &self.links,
                    &from,
                    &payload,
                    &self.self_name,
                    self.payload_endpoint,
                    &self.control_tx,
                );
            }

            ControlMessage::Answer { from, to, payload } => {
                if to != self.self_name {
                    tracing::warn!(%from, %to, "misrouted answer, ignoring");
                    return;
                }
                handshake::on_answer(&self.links, &from, &payload);
            }

            ControlMessage::Candidate { from, to, payload } => {
                if to != self.self_name {
                    tracing::warn!(%from, %to, "misrouted candidate, ignoring");
                    return;
                }
                handshake::on_candidate(&self.links, &from, &payload);
            }

            ControlMessage::Error { message } => {
                tracing::warn!(%message, "error from coordinator");
            }

            other => {
                tracing::warn!(?other, "unexpected control message at node, dropping");
            }
        }
    }
}

/// Read loop: one JSON line per control message. Malformed lines are
/// dropped and logged, never fatal.
pub async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("control reader shutting down");
                return Ok(());
            }

            n = reader.read_line(&mut line) => {
                let n = n.context("control connection read failed")?;
                if n == 0 {
                    bail!("coordinator closed the control connection");
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                match ControlMessage::from_line(trimmed) {
                    Ok(msg) => dispatcher.admit(msg),
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed control line, dropping");
                    }
                }
            }
        }
    }
}

/// Write loop: drains the outbound queue onto the coordinator connection.
pub async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("control writer shutting down");
                return Ok(());
            }

            msg = control_rx.recv() => {
                let Some(msg) = msg else {
                    tracing::info!("control queue closed, writer exiting");
                    return Ok(());
                };
                let mut line = msg.to_line().context("control message serialization")?;
                line.push('\n');
                writer
                    .write_all(line.as_bytes())
                    .await
                    .context("control connection write failed")?;
            }
        }
    }
}
