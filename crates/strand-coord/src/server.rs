//! Coordinator server — one TCP connection per node carries registration,
//! neighbor updates, and relayed handshake traffic as line-delimited JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use strand_core::control::{ControlMessage, PeerIdentity};

use crate::registry::{Joined, StrandRegistry};

/// How long a fresh connection has to present its registration.
const REGISTER_DEADLINE: Duration = Duration::from_secs(10);

struct Shared {
    registry: StrandRegistry,
    /// Peer name → outbox feeding its control connection.
    conns: DashMap<String, mpsc::UnboundedSender<ControlMessage>>,
    control_endpoint: SocketAddr,
}

#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Coordinator {
    /// Bind and start accepting nodes.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind coordinator on {addr}"))?;
        let control_endpoint = listener.local_addr()?;
        tracing::info!(%control_endpoint, "coordinator listening");

        let shared = Arc::new(Shared {
            registry: StrandRegistry::new(),
            conns: DashMap::new(),
            control_endpoint,
        });
        let (shutdown_tx, _) = broadcast::channel(1);

        let coordinator = Self {
            shared: shared.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("coordinator shutting down");
                        return;
                    }

                    accepted = listener.accept() => {
                        let (stream, peer_addr) = match accepted {
                            Ok(a) => a,
                            Err(e) => {
                                tracing::warn!(error = %e, "accept failed");
                                continue;
                            }
                        };
                        tracing::debug!(%peer_addr, "node connected");
                        let shared = shared.clone();
                        let shutdown = shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(shared, stream, shutdown).await {
                                tracing::debug!(%peer_addr, error = %e, "connection closed");
                            }
                        });
                    }
                }
            }
        });

        Ok(coordinator)
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.shared.control_endpoint
    }

    pub fn members(&self, strand: &str) -> Vec<String> {
        self.shared.registry.members(strand)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Serve one node: registration first, then route its traffic until the
/// connection drops, then stitch the chain around the departure.
async fn handle_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    // Registration
    let n = tokio::time::timeout(REGISTER_DEADLINE, reader.read_line(&mut line))
        .await
        .context("registration deadline passed")??;
    if n == 0 {
        return Ok(());
    }

    let (identity, strand) = match ControlMessage::from_line(line.trim_end()) {
        Ok(ControlMessage::Register {
            name,
            payload_endpoint,
            strand,
        }) => (
            PeerIdentity {
                name,
                payload_endpoint,
            },
            strand,
        ),
        Ok(other) => {
            send_line(
                &mut writer,
                &ControlMessage::Error {
                    message: format!("expected register, got {other:?}"),
                },
            )
            .await?;
            return Ok(());
        }
        Err(e) => {
            send_line(
                &mut writer,
                &ControlMessage::Error {
                    message: format!("malformed registration: {e}"),
                },
            )
            .await?;
            return Ok(());
        }
    };

    let name = identity.name.clone();
    let joined = match shared.registry.register(identity.clone(), &strand) {
        Ok(j) => j,
        Err(e) => {
            tracing::warn!(%name, error = %e, "registration rejected");
            send_line(
                &mut writer,
                &ControlMessage::Error {
                    message: e.to_string(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    tracing::info!(
        %name,
        %strand,
        endpoint = %identity.payload_endpoint,
        prev = joined.prev.as_ref().map(|p| p.name.as_str()).unwrap_or("NONE"),
        "peer registered"
    );

    // From here the peer is in the registry: whatever happens to the
    // connection, departure cleanup below must run.
    let result = serve_registered(
        &shared,
        &identity,
        &joined,
        &mut reader,
        &mut writer,
        &mut shutdown,
    )
    .await;

    shared.conns.remove(&name);
    if let Some(unlinked) = shared.registry.remove(&name) {
        tracing::info!(%name, "peer departed");
        if let Some(prev) = unlinked.prev {
            shared.push(
                &prev,
                ControlMessage::UpdateNext {
                    node: prev.clone(),
                    next: unlinked.new_next,
                },
            );
        }
    }

    result
}

/// Acknowledge, wire into the push fabric, fan out the join, serve.
async fn serve_registered(
    shared: &Arc<Shared>,
    identity: &PeerIdentity,
    joined: &Joined,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()> {
    let name = identity.name.as_str();

    send_line(
        writer,
        &ControlMessage::RegisterAck {
            prev: joined.prev.clone(),
            control_endpoint: shared.control_endpoint,
        },
    )
    .await?;

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ControlMessage>();
    shared.conns.insert(name.to_string(), outbox_tx);

    // NEW_PEER to everyone already on the strand, UPDATE_NEXT to the
    // predecessor whose downstream just changed.
    for other in &joined.others {
        shared.push(
            other,
            ControlMessage::NewPeer {
                name: name.to_string(),
            },
        );
    }
    if let Some(prev) = &joined.prev {
        shared.push(
            &prev.name,
            ControlMessage::UpdateNext {
                node: prev.name.clone(),
                next: Some(identity.clone()),
            },
        );
    }

    serve_peer(shared, name, reader, writer, &mut outbox_rx, shutdown).await
}

async fn serve_peer(
    shared: &Arc<Shared>,
    name: &str,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    outbox_rx: &mut mpsc::UnboundedReceiver<ControlMessage>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),

            msg = outbox_rx.recv() => {
                let Some(msg) = msg else { return Ok(()) };
                send_line(writer, &msg).await?;
            }

            n = reader.read_line(&mut line) => {
                let n = n.context("read failed")?;
                if n == 0 {
                    return Ok(()); // node hung up
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                match ControlMessage::from_line(trimmed) {
                    Ok(msg) => route(shared, name, msg),
                    Err(e) => {
                        tracing::warn!(peer = %name, error = %e, "malformed control line, dropping");
                    }
                }
            }
        }
    }
}

/// Route one inbound message from a registered node.
fn route(shared: &Arc<Shared>, from_conn: &str, msg: ControlMessage) {
    match msg {
        ControlMessage::Offer { from, to, payload } => {
            relay(shared, from_conn, ControlMessage::Offer { from, to, payload });
        }
        ControlMessage::Answer { from, to, payload } => {
            relay(shared, from_conn, ControlMessage::Answer { from, to, payload });
        }
        ControlMessage::Candidate { from, to, payload } => {
            relay(shared, from_conn, ControlMessage::Candidate { from, to, payload });
        }

        ControlMessage::StreamComplete { origin } => {
            tracing::info!(tail = %from_conn, %origin, "stream fully delivered");
        }

        other => {
            tracing::warn!(peer = %from_conn, ?other, "unexpected message, dropping");
        }
    }
}

/// Deliver a handshake message to its addressee; tell the sender when the
/// addressee is unknown.
fn relay(shared: &Arc<Shared>, from_conn: &str, msg: ControlMessage) {
    let (to, kind) = match &msg {
        ControlMessage::Offer { to, .. } => (to.clone(), "offer"),
        ControlMessage::Answer { to, .. } => (to.clone(), "answer"),
        ControlMessage::Candidate { to, .. } => (to.clone(), "candidate"),
        _ => unreachable!("relay only sees handshake messages"),
    };

    if shared.push(&to, msg) {
        tracing::debug!(from = %from_conn, %to, kind, "relayed");
    } else {
        tracing::warn!(from = %from_conn, %to, kind, "addressee unknown");
        shared.push(
            from_conn,
            ControlMessage::Error {
                message: format!("no peer named '{to}'"),
            },
        );
    }
}

impl Shared {
    /// Push a message into a peer's outbox. False when the peer is gone.
    fn push(&self, to: &str, msg: ControlMessage) -> bool {
        match self.conns.get(to) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

async fn send_line(writer: &mut OwnedWriteHalf, msg: &ControlMessage) -> Result<()> {
    let mut line = msg.to_line().context("control serialization")?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("control write failed")
}
