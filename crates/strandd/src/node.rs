//! Node assembly — binds the payload plane, registers with the coordinator,
//! and wires the control dispatcher, receive loop, forwarding engine, and
//! optional local source into one running relay node.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use strand_core::config::StrandConfig;
use strand_core::control::ControlMessage;
use strand_core::wire::origin_id;
use strand_services::{
    ChainState, ConnectionManager, DedupWindow, LinkTable, NameRegistry, PayloadUnit,
    UnitReassembler,
};

use crate::control::{self, ControlSignaler, Dispatcher};
use crate::relay::{forward::ForwardEngine, receive};
use crate::source::UnitSource;

pub struct Node;

/// A running node. Stops on [`NodeHandle::shutdown`] or when the handle
/// is dropped.
#[derive(Debug)]
pub struct NodeHandle {
    pub name: String,
    pub payload_endpoint: SocketAddr,
    /// Local consumer stream: every unit this node accepts, exactly once.
    pub delivered: mpsc::Receiver<PayloadUnit>,
    /// Originate data units from this node. Dropping the sender (after at
    /// least one unit) emits the origin's end-of-stream marker.
    pub origin: Option<mpsc::Sender<Bytes>>,
    chain: ChainState,
    shutdown_tx: broadcast::Sender<()>,
}

impl NodeHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Current downstream neighbor name, if any.
    pub fn next_name(&self) -> Option<String> {
        self.chain.next().map(|p| p.name)
    }

    pub async fn originate(&self, bytes: Bytes) -> Result<()> {
        self.origin
            .as_ref()
            .context("origin channel already closed")?
            .send(bytes)
            .await
            .context("node stopped")
    }

    /// Close the origin stream, emitting STREAM_END downstream.
    pub fn end_stream(&mut self) {
        self.origin = None;
    }
}

impl Node {
    /// Bring a node up. Fatal errors: payload bind failure, coordinator
    /// unreachable, registration rejected. Source failure is NOT fatal —
    /// the node continues in pure-relay mode.
    pub async fn start(config: StrandConfig) -> Result<NodeHandle> {
        let name = if config.node.name.is_empty() {
            format!("node-{}", std::process::id())
        } else {
            config.node.name.clone()
        };

        // Payload plane first: the registered endpoint must be live before
        // any upstream neighbor learns it.
        let socket = Arc::new(
            UdpSocket::bind(&config.network.payload_addr)
                .await
                .with_context(|| {
                    format!("failed to bind payload socket {}", config.network.payload_addr)
                })?,
        );
        let payload_endpoint = socket.local_addr()?;
        tracing::info!(%name, %payload_endpoint, "payload plane bound");

        let registration = control::register(
            &config.coordinator.endpoint,
            &name,
            payload_endpoint,
            &config.node.strand,
        )
        .await?;

        // Shared state
        let chain = ChainState::new();
        let registry = NameRegistry::new();
        let links = LinkTable::new();
        registry.record(&name);
        if let Some(prev) = &registration.prev {
            registry.record(&prev.name);
            chain.set_prev(Some(prev.clone()));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel::<ControlMessage>();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let signaler = Arc::new(ControlSignaler {
            self_name: name.clone(),
            payload_endpoint,
            control_tx: control_tx.clone(),
        });
        let manager = ConnectionManager::new(
            name.clone(),
            links.clone(),
            signaler,
            Duration::from_secs(config.relay.connect_timeout_secs),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            name.clone(),
            payload_endpoint,
            chain.clone(),
            registry.clone(),
            links.clone(),
            manager.clone(),
            control_tx.clone(),
        ));

        // Control plane tasks. Events arriving from here on are queued by
        // the dispatcher until local prerequisites are met.
        {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown_tx.subscribe();
            let reader = registration.reader;
            tokio::spawn(async move {
                if let Err(e) = control::read_loop(reader, dispatcher, shutdown).await {
                    tracing::warn!(error = %e, "control reader terminated");
                }
            });
        }
        {
            let shutdown = shutdown_tx.subscribe();
            let writer = registration.writer;
            tokio::spawn(async move {
                if let Err(e) = control::write_loop(writer, control_rx, shutdown).await {
                    tracing::warn!(error = %e, "control writer terminated");
                }
            });
        }

        // Data plane
        let reassembler = Arc::new(UnitReassembler::new(Duration::from_secs(
            config.relay.reassembly_timeout_secs,
        )));
        let (unit_tx, unit_rx) = mpsc::channel::<PayloadUnit>(256);
        let (consumer_tx, delivered) = mpsc::channel::<PayloadUnit>(256);

        {
            let socket = socket.clone();
            let reassembler = reassembler.clone();
            let unit_tx = unit_tx.clone();
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                if let Err(e) = receive::receive_loop(socket, reassembler, unit_tx, shutdown).await
                {
                    tracing::warn!(error = %e, "receive loop terminated");
                }
            });
        }

        let engine = ForwardEngine::new(
            name.clone(),
            chain.clone(),
            DedupWindow::new(config.relay.dedup_window),
            registry.clone(),
            manager,
            socket,
            config.relay.max_chunk_bytes,
            config.relay.connect_retries,
            consumer_tx,
            control_tx,
            unit_rx,
            shutdown_tx.subscribe(),
        );
        tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                tracing::warn!(error = %e, "forward engine terminated");
            }
        });

        // Origin path: hand out a sender; sequence numbers are assigned
        // here, and closing the channel ends the stream.
        let (origin_tx, mut origin_rx) = mpsc::channel::<Bytes>(64);
        {
            let unit_tx = unit_tx.clone();
            let origin = origin_id(&name);
            let node_name = name.clone();
            tokio::spawn(async move {
                let mut sequence = 0u64;
                while let Some(bytes) = origin_rx.recv().await {
                    sequence += 1;
                    let unit = PayloadUnit::data(origin, sequence, bytes);
                    if unit_tx.send(unit).await.is_err() {
                        return;
                    }
                }
                if sequence > 0 {
                    tracing::info!(name = %node_name, sequence, "origin stream ended");
                    let _ = unit_tx
                        .send(PayloadUnit::stream_end(origin, sequence + 1))
                        .await;
                }
            });
        }

        // Local source, if configured. Its initialization is the readiness
        // prerequisite: control events queue until the source is open (or
        // declined, or failed into pure-relay mode).
        let source = if config.source.enabled {
            match UnitSource::open(&config.source).await {
                Ok(source) => Some(source),
                Err(e) => {
                    tracing::warn!(error = %e, "source unavailable, continuing in pure-relay mode");
                    None
                }
            }
        } else {
            None
        };
        dispatcher.mark_ready();

        // With a live source the node originates on its own and the origin
        // channel belongs to the source task: its exhaustion ends the stream.
        let origin = if let Some(source) = source {
            let shutdown = shutdown_tx.subscribe();
            let interval = Duration::from_millis(config.source.unit_interval_ms.max(1));
            tokio::spawn(async move {
                source.run(interval, origin_tx, shutdown).await;
            });
            None
        } else {
            Some(origin_tx)
        };

        Ok(NodeHandle {
            name,
            payload_endpoint,
            delivered,
            origin,
            chain,
            shutdown_tx,
        })
    }
}
