//! Forwarding engine — dedup gate, local delivery, downstream relay.
//!
//! Runs as its own task fed by a channel, so a slow handshake to the
//! downstream neighbor never blocks inbound reception, reassembly, or the
//! local consumer. Units that cannot reach a connectable neighbor within the
//! configured retry budget are dropped for that hop: liveness over
//! completeness.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use strand_core::control::ControlMessage;
use strand_services::{
    ChainState, ConnectionManager, DedupWindow, NameRegistry, PayloadUnit, UnitKind,
};

use super::send::send_unit;

pub struct ForwardEngine {
    self_name: String,
    chain: ChainState,
    dedup: DedupWindow,
    registry: NameRegistry,
    manager: Arc<ConnectionManager>,
    socket: Arc<UdpSocket>,
    max_chunk_bytes: usize,
    connect_retries: u32,
    consumer_tx: mpsc::Sender<PayloadUnit>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    unit_rx: mpsc::Receiver<PayloadUnit>,
    shutdown: broadcast::Receiver<()>,
}

impl ForwardEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_name: String,
        chain: ChainState,
        dedup: DedupWindow,
        registry: NameRegistry,
        manager: Arc<ConnectionManager>,
        socket: Arc<UdpSocket>,
        max_chunk_bytes: usize,
        connect_retries: u32,
        consumer_tx: mpsc::Sender<PayloadUnit>,
        control_tx: mpsc::UnboundedSender<ControlMessage>,
        unit_rx: mpsc::Receiver<PayloadUnit>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            self_name,
            chain,
            dedup,
            registry,
            manager,
            socket,
            max_chunk_bytes,
            connect_retries,
            consumer_tx,
            control_tx,
            unit_rx,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("forward engine shutting down");
                    return Ok(());
                }

                unit = self.unit_rx.recv() => {
                    let Some(unit) = unit else {
                        tracing::info!("unit queue closed, forward engine exiting");
                        return Ok(());
                    };
                    self.on_unit_ready(unit).await;
                }
            }
        }
    }

    /// One unit through the node: at most once to the consumer, at most
    /// once downstream.
    async fn on_unit_ready(&self, unit: PayloadUnit) {
        let origin = self.registry.display(&unit.origin);

        if !self.dedup.first_receipt(&unit.key()) {
            tracing::debug!(%origin, sequence = unit.sequence, "duplicate unit, discarding");
            return;
        }

        tracing::info!(
            %origin,
            sequence = unit.sequence,
            bytes = unit.bytes.len(),
            kind = ?unit.kind,
            "unit accepted"
        );

        // Local delivery. A departed consumer doesn't stop the relay.
        if self.consumer_tx.send(unit.clone()).await.is_err() {
            tracing::debug!("local consumer gone, relaying only");
        }

        if unit.kind == UnitKind::StreamEnd && self.chain.is_tail() {
            tracing::info!(%origin, "stream ended at strand tail");
            let report = ControlMessage::StreamComplete {
                origin: origin.clone(),
            };
            if self.control_tx.send(report).is_err() {
                tracing::warn!("control queue closed, stream completion not reported");
            }
        }

        let Some(next) = self.chain.next() else {
            return;
        };
        if next.name == self.self_name {
            tracing::warn!("assigned self as downstream neighbor, ignoring");
            return;
        }

        let mut endpoint = None;
        for attempt in 1..=self.connect_retries.max(1) {
            match self.manager.ensure_connected(&next.name).await {
                Ok(addr) => {
                    endpoint = Some(addr);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        peer = %next.name,
                        attempt,
                        error = %e,
                        "connect for forward failed"
                    );
                }
            }
        }
        let Some(endpoint) = endpoint else {
            tracing::warn!(
                %origin,
                sequence = unit.sequence,
                peer = %next.name,
                "unit dropped for this hop"
            );
            return;
        };

        if let Err(e) = send_unit(&self.socket, endpoint, &unit, self.max_chunk_bytes).await {
            tracing::warn!(
                %origin,
                sequence = unit.sequence,
                peer = %next.name,
                error = %e,
                "forward failed, unit dropped for this hop"
            );
        } else {
            tracing::info!(
                %origin,
                sequence = unit.sequence,
                peer = %next.name,
                "unit forwarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::time::Duration;
    use strand_core::control::PeerIdentity;
    use strand_core::wire::origin_id;
    use strand_services::{LinkError, LinkTable, Signaler, UnitReassembler, WireChunk};

    struct NoSignaler;
    impl Signaler for NoSignaler {
        fn send_offer(&self, _to: &str) -> Result<(), LinkError> {
            Ok(())
        }
    }

    struct Fixture {
        chain: ChainState,
        links: LinkTable,
        consumer_rx: mpsc::Receiver<PayloadUnit>,
        unit_tx: mpsc::Sender<PayloadUnit>,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
        shutdown_tx: broadcast::Sender<()>,
        socket_addr: SocketAddr,
    }

    async fn start_engine() -> Fixture {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let socket_addr = socket.local_addr().unwrap();
        let chain = ChainState::new();
        let links = LinkTable::new();
        let manager = ConnectionManager::new(
            "alpha".into(),
            links.clone(),
            Arc::new(NoSignaler),
            Duration::from_millis(30),
        );
        let (consumer_tx, consumer_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (unit_tx, unit_rx) = mpsc::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);

        let engine = ForwardEngine::new(
            "alpha".into(),
            chain.clone(),
            DedupWindow::new(1024),
            NameRegistry::new(),
            manager,
            socket,
            1000,
            1,
            consumer_tx,
            control_tx,
            unit_rx,
            shutdown_tx.subscribe(),
        );
        tokio::spawn(engine.run());

        Fixture {
            chain,
            links,
            consumer_rx,
            unit_tx,
            control_rx,
            shutdown_tx,
            socket_addr,
        }
    }

    fn unit(seq: u64, len: usize) -> PayloadUnit {
        PayloadUnit::data(origin_id("cam"), seq, Bytes::from(vec![0x5A; len]))
    }

    /// Bind a sink socket and collect reassembled units arriving at it.
    async fn sink() -> (SocketAddr, mpsc::Receiver<PayloadUnit>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let reassembler = UnitReassembler::new(Duration::from_secs(5));
            let mut buf = vec![0u8; 70000];
            loop {
                let Ok((len, _)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if let Ok(chunk) = WireChunk::decode(&buf[..len]) {
                    if let Some(unit) = reassembler.accept(chunk).await {
                        if tx.send(unit).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        (addr, rx)
    }

    #[tokio::test]
    async fn duplicates_reach_consumer_and_downstream_once() {
        let mut f = start_engine().await;
        let (sink_addr, mut sink_rx) = sink().await;
        f.links.link("beta").open(Some(sink_addr));
        f.chain.set_next(Some(PeerIdentity {
            name: "beta".into(),
            payload_endpoint: sink_addr,
        }));

        f.unit_tx.send(unit(1, 2400)).await.unwrap();
        f.unit_tx.send(unit(1, 2400)).await.unwrap();
        f.unit_tx.send(unit(1, 2400)).await.unwrap();

        let delivered = f.consumer_rx.recv().await.unwrap();
        assert_eq!(delivered.sequence, 1);
        let forwarded =
            tokio::time::timeout(Duration::from_secs(2), sink_rx.recv()).await.unwrap().unwrap();
        assert_eq!(forwarded.sequence, 1);
        assert_eq!(forwarded.bytes.len(), 2400);

        // no second copy anywhere
        assert!(
            tokio::time::timeout(Duration::from_millis(100), f.consumer_rx.recv())
                .await
                .is_err()
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(100), sink_rx.recv())
                .await
                .is_err()
        );
        drop(f.shutdown_tx);
    }

    #[tokio::test]
    async fn tail_delivers_locally_and_reports_stream_end() {
        let mut f = start_engine().await;
        // no next — this node is the tail
        f.unit_tx.send(unit(1, 100)).await.unwrap();
        assert_eq!(f.consumer_rx.recv().await.unwrap().sequence, 1);

        f.unit_tx
            .send(PayloadUnit::stream_end(origin_id("cam"), 2))
            .await
            .unwrap();
        let end = f.consumer_rx.recv().await.unwrap();
        assert_eq!(end.kind, UnitKind::StreamEnd);

        match f.control_rx.recv().await.unwrap() {
            ControlMessage::StreamComplete { origin } => {
                assert_eq!(origin, hex::encode(&origin_id("cam")[..8]));
            }
            other => panic!("expected StreamComplete, got {other:?}"),
        }
        drop(f.shutdown_tx);
    }

    #[tokio::test]
    async fn retarget_routes_new_units_to_new_neighbor_only() {
        let mut f = start_engine().await;
        let (sink_b, mut rx_b) = sink().await;
        let (sink_c, mut rx_c) = sink().await;
        f.links.link("beta").open(Some(sink_b));
        f.links.link("gamma").open(Some(sink_c));

        f.chain.set_next(Some(PeerIdentity {
            name: "beta".into(),
            payload_endpoint: sink_b,
        }));
        f.unit_tx.send(unit(1, 500)).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), rx_b.recv()).await.unwrap().unwrap();
        assert_eq!(got.sequence, 1);

        // mid-stream reassignment
        f.chain.set_next(Some(PeerIdentity {
            name: "gamma".into(),
            payload_endpoint: sink_c,
        }));
        f.unit_tx.send(unit(2, 500)).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), rx_c.recv()).await.unwrap().unwrap();
        assert_eq!(got.sequence, 2);

        // nothing after the retarget reaches the old neighbor
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx_b.recv())
                .await
                .is_err()
        );
        let _ = f.consumer_rx.recv().await;
        drop(f.shutdown_tx);
    }

    #[tokio::test]
    async fn unconnectable_neighbor_drops_unit_but_keeps_consumer_delivery() {
        let mut f = start_engine().await;
        f.chain.set_next(Some(PeerIdentity {
            name: "beta".into(),
            payload_endpoint: f.socket_addr,
        }));

        // no link ever opens for beta and the signaler never answers:
        // the lazy connect times out and the unit is dropped for the hop
        f.unit_tx.send(unit(1, 100)).await.unwrap();
        assert_eq!(f.consumer_rx.recv().await.unwrap().sequence, 1);

        // the engine stays live for later units
        f.unit_tx.send(unit(2, 100)).await.unwrap();
        assert_eq!(f.consumer_rx.recv().await.unwrap().sequence, 2);
        drop(f.shutdown_tx);
    }
}
