//! Strand integration test harness.
//!
//! Runs whole strands in one process: a real coordinator and real nodes
//! wired over loopback TCP (control) and UDP (payload). Every test builds
//! its own coordinator, so strands never interfere across tests.

use std::time::Duration;

use strand_core::config::StrandConfig;
use strand_services::{PayloadUnit, UnitKind};
use strand_coord::Coordinator;
use strandd::node::{Node, NodeHandle};

mod chain;
mod relay;

// ── Harness ──────────────────────────────────────────────────────────────────

/// How long harness waits may block before a test fails.
pub const WAIT: Duration = Duration::from_secs(5);

pub async fn start_coordinator() -> Coordinator {
    Coordinator::bind("127.0.0.1:0")
        .await
        .expect("coordinator binds on loopback")
}

pub fn node_config(name: &str, coordinator: &Coordinator) -> StrandConfig {
    let mut config = StrandConfig::default();
    config.node.name = name.to_string();
    config.coordinator.endpoint = coordinator.endpoint().to_string();
    // small chunks so ordinary test payloads exercise reassembly
    config.relay.max_chunk_bytes = 1000;
    config.relay.connect_timeout_secs = 3;
    config
}

pub async fn start_node(name: &str, coordinator: &Coordinator) -> NodeHandle {
    Node::start(node_config(name, coordinator))
        .await
        .unwrap_or_else(|e| panic!("node {name} should start: {e:#}"))
}

/// Wait until the node's downstream neighbor matches.
pub async fn wait_for_next(handle: &NodeHandle, expected: Option<&str>) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if handle.next_name().as_deref() == expected {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "node {} never saw next = {expected:?} (currently {:?})",
                handle.name,
                handle.next_name()
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Next delivered unit, or panic after the harness wait.
pub async fn recv_unit(handle: &mut NodeHandle, what: &str) -> PayloadUnit {
    tokio::time::timeout(WAIT, handle.delivered.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("node stopped while waiting for {what}"))
}

/// Assert no unit arrives within a settle window.
pub async fn assert_no_unit(handle: &mut NodeHandle, window: Duration, what: &str) {
    if let Ok(Some(unit)) = tokio::time::timeout(window, handle.delivered.recv()).await {
        panic!("unexpected {what}: origin={} seq={}", hex::encode(&unit.origin[..8]), unit.sequence);
    }
}

pub fn is_stream_end(unit: &PayloadUnit) -> bool {
    unit.kind == UnitKind::StreamEnd
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_node_registers_as_head() {
    let coordinator = start_coordinator().await;
    let node = start_node("solo", &coordinator).await;

    assert_eq!(node.name, "solo");
    assert!(node.next_name().is_none(), "head of an empty strand has no next");
    assert_eq!(coordinator.members("default"), vec!["solo"]);
    node.shutdown();
}

#[tokio::test]
async fn name_collision_is_fatal_for_the_second_node() {
    let coordinator = start_coordinator().await;
    let first = start_node("dup", &coordinator).await;

    let err = Node::start(node_config("dup", &coordinator))
        .await
        .expect_err("second registration with the same name must fail");
    assert!(
        err.to_string().contains("registration rejected"),
        "unexpected error: {err:#}"
    );

    first.shutdown();
}

#[tokio::test]
async fn registration_order_builds_the_chain() {
    let coordinator = start_coordinator().await;
    let a = start_node("a", &coordinator).await;
    let b = start_node("b", &coordinator).await;
    let c = start_node("c", &coordinator).await;

    wait_for_next(&a, Some("b")).await;
    wait_for_next(&b, Some("c")).await;
    assert!(c.next_name().is_none(), "latest registrant is the tail");
    assert_eq!(coordinator.members("default"), vec!["a", "b", "c"]);

    a.shutdown();
    b.shutdown();
    c.shutdown();
}
