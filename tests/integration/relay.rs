//! End-to-end relay behavior: delivery, dedup, chunking, stream end.

use std::time::Duration;

use bytes::Bytes;
use strand_core::wire::origin_id;
use strand_services::{codec::split_unit, PayloadUnit};
use tokio::net::UdpSocket;

use crate::*;

#[tokio::test]
async fn unit_reaches_every_consumer_exactly_once() {
    let coordinator = start_coordinator().await;
    let mut a = start_node("a", &coordinator).await;
    let mut b = start_node("b", &coordinator).await;
    let mut c = start_node("c", &coordinator).await;
    wait_for_next(&a, Some("b")).await;
    wait_for_next(&b, Some("c")).await;

    // large enough to split into many chunks (max_chunk_bytes = 1000)
    let payload = Bytes::from((0..25_000u32).map(|i| i as u8).collect::<Vec<_>>());
    a.originate(payload.clone()).await.unwrap();

    for (name, handle) in [("a", &mut a), ("b", &mut b), ("c", &mut c)] {
        let unit = recv_unit(handle, &format!("unit at {name}")).await;
        assert_eq!(unit.origin, origin_id("a"));
        assert_eq!(unit.sequence, 1);
        assert_eq!(unit.bytes, payload, "byte-identical at {name}");
    }

    // no second copy anywhere
    for (name, handle) in [("a", &mut a), ("b", &mut b), ("c", &mut c)] {
        assert_no_unit(handle, Duration::from_millis(200), &format!("duplicate at {name}")).await;
    }

    a.shutdown();
    b.shutdown();
    c.shutdown();
}

#[tokio::test]
async fn injected_wire_duplicates_are_relayed_once() {
    let coordinator = start_coordinator().await;
    let mut b = start_node("b", &coordinator).await;
    let mut c = start_node("c", &coordinator).await;
    wait_for_next(&b, Some("c")).await;

    // a unit from a fabricated origin, its chunks blasted at b three times
    // over, out of order — redundant paths and retransmission in one
    let unit = PayloadUnit::data(
        origin_id("phantom"),
        7,
        Bytes::from(vec![0xC4u8; 2400]),
    );
    let chunks = split_unit(&unit, 1000).unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..3 {
        for i in [1usize, 0, 2] {
            socket
                .send_to(&chunks[i].encode(), b.payload_endpoint)
                .await
                .unwrap();
        }
    }

    let at_b = recv_unit(&mut b, "unit at b").await;
    assert_eq!(at_b.bytes, unit.bytes);
    let at_c = recv_unit(&mut c, "unit at c").await;
    assert_eq!(at_c.bytes, unit.bytes);

    assert_no_unit(&mut b, Duration::from_millis(200), "duplicate at b").await;
    assert_no_unit(&mut c, Duration::from_millis(200), "duplicate at c").await;

    b.shutdown();
    c.shutdown();
}

#[tokio::test]
async fn stream_end_propagates_to_the_tail() {
    let coordinator = start_coordinator().await;
    let mut a = start_node("a", &coordinator).await;
    let mut b = start_node("b", &coordinator).await;
    wait_for_next(&a, Some("b")).await;

    a.originate(Bytes::from_static(b"frame-1")).await.unwrap();
    a.originate(Bytes::from_static(b"frame-2")).await.unwrap();
    a.end_stream();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        kinds.push(recv_unit(&mut b, "unit at b").await);
    }
    assert_eq!(kinds[0].bytes, Bytes::from_static(b"frame-1"));
    assert_eq!(kinds[1].bytes, Bytes::from_static(b"frame-2"));
    assert!(is_stream_end(&kinds[2]), "termination marker arrives last");
    assert_eq!(kinds[2].sequence, 3, "end marker takes the next sequence");

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn garbage_datagrams_never_disturb_the_stream() {
    let coordinator = start_coordinator().await;
    let mut a = start_node("a", &coordinator).await;
    let mut b = start_node("b", &coordinator).await;
    wait_for_next(&a, Some("b")).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(b"not a chunk", b.payload_endpoint).await.unwrap();
    socket.send_to(&[0u8; 200], b.payload_endpoint).await.unwrap();

    a.originate(Bytes::from_static(b"survives")).await.unwrap();
    let unit = recv_unit(&mut b, "unit at b").await;
    assert_eq!(unit.bytes, Bytes::from_static(b"survives"));

    a.shutdown();
    b.shutdown();
}
