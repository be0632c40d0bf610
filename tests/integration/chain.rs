//! Chain maintenance under churn: departures, re-stitching, mid-stream
//! retargeting.

use std::time::Duration;

use bytes::Bytes;
use strand_core::wire::origin_id;

use crate::*;

#[tokio::test]
async fn middle_node_departure_restitches_the_chain() {
    let coordinator = start_coordinator().await;
    let mut a = start_node("a", &coordinator).await;
    let b = start_node("b", &coordinator).await;
    let mut c = start_node("c", &coordinator).await;
    wait_for_next(&a, Some("b")).await;
    wait_for_next(&b, Some("c")).await;

    // relay works through b first
    a.originate(Bytes::from_static(b"via-b")).await.unwrap();
    assert_eq!(recv_unit(&mut c, "unit at c").await.bytes, Bytes::from_static(b"via-b"));

    // b leaves; the coordinator retargets a to c
    b.shutdown();
    wait_for_next(&a, Some("c")).await;
    assert_eq!(coordinator.members("default"), vec!["a", "c"]);

    // units emitted after the change flow a → c directly
    a.originate(Bytes::from_static(b"direct")).await.unwrap();
    loop {
        let unit = recv_unit(&mut c, "post-retarget unit at c").await;
        if unit.bytes == Bytes::from_static(b"direct") {
            break;
        }
    }

    let _ = recv_unit(&mut a, "local delivery at a").await;
    a.shutdown();
    c.shutdown();
}

#[tokio::test]
async fn tail_departure_makes_predecessor_the_tail() {
    let coordinator = start_coordinator().await;
    let a = start_node("a", &coordinator).await;
    let b = start_node("b", &coordinator).await;
    wait_for_next(&a, Some("b")).await;

    b.shutdown();
    wait_for_next(&a, None).await;
    assert_eq!(coordinator.members("default"), vec!["a"]);

    a.shutdown();
}

#[tokio::test]
async fn late_joiner_extends_the_chain_mid_stream() {
    let coordinator = start_coordinator().await;
    let mut a = start_node("a", &coordinator).await;
    let mut b = start_node("b", &coordinator).await;
    wait_for_next(&a, Some("b")).await;

    a.originate(Bytes::from_static(b"early")).await.unwrap();
    assert_eq!(recv_unit(&mut b, "unit at b").await.bytes, Bytes::from_static(b"early"));

    // c joins while the stream is live; b gains a downstream neighbor
    let mut c = start_node("c", &coordinator).await;
    wait_for_next(&b, Some("c")).await;

    a.originate(Bytes::from_static(b"late")).await.unwrap();
    let unit = recv_unit(&mut c, "unit at c").await;
    assert_eq!(unit.origin, origin_id("a"));
    assert_eq!(unit.bytes, Bytes::from_static(b"late"));
    // c never saw the unit that predated it
    assert_eq!(unit.sequence, 2);
    assert_no_unit(&mut c, Duration::from_millis(200), "pre-join unit at c").await;

    let _ = recv_unit(&mut b, "unit at b").await;
    let _ = recv_unit(&mut a, "local delivery at a").await;
    a.shutdown();
    b.shutdown();
    c.shutdown();
}

#[tokio::test]
async fn parallel_strands_do_not_mix() {
    let coordinator = start_coordinator().await;

    let mut left_head = {
        let mut config = node_config("left-head", &coordinator);
        config.node.strand = "left".into();
        strandd::node::Node::start(config).await.unwrap()
    };
    let mut left_tail = {
        let mut config = node_config("left-tail", &coordinator);
        config.node.strand = "left".into();
        strandd::node::Node::start(config).await.unwrap()
    };
    let mut right_tail = {
        let mut config = node_config("right-tail", &coordinator);
        config.node.strand = "right".into();
        strandd::node::Node::start(config).await.unwrap()
    };

    wait_for_next(&left_head, Some("left-tail")).await;
    assert!(right_tail.next_name().is_none(), "strands assign independently");

    left_head.originate(Bytes::from_static(b"left-only")).await.unwrap();
    assert_eq!(
        recv_unit(&mut left_tail, "unit at left-tail").await.bytes,
        Bytes::from_static(b"left-only")
    );
    assert_no_unit(&mut right_tail, Duration::from_millis(200), "cross-strand unit").await;

    let _ = recv_unit(&mut left_head, "local delivery at left-head").await;
    left_head.shutdown();
    left_tail.shutdown();
    right_tail.shutdown();
}
