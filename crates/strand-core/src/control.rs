//! Control-plane message schema — coordinator ↔ node, node ↔ node (relayed).
//!
//! Messages travel as line-delimited JSON over the node's TCP connection to
//! the coordinator. Offer/answer/candidate payloads are opaque to the
//! coordinator; it routes them by the `to` field without inspection.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// A registered peer: unique name plus the UDP endpoint where it receives
/// payload chunks. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub name: String,
    pub payload_endpoint: SocketAddr,
}

/// Every message on the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Node → coordinator. First message on a fresh connection.
    Register {
        name: String,
        payload_endpoint: SocketAddr,
        strand: String,
    },

    /// Coordinator → node. Successful registration: the upstream neighbor
    /// (None for the strand head) and the endpoint future control traffic
    /// is served from.
    RegisterAck {
        prev: Option<PeerIdentity>,
        control_endpoint: SocketAddr,
    },

    /// Coordinator → node. Registration or routing failure. The condition is
    /// reported to the caller and never retried automatically.
    Error { message: String },

    /// Coordinator → all nodes of a strand. A peer joined.
    NewPeer { name: String },

    /// Coordinator → node. The node's downstream neighbor changed.
    /// `next: None` clears it (the node becomes the tail).
    UpdateNext {
        node: String,
        next: Option<PeerIdentity>,
    },

    /// Node ↔ node via coordinator. Handshake opening message.
    Offer {
        from: String,
        to: String,
        payload: serde_json::Value,
    },

    /// Node ↔ node via coordinator. Handshake reply.
    Answer {
        from: String,
        to: String,
        payload: serde_json::Value,
    },

    /// Node ↔ node via coordinator. Auxiliary connectivity hint; may arrive
    /// in any order relative to the offer/answer it belongs to.
    Candidate {
        from: String,
        to: String,
        payload: serde_json::Value,
    },

    /// Node → coordinator. Sent by a tail node when it observes an origin's
    /// end-of-stream marker.
    StreamComplete { origin: String },
}

/// The concrete offer/answer/candidate payload Strand nodes exchange: the
/// sender's payload-plane UDP endpoint. Carried as opaque JSON on the wire
/// so the coordinator stays a pure relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub endpoint: SocketAddr,
}

impl HandshakePayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("handshake payload serializes")
    }

    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl ControlMessage {
    /// Encode as one wire line (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode one wire line. Malformed lines are the caller's problem to
    /// drop and log — never a crash.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn serde_round_trip_register() {
        let msg = ControlMessage::Register {
            name: "alpha".into(),
            payload_endpoint: addr(7001),
            strand: "default".into(),
        };
        let line = msg.to_line().unwrap();
        assert!(line.contains("\"type\":\"register\""));
        match ControlMessage::from_line(&line).unwrap() {
            ControlMessage::Register { name, strand, .. } => {
                assert_eq!(name, "alpha");
                assert_eq!(strand, "default");
            }
            other => panic!("expected Register, got {other:?}"),
        }
    }

    #[test]
    fn serde_round_trip_update_next() {
        let msg = ControlMessage::UpdateNext {
            node: "alpha".into(),
            next: Some(PeerIdentity {
                name: "beta".into(),
                payload_endpoint: addr(7002),
            }),
        };
        let line = msg.to_line().unwrap();
        match ControlMessage::from_line(&line).unwrap() {
            ControlMessage::UpdateNext { node, next } => {
                assert_eq!(node, "alpha");
                assert_eq!(next.unwrap().name, "beta");
            }
            other => panic!("expected UpdateNext, got {other:?}"),
        }
    }

    #[test]
    fn update_next_none_clears_tail() {
        let msg = ControlMessage::UpdateNext {
            node: "alpha".into(),
            next: None,
        };
        let line = msg.to_line().unwrap();
        match ControlMessage::from_line(&line).unwrap() {
            ControlMessage::UpdateNext { next, .. } => assert!(next.is_none()),
            other => panic!("expected UpdateNext, got {other:?}"),
        }
    }

    #[test]
    fn offer_payload_is_opaque_json() {
        let payload = HandshakePayload { endpoint: addr(7003) };
        let msg = ControlMessage::Offer {
            from: "alpha".into(),
            to: "beta".into(),
            payload: payload.to_value(),
        };
        let line = msg.to_line().unwrap();
        match ControlMessage::from_line(&line).unwrap() {
            ControlMessage::Offer { payload, .. } => {
                let decoded = HandshakePayload::from_value(&payload).unwrap();
                assert_eq!(decoded.endpoint, addr(7003));
            }
            other => panic!("expected Offer, got {other:?}"),
        }
    }

    #[test]
    fn malformed_line_is_an_error_not_a_panic() {
        assert!(ControlMessage::from_line("not json").is_err());
        assert!(ControlMessage::from_line("{\"type\":\"nope\"}").is_err());
    }
}
