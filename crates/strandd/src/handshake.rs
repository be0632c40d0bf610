//! Neighbor handshake — offer/answer/candidate handling.
//!
//! The exchange is two messages relayed through the coordinator: the
//! initiator's offer carries its payload endpoint, the responder's answer
//! carries its own. Candidates are auxiliary endpoints and may arrive in any
//! order relative to the offer/answer they belong to; they always apply to
//! the single link instance for that neighbor.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use strand_core::control::{ControlMessage, HandshakePayload};
use strand_services::LinkTable;

fn endpoint_of(payload: &serde_json::Value) -> Option<SocketAddr> {
    HandshakePayload::from_value(payload).map(|p| p.endpoint)
}

/// Responder path. The link is created on first offer receipt — a
/// late-arriving candidate always finds a target — and the channel opens
/// immediately: the responder now knows where the initiator's chunks will
/// come from and where its own would go.
pub fn on_offer(
    links: &LinkTable,
    from: &str,
    payload: &serde_json::Value,
    self_name: &str,
    self_endpoint: SocketAddr,
    control_tx: &mpsc::UnboundedSender<ControlMessage>,
) {
    let link = links.link(from);
    let endpoint = endpoint_of(payload);
    if endpoint.is_none() {
        tracing::warn!(from, "offer without a usable endpoint payload");
    }
    let resolved = link.open(endpoint);
    tracing::info!(
        from,
        endpoint = ?resolved,
        "offer accepted, channel open (responder)"
    );

    let answer = ControlMessage::Answer {
        from: self_name.to_string(),
        to: from.to_string(),
        payload: HandshakePayload {
            endpoint: self_endpoint,
        }
        .to_value(),
    };
    if control_tx.send(answer).is_err() {
        tracing::warn!(from, "control queue closed, answer not sent");
    }
}

/// Initiator path. An answer for a neighbor we never offered to is
/// unexpected and dropped; otherwise the channel opens and every waiter on
/// the link's state is woken.
pub fn on_answer(links: &LinkTable, from: &str, payload: &serde_json::Value) {
    let Some(link) = links.get(from) else {
        tracing::warn!(from, "unexpected answer, no link for peer");
        return;
    };
    match link.open(endpoint_of(payload)) {
        Some(endpoint) => {
            tracing::info!(from, %endpoint, "answer received, channel open (initiator)");
        }
        None => {
            tracing::warn!(from, "answer carried no endpoint and none was known");
        }
    }
}

/// Auxiliary connectivity. Applied to the existing link regardless of
/// ordering; a candidate for a peer with no link at all has no target and
/// is dropped.
pub fn on_candidate(links: &LinkTable, from: &str, payload: &serde_json::Value) {
    let Some(link) = links.get(from) else {
        tracing::warn!(from, "candidate for unknown peer, dropping");
        return;
    };
    match endpoint_of(payload) {
        Some(endpoint) => {
            link.apply_candidate(endpoint);
            tracing::debug!(from, %endpoint, "candidate applied");
        }
        None => tracing::warn!(from, "candidate without a usable endpoint"),
    }
}
