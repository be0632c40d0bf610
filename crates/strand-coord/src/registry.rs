//! Strand membership — registration order is chain order.
//!
//! First registered = head; a node's `next` is undefined until a successor
//! registers. Departures stitch the predecessor to the departed node's
//! successor.

use std::collections::HashMap;
use std::sync::Mutex;

use strand_core::control::PeerIdentity;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("peer name '{0}' is already registered")]
    NameTaken(String),
}

/// Effect of a successful registration.
pub struct Joined {
    /// The new peer's upstream neighbor (None for the head).
    pub prev: Option<PeerIdentity>,
    /// Every other member of the strand, for NEW_PEER fanout.
    pub others: Vec<String>,
}

/// Effect of a departure on the rest of the chain.
pub struct Unlinked {
    /// Predecessor that needs an UPDATE_NEXT, if any.
    pub prev: Option<String>,
    /// The predecessor's new downstream neighbor (None = it became the tail).
    pub new_next: Option<PeerIdentity>,
}

#[derive(Default)]
pub struct StrandRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Strand name → member names in registration order.
    strands: HashMap<String, Vec<String>>,
    /// Peer name → identity.
    peers: HashMap<String, PeerIdentity>,
}

impl StrandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer at the tail of its strand. Name collisions are
    /// rejected; the caller reports them and must not retry automatically.
    pub fn register(&self, identity: PeerIdentity, strand: &str) -> Result<Joined, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock");
        if inner.peers.contains_key(&identity.name) {
            return Err(RegistryError::NameTaken(identity.name));
        }

        let members = inner.strands.entry(strand.to_string()).or_default();
        let prev_name = members.last().cloned();
        let others = members.clone();
        members.push(identity.name.clone());

        let prev = prev_name.and_then(|n| inner.peers.get(&n).cloned());
        inner.peers.insert(identity.name.clone(), identity);

        Ok(Joined { prev, others })
    }

    /// Remove a peer and report how to re-stitch the chain around it.
    pub fn remove(&self, name: &str) -> Option<Unlinked> {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.peers.remove(name)?;

        let (position, strand) = inner
            .strands
            .iter()
            .find_map(|(strand, members)| {
                members
                    .iter()
                    .position(|m| m == name)
                    .map(|i| (i, strand.clone()))
            })?;

        let members = inner.strands.get_mut(&strand).expect("strand exists");
        members.remove(position);

        if position == 0 {
            // the head left; its successor simply becomes the new head
            return Some(Unlinked {
                prev: None,
                new_next: None,
            });
        }

        let prev = members[position - 1].clone();
        let successor = members.get(position).cloned();
        let new_next = successor.and_then(|n| inner.peers.get(&n).cloned());
        Some(Unlinked {
            prev: Some(prev),
            new_next,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<PeerIdentity> {
        self.inner.lock().expect("registry lock").peers.get(name).cloned()
    }

    pub fn members(&self, strand: &str) -> Vec<String> {
        self.inner
            .lock()
            .expect("registry lock")
            .strands
            .get(strand)
            .cloned()
            .unwrap_or_default()
    }
}
