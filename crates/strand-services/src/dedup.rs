//! Dedup window — at-most-once processing per `(origin, sequence)`.
//!
//! Bounded: each origin keeps a sliding window of recently seen sequence
//! numbers, evicting the oldest-inserted beyond capacity. Re-seeing a key
//! does not refresh it — a duplicate burst must not push genuinely new
//! keys out of the window.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use strand_core::wire::OriginId;

use crate::unit::UnitKey;

#[derive(Clone)]
pub struct DedupWindow {
    per_origin: Arc<DashMap<OriginId, OriginWindow>>,
    capacity: usize,
}

struct OriginWindow {
    seen: HashSet<u64>,
    order: VecDeque<u64>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            per_origin: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Test-and-insert. Returns true exactly once per key while it remains
    /// inside the origin's window.
    pub fn first_receipt(&self, key: &UnitKey) -> bool {
        let (origin, sequence) = *key;
        let mut window = self.per_origin.entry(origin).or_insert_with(|| OriginWindow {
            seen: HashSet::new(),
            order: VecDeque::new(),
        });

        if !window.seen.insert(sequence) {
            return false;
        }
        window.order.push_back(sequence);
        if window.order.len() > self.capacity {
            if let Some(oldest) = window.order.pop_front() {
                window.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.per_origin
            .get(&key.0)
            .map(|w| w.seen.contains(&key.1))
            .unwrap_or(false)
    }

    /// Keys currently held for one origin.
    pub fn origin_len(&self, origin: &OriginId) -> usize {
        self.per_origin.get(origin).map(|w| w.seen.len()).unwrap_or(0)
    }
}
