//! Pending event queue — holds coordination events that arrive before a
//! local prerequisite (payload plane, source init) is satisfied.
//!
//! Admission and release share one lock, so an event can never slip past a
//! concurrent drain: it is either processed now or queued for FIFO replay.

use std::collections::VecDeque;
use std::sync::Mutex;

pub struct PendingEvents<T> {
    inner: Mutex<Inner<T>>,
}

enum Inner<T> {
    Holding(VecDeque<T>),
    Ready,
}

impl<T> PendingEvents<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::Holding(VecDeque::new())),
        }
    }

    /// Offer an event. Returns it back when the node is ready (process it
    /// now); returns None when it was queued for later replay.
    pub fn admit(&self, event: T) -> Option<T> {
        let mut inner = self.inner.lock().expect("pending lock");
        match &mut *inner {
            Inner::Ready => Some(event),
            Inner::Holding(queue) => {
                queue.push_back(event);
                None
            }
        }
    }

    /// Mark the prerequisite satisfied. Returns every queued event in
    /// arrival order for replay through the same handler; subsequent
    /// admits pass straight through.
    pub fn mark_ready(&self) -> Vec<T> {
        let mut inner = self.inner.lock().expect("pending lock");
        match std::mem::replace(&mut *inner, Inner::Ready) {
            Inner::Holding(queue) => queue.into(),
            Inner::Ready => Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.lock().expect("pending lock"), Inner::Ready)
    }

    pub fn queued(&self) -> usize {
        match &*self.inner.lock().expect("pending lock") {
            Inner::Holding(queue) => queue.len(),
            Inner::Ready => 0,
        }
    }
}

impl<T> Default for PendingEvents<T> {
    fn default() -> Self {
        Self::new()
    }
}
