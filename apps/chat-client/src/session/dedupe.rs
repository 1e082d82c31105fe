//! Bounded window of recently accepted event ids.

use std::collections::{HashSet, VecDeque};

use chat_common::EventId;

/// Default number of event ids remembered for duplicate detection.
pub const DEFAULT_DEDUPE_WINDOW: usize = 1000;

/// Recently accepted event ids, oldest evicted first.
///
/// Redelivery only happens for events replayed after the resume token, so
/// the window needs to cover a replay burst rather than the whole session.
#[derive(Debug)]
pub struct SeenEvents {
    order: VecDeque<EventId>,
    members: HashSet<EventId>,
    capacity: usize,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.members.contains(id)
    }

    /// Record an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: EventId) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

impl Default for SeenEvents {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_WINDOW)
    }
}
