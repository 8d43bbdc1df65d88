//! Dedup gate: decides whether a freshly fetched item is new.
//!
//! The gate keeps the id of the last item it advanced to (the cursor) plus a
//! short in-memory history of earlier cursor values, so an item that briefly
//! drops off the top of the feed and comes back is not announced twice.
//! With a history capacity of 1 the gate is exactly "differs from the cursor".
//!
//! Nothing here is persisted: after a restart the cursor is unset again and
//! the dispatch loop re-enters its cold-start seeding path.

use std::collections::VecDeque;

use crate::domain::Item;

#[derive(Clone, Debug)]
pub struct DedupGate {
    recent: VecDeque<String>,
    capacity: usize,
}

impl DedupGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// The id of the last item advanced to, if any.
    pub fn cursor(&self) -> Option<&str> {
        self.recent.back().map(String::as_str)
    }

    pub fn is_seeded(&self) -> bool {
        !self.recent.is_empty()
    }

    pub fn is_new(&self, item: &Item) -> bool {
        !self.recent.iter().any(|id| *id == item.id)
    }

    /// Move the cursor to `item`. Only call after `is_new(item)` returned true.
    pub fn advance(&mut self, item: &Item) {
        debug_assert!(self.is_new(item), "advance called for a known item");
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(item.id.clone());
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new(1)
    }
}
