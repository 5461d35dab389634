//! FIFO queues of work blocked on slot availability.

use std::collections::VecDeque;

/// A first-in, first-out queue that remembers its high-water mark.
#[derive(Debug, Clone)]
pub struct PendingQueue<T> {
    items: VecDeque<T>,
    peak_len: usize,
    total_enqueued: u64,
}

impl<T> PendingQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { items: VecDeque::new(), peak_len: 0, total_enqueued: 0 }
    }

    /// Append to the back of the queue.
    pub fn push_back(&mut self, item: T) {
        self.items.push_back(item);
        self.total_enqueued += 1;
        self.peak_len = self.peak_len.max(self.items.len());
    }

    /// Remove the oldest item.
    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// The oldest item.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Largest number of items queued at once.
    #[must_use]
    pub fn peak_len(&self) -> usize {
        self.peak_len
    }

    /// Number of items ever queued.
    #[must_use]
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
