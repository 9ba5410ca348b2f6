//! Stanzas waiting for a connection.

use std::collections::VecDeque;

use log::warn;

/// Bounded FIFO holding outbound items while a session is down.
///
/// When full, the oldest item is discarded to make room for the newest one.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    /// Items discarded since the queue was created
    dropped: usize,
}

impl<T> OutboundQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        OutboundQueue {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Appends an item, returning the one discarded to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            self.dropped += 1;
            return Some(item);
        }

        let discarded = if self.items.len() >= self.capacity {
            self.dropped += 1;
            warn!(
                "outbound queue full ({} items), dropping the oldest one",
                self.capacity
            );
            self.items.pop_front()
        } else {
            None
        };

        self.items.push_back(item);
        discarded
    }

    /// Takes every queued item, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_keeps_order() {
        let mut queue = OutboundQueue::new(3);
        queue.push(1);
        queue.push(2);

        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = OutboundQueue::new(2);
        assert_eq!(queue.push("a"), None);
        assert_eq!(queue.push("b"), None);
        assert_eq!(queue.push("c"), Some("a"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut queue = OutboundQueue::new(0);
        assert_eq!(queue.push(1), Some(1));
        assert!(queue.is_empty());
    }
}
