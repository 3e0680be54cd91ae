//! Deduplicating FIFO of records awaiting reconciliation

use crate::record::RecordKey;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

/// Queue shared between the scheduler and every record's observer
pub type SharedQueue = Rc<RefCell<InvalidationQueue>>;

/// FIFO in which each record appears at most once
#[derive(Debug, Default)]
pub struct InvalidationQueue {
    order: VecDeque<RecordKey>,
    queued: HashSet<RecordKey>,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue behind a shared handle
    pub fn shared() -> SharedQueue {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Enqueue a record; returns false if it was already queued
    pub fn push(&mut self, record: RecordKey) -> bool {
        if !self.queued.insert(record) {
            return false;
        }
        self.order.push_back(record);
        true
    }

    /// Dequeue the oldest record
    pub fn pop(&mut self) -> Option<RecordKey> {
        let record = self.order.pop_front()?;
        self.queued.remove(&record);
        Some(record)
    }

    pub fn contains(&self, record: RecordKey) -> bool {
        self.queued.contains(&record)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<RecordKey> {
        let mut map: SlotMap<RecordKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_push_deduplicates() {
        let k = keys(1)[0];
        let mut queue = InvalidationQueue::new();
        assert!(queue.push(k));
        assert!(!queue.push(k));
        assert!(!queue.push(k));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(k));
    }

    #[test]
    fn test_fifo_order() {
        let k = keys(3);
        let mut queue = InvalidationQueue::new();
        queue.push(k[2]);
        queue.push(k[0]);
        queue.push(k[1]);
        queue.push(k[2]);
        assert_eq!(queue.pop(), Some(k[2]));
        assert_eq!(queue.pop(), Some(k[0]));
        assert_eq!(queue.pop(), Some(k[1]));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_requeue_after_pop() {
        let k = keys(1)[0];
        let mut queue = InvalidationQueue::new();
        queue.push(k);
        queue.pop();
        assert!(!queue.contains(k));
        assert!(queue.push(k));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear() {
        let k = keys(2);
        let mut queue = InvalidationQueue::new();
        queue.push(k[0]);
        queue.push(k[1]);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.push(k[0]));
    }
}
