/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A min-heap of pending deadlines, polled by a role's event loop.
//!
//! Timers are never removed from the queue. Each key carries whatever the owner needs to tell whether
//! the timer is still current (e.g., a generation number), and the owner ignores stale keys when they
//! expire.

use std::{cmp::Reverse, collections::BinaryHeap, time::Instant};

pub(crate) struct DeadlineQueue<K: Ord> {
    heap: BinaryHeap<Reverse<(Instant, K)>>,
}

impl<K: Ord> DeadlineQueue<K> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, deadline: Instant, key: K) {
        self.heap.push(Reverse((deadline, key)))
    }

    /// Get the earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Remove and return the key of the earliest timer if its deadline is at or before `now`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<K> {
        if self.next_deadline()? <= now {
            self.heap.pop().map(|Reverse((_, key))| key)
        } else {
            None
        }
    }
}

#[test]
fn deadline_queue_pops_in_deadline_order() {
    use std::time::Duration;

    let start = Instant::now();
    let mut queue = DeadlineQueue::new();
    queue.push(start + Duration::from_millis(30), "c");
    queue.push(start + Duration::from_millis(10), "a");
    queue.push(start + Duration::from_millis(20), "b");

    assert_eq!(queue.next_deadline(), Some(start + Duration::from_millis(10)));
    assert_eq!(queue.pop_expired(start), None);
    assert_eq!(queue.pop_expired(start + Duration::from_millis(25)), Some("a"));
    assert_eq!(queue.pop_expired(start + Duration::from_millis(25)), Some("b"));
    assert_eq!(queue.pop_expired(start + Duration::from_millis(25)), None);
    assert_eq!(queue.pop_expired(start + Duration::from_millis(30)), Some("c"));
}
