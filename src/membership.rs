/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The static set of acceptors, and quorum computations over it.
//!
//! Safety in Paxos comes entirely from quorum intersection: any two majorities of the same
//! [`AcceptorSet`] share at least one acceptor. The set is supplied once at startup and never changes
//! for the lifetime of a node.

use std::slice;

use crate::types::data_types::AcceptorID;

/// Compute the size of a majority quorum over `n` acceptors, i.e., `⌊n/2⌋ + 1`.
pub const fn quorum_size(n: usize) -> usize {
    n / 2 + 1
}

/// The static, ordered set of acceptors known to every role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptorSet {
    // Sorted and free of duplicates.
    acceptors: Vec<AcceptorID>,
}

impl AcceptorSet {
    /// Create an `AcceptorSet` from a list of acceptor ids. Duplicates are merged.
    pub fn new(acceptors: impl IntoIterator<Item = AcceptorID>) -> Result<Self, MembershipError> {
        let mut acceptors: Vec<AcceptorID> = acceptors.into_iter().collect();
        acceptors.sort();
        acceptors.dedup();
        if acceptors.is_empty() {
            return Err(MembershipError::Empty);
        }
        Ok(Self { acceptors })
    }

    /// Create an `AcceptorSet` with the ids `0..n`.
    pub fn with_size(n: u32) -> Result<Self, MembershipError> {
        Self::new((0..n).map(AcceptorID::new))
    }

    /// Get the number of acceptors in the set.
    pub fn len(&self) -> usize {
        self.acceptors.len()
    }

    /// Always false: construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.acceptors.is_empty()
    }

    /// Get the number of distinct acceptors that make up a quorum of this set.
    pub fn quorum(&self) -> usize {
        quorum_size(self.len())
    }

    pub fn contains(&self, acceptor: &AcceptorID) -> bool {
        self.position(acceptor).is_some()
    }

    /// Get the position of `acceptor` in the sorted set.
    pub fn position(&self, acceptor: &AcceptorID) -> Option<usize> {
        self.acceptors.binary_search(acceptor).ok()
    }

    /// Iterate through the acceptors in ascending order.
    pub fn iter(&self) -> slice::Iter<AcceptorID> {
        self.acceptors.iter()
    }
}

/// Collects one item per distinct acceptor of an [`AcceptorSet`] until a quorum has been reached.
///
/// [`collect`](Self::collect) returns the collected items exactly once: on the call that brings the
/// number of distinct acceptors up to the quorum size. Items from acceptors outside the set, and
/// repeated items from an acceptor that has already been collected, are ignored. This makes the
/// collector insensitive to duplicated and reordered replies.
#[derive(Clone, Debug)]
pub struct QuorumCollector<T> {
    acceptors: AcceptorSet,
    items: Vec<Option<T>>,
    collected: usize,
}

impl<T: Clone> QuorumCollector<T> {
    pub fn new(acceptors: AcceptorSet) -> Self {
        let n = acceptors.len();
        Self {
            acceptors,
            items: vec![None; n],
            collected: 0,
        }
    }

    /// Collect `item` from `acceptor`, returning every collected `(acceptor, item)` pair if this call
    /// completed a quorum.
    pub fn collect(&mut self, acceptor: AcceptorID, item: T) -> Option<Vec<(AcceptorID, T)>> {
        let pos = self.acceptors.position(&acceptor)?;
        if self.items[pos].is_some() {
            return None;
        }

        self.items[pos] = Some(item);
        self.collected += 1;

        if self.collected == self.acceptors.quorum() {
            Some(
                self.acceptors
                    .iter()
                    .zip(self.items.iter())
                    .filter_map(|(acceptor, item)| item.clone().map(|item| (*acceptor, item)))
                    .collect(),
            )
        } else {
            None
        }
    }

    /// Get the number of distinct acceptors collected so far.
    pub fn len(&self) -> usize {
        self.collected
    }

    pub fn is_empty(&self) -> bool {
        self.collected == 0
    }

    /// Check whether a quorum has been collected.
    pub fn has_quorum(&self) -> bool {
        self.collected >= self.acceptors.quorum()
    }
}

/// Enumerates the ways constructing an [`AcceptorSet`] can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum MembershipError {
    /// An acceptor set must contain at least one acceptor.
    Empty,
}
