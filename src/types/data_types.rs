/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, AddAssign},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Identifies one instance (slot) of the single-decree Paxos protocol.
///
/// Instances are decided independently of each other, but learners expose them to the application
/// in increasing order, starting at `Instance::new(0)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Instance(u64);

impl Instance {
    /// Create a new `Instance` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Instance`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// The instance directly after this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for Instance {
    type Output = Instance;
    fn add(self, rhs: u64) -> Self::Output {
        Instance::new(self.0.saturating_add(rhs))
    }
}

impl AddAssign<u64> for Instance {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs)
    }
}

/// Identifies a proposer. Used to break ties between [`Ballot`](super::ballot::Ballot)s with equal
/// counters, so every proposer must be configured with a distinct `ProposerID`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ProposerID(u32);

impl ProposerID {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for ProposerID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies an acceptor in the [`AcceptorSet`](crate::membership::AcceptorSet).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct AcceptorID(u32);

impl AcceptorID {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for AcceptorID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a learner. Learners never appear in protocol messages, so this is only used to label
/// nodes and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LearnerID(u32);

impl LearnerID {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for LearnerID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a client. Together with a [`Sequence`] it forms the idempotency key of a
/// [`Command`](super::command::Command).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ClientID(u32);

impl ClientID {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for ClientID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Per-client sequence number of a command.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Sequence(u64);

impl Sequence {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for Sequence {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs)
    }
}

#[test]
fn instance_and_sequence_arithmetic_saturates() {
    let last = Instance::new(u64::MAX);
    assert_eq!(last.next(), last);
    assert_eq!(last + 1, last);
    assert_eq!(Instance::new(u64::MAX - 1) + 5, last);

    let mut instance = Instance::new(u64::MAX - 2);
    instance += 10;
    assert_eq!(instance, last);

    let mut instance = Instance::new(3);
    instance += 4;
    assert_eq!(instance, Instance::new(7));
    assert_eq!(Instance::new(3) + 4, Instance::new(7));

    let mut sequence = Sequence::new(u64::MAX);
    sequence += 1;
    assert_eq!(sequence, Sequence::new(u64::MAX));
}
