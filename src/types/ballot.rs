/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Ballots (rounds) and the votes acceptors cast in them.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{command::Command, data_types::ProposerID};

/// A round identifier that a proposer uses to stake a claim on an instance.
///
/// Ballots are totally ordered: first by `counter`, then by `proposer`. Because every proposer has a
/// distinct [`ProposerID`], two proposers can never produce the same ballot, even when their counters
/// coincide.
///
/// The derived ordering relies on the field order below.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Ballot {
    counter: u64,
    proposer: ProposerID,
}

impl Ballot {
    /// The ballot every acceptor record starts with. No proposer ever uses it.
    pub const ZERO: Ballot = Ballot {
        counter: 0,
        proposer: ProposerID::new(0),
    };

    pub const fn new(counter: u64, proposer: ProposerID) -> Self {
        Self { counter, proposer }
    }

    pub const fn counter(&self) -> u64 {
        self.counter
    }

    pub const fn proposer(&self) -> ProposerID {
        self.proposer
    }
}

impl Default for Ballot {
    fn default() -> Self {
        Ballot::ZERO
    }
}

impl Display for Ballot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.counter, self.proposer)
    }
}

/// A value an acceptor has accepted, together with the ballot it accepted it in (`vRnd`, `vVal`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Vote {
    pub ballot: Ballot,
    pub value: Command,
}

impl Vote {
    pub fn new(ballot: Ballot, value: Command) -> Self {
        Self { ballot, value }
    }
}
