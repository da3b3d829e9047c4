/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the [`Acceptor`](super::implementation::Acceptor).

use std::{collections::BTreeSet, time::Duration};

use crate::{
    membership::AcceptorSet,
    types::{
        ballot::{Ballot, Vote},
        command::Command,
        data_types::{AcceptorID, Instance},
    },
};

/// The state an acceptor keeps for one instance.
///
/// `accepted` holds both `vRnd` and `vVal`, so they are always either both present or both absent. The
/// acceptor only ever stores a vote whose ballot equals `rnd` at the time, so `vRnd ≤ rnd` holds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptorRecord {
    pub(crate) rnd: Ballot,
    pub(crate) accepted: Option<Vote>,
}

impl AcceptorRecord {
    /// The highest ballot promised for the instance.
    pub fn rnd(&self) -> Ballot {
        self.rnd
    }

    /// The last vote cast for the instance, if any.
    pub fn accepted(&self) -> Option<&Vote> {
        self.accepted.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct AcceptorConfiguration {
    pub acceptors: AcceptorSet,
    pub phase2b_to_learners: bool,
    pub catchup_limit: u32,
    /// Upper bound on the size of an encoded catch-up response frame.
    pub max_catchup_response_size: usize,
    pub catchup_timeout: Duration,
    pub recovery: bool,
}

/// A recovery request that has been sent to the other acceptors and is waiting for their responses.
pub(crate) struct RecoveryRound {
    pub(crate) id: u64,
    pub(crate) from: Instance,
    pub(crate) responders: BTreeSet<AcceptorID>,
    /// Where the next page starts, if some responder cut its decision log short.
    pub(crate) resume_from: Option<Instance>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AcceptorTimer {
    /// Re-send the recovery request of round `round` if it is still running.
    RecoveryRetry { round: u64 },
}

/// Enumerates the ways processing a message can fail for an acceptor.
#[derive(Debug)]
pub enum AcceptorError {
    /// Two different values were reported as decided for `instance`. The acceptor must stop.
    ConsistencyViolation {
        instance: Instance,
        recorded: Command,
        received: Command,
    },
}
