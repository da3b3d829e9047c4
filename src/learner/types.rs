/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the [`Learner`](super::implementation::Learner).

use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use crate::{
    membership::AcceptorSet,
    types::{
        command::Command,
        data_types::{AcceptorID, Instance},
    },
};

#[derive(Clone, Debug)]
pub struct LearnerConfiguration {
    pub acceptors: AcceptorSet,
    pub catchup_timeout: Duration,
    pub catchup_limit: u32,
}

/// A catch-up request that has been sent and is waiting for a quorum of responses.
pub(crate) struct CatchupRound {
    pub(crate) id: u64,
    /// `next_to_deliver` when the round started.
    pub(crate) from: Instance,
    pub(crate) responders: BTreeSet<AcceptorID>,
    /// Whether any responder had more entries than it could send.
    pub(crate) truncated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LearnerTimer {
    /// Re-send the catch-up request of round `round` if it is still running.
    CatchupRetry { round: u64 },
    /// Start catching up if the gap first observed at `since` is still open.
    GapCheck { since: Instant },
}

/// Enumerates the ways processing a message can fail for a learner.
#[derive(Debug)]
pub enum LearnerError {
    /// Two different values were reported as decided for `instance`. The learner must stop.
    ConsistencyViolation {
        instance: Instance,
        recorded: Command,
        received: Command,
    },
}
