/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the [`Proposer`](super::implementation::Proposer).

use std::time::Duration;

use crate::{
    membership::{AcceptorSet, QuorumCollector},
    types::{
        ballot::{Ballot, Vote},
        command::Command,
        data_types::Instance,
    },
};

#[derive(Clone, Debug)]
pub struct ProposerConfiguration {
    pub acceptors: AcceptorSet,
    pub pipeline_window: usize,
    pub initial_ballot_counter: u64,
    pub no_progress_warning_after: u32,
    pub phase_timeout: Duration,
    pub max_phase_timeout: Duration,
    pub retry_backoff: Duration,
}

/// The proposer's state for one in-flight instance.
pub(crate) struct InstanceAttempt {
    /// The ballot of the current (or, while backing off, the last) attempt.
    pub(crate) ballot: Ballot,
    /// The command this proposer wants decided in the instance.
    pub(crate) candidate: Command,
    pub(crate) phase: Phase,
    /// Number of failed attempts so far.
    pub(crate) failed_attempts: u32,
    /// Identifies the timer that is currently armed for the instance. Timers carrying any other
    /// generation are stale.
    pub(crate) generation: u64,
}

pub(crate) enum Phase {
    Preparing {
        promises: QuorumCollector<Option<Vote>>,
    },
    Accepting {
        value: Command,
        accepts: QuorumCollector<()>,
    },
    Backoff,
}

impl Phase {
    pub(crate) fn kind(&self) -> PhaseKind {
        match self {
            Phase::Preparing { .. } => PhaseKind::Preparing,
            Phase::Accepting { .. } => PhaseKind::Accepting,
            Phase::Backoff => PhaseKind::Backoff,
        }
    }
}

/// Key of a proposer timer. See [`InstanceAttempt::generation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ProposerTimer {
    pub(crate) instance: Instance,
    pub(crate) generation: u64,
}

/// Which step of the protocol an in-flight instance is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKind {
    /// Phase1a sent, collecting promises.
    Preparing,
    /// Phase2a sent, collecting accepts.
    Accepting,
    /// Waiting for the backoff delay to pass before a new attempt.
    Backoff,
}

/// A read-only view of an in-flight instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptStatus {
    pub ballot: Ballot,
    pub phase: PhaseKind,
    pub candidate: Command,
    pub failed_attempts: u32,
}

/// Enumerates the ways processing a message can fail for a proposer.
#[derive(Debug)]
pub enum ProposerError {
    /// Two different values were reported as decided for `instance`. The proposer must stop.
    ConsistencyViolation {
        instance: Instance,
        recorded: Command,
        received: Command,
    },
}
