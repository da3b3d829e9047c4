/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events emitted by the roles, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Handlers for events can be
//! registered on a [`NodeSpec`](crate::node::NodeSpec), and are run on a separate event bus thread.

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::types::{
    ballot::Ballot,
    command::Command,
    data_types::Instance,
};

pub enum Event {
    // Acceptor events.
    Promise(PromiseEvent),
    Accept(AcceptEvent),
    Reject(RejectEvent),
    ServeCatchup(ServeCatchupEvent),
    // Proposer events.
    ReceiveCommand(ReceiveCommandEvent),
    Prepare(PrepareEvent),
    RequestAccept(RequestAcceptEvent),
    Decide(DecideEvent),
    Preempt(PreemptEvent),
    PhaseTimeout(PhaseTimeoutEvent),
    NoProgress(NoProgressEvent),
    Requeue(RequeueEvent),
    // Events that record or deliver decisions.
    Learn(LearnEvent),
    Deliver(DeliverEvent),
    StartCatchup(StartCatchupEvent),
    EndCatchup(EndCatchupEvent),
    ConsistencyViolation(ConsistencyViolationEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus is shut down before the algorithm thread, so late events are dropped.
            let _ = event_publisher.send(event);
        }
    }
}

/// An acceptor promised `ballot` for `instance`, and replied with a Phase1b.
pub struct PromiseEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
}

/// An acceptor accepted `value` in `ballot`, and replied with a Phase2b.
pub struct AcceptEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
    pub value: Command,
}

/// An acceptor ignored a Phase1a or Phase2a for `ballot` because it had promised `promised`.
pub struct RejectEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
    pub promised: Ballot,
}

/// An acceptor answered a catch-up request.
pub struct ServeCatchupEvent {
    pub timestamp: SystemTime,
    pub from: Instance,
    pub decided: usize,
    pub accepted: usize,
}

/// A proposer queued a client command.
pub struct ReceiveCommandEvent {
    pub timestamp: SystemTime,
    pub command: Command,
}

/// A proposer broadcasted a Phase1a.
pub struct PrepareEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
}

/// A proposer gathered a quorum of promises and broadcasted a Phase2a. `adopted` is true if `value` was
/// taken from a promise instead of being the proposer's own command.
pub struct RequestAcceptEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
    pub value: Command,
    pub adopted: bool,
}

/// A proposer gathered a quorum of Phase2b's and broadcasted a Decision.
pub struct DecideEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
    pub value: Command,
}

/// A proposer abandoned its attempt in `ballot` after observing the higher ballot `observed`.
pub struct PreemptEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
    pub observed: Ballot,
}

/// A proposer's attempt in `ballot` did not gather a quorum before its phase deadline.
pub struct PhaseTimeoutEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub ballot: Ballot,
    pub attempt: u32,
}

/// A proposer has failed `attempts` consecutive attempts on `instance`. It keeps trying.
pub struct NoProgressEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub attempts: u32,
}

/// `instance` was decided with a value other than the proposer's `command`, which was put back in the
/// pending queue.
pub struct RequeueEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub command: Command,
}

/// A learner or acceptor recorded the decision of `instance` for the first time.
pub struct LearnEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub value: Command,
}

/// A learner delivered `instance` to the application. `duplicate` is true if the command was already
/// delivered at an earlier instance, in which case the application was not called.
pub struct DeliverEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub value: Command,
    pub duplicate: bool,
}

/// A learner or acceptor broadcasted a catch-up request starting at `from`.
pub struct StartCatchupEvent {
    pub timestamp: SystemTime,
    pub from: Instance,
}

/// A catch-up round ended after `responders` acceptors answered.
///
/// For a learner, `next_to_deliver` is its delivery cursor. For a recovering acceptor, it is the
/// instance after the highest decision it has recorded.
pub struct EndCatchupEvent {
    pub timestamp: SystemTime,
    pub next_to_deliver: Instance,
    pub responders: usize,
}

/// Two different values were observed as decided for the same instance. The role that observed this
/// stops.
pub struct ConsistencyViolationEvent {
    pub timestamp: SystemTime,
    pub instance: Instance,
    pub recorded: Command,
    pub received: Command,
}
