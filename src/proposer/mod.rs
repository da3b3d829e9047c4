/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The role that drives instances to a decision.
//!
//! ## Attempts
//!
//! A proposer assigns each client command to the lowest instance it does not know to be decided and is
//! not already working on, then runs attempts on that instance until it is decided:
//! 1. **Prepare**: pick a fresh ballot `b`, strictly greater than every ballot seen for the instance,
//!    and broadcast a [`Phase1a`](crate::networking::messages::Phase1a) to the acceptors.
//! 2. **Promise**: collect [`Phase1b`](crate::networking::messages::Phase1b)s in `b` until a quorum of
//!    acceptors has promised. If any of them reported a vote, the value of the vote with the highest
//!    ballot must be proposed. Otherwise the proposer's own command is proposed.
//! 3. **Accept**: broadcast a [`Phase2a`](crate::networking::messages::Phase2a) and collect
//!    [`Phase2b`](crate::networking::messages::Phase2b)s in `b`.
//! 4. **Decide**: once a quorum has accepted, broadcast a
//!    [`Decision`](crate::networking::messages::Decision) to learners, acceptors and proposers.
//!
//! A reply in a higher ballot preempts the attempt, and so does a phase deadline passing without a
//! quorum. In both cases the proposer backs off for a delay given by its
//! [`RetryPolicy`](crate::retry::RetryPolicy) and starts again at step 1.
//!
//! ## Pipelining
//!
//! Up to `pipeline_window` instances are in flight at once, each with its own attempt. If an instance
//! is decided with a value other than the proposer's command, for example because a competing proposer
//! won it, the command goes back to the front of the queue and is assigned to a later instance.

pub mod implementation;

pub mod types;
