/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The role that turns decisions into an ordered stream for the application.
//!
//! A learner records every [`Decision`](crate::networking::messages::Decision) it hears of, and
//! delivers recorded instances to its [`App`](crate::app::App) strictly in order, buffering instances
//! that arrive ahead of a gap.
//!
//! ## Catch-up
//!
//! A learner that starts late, or that has had a gap for longer than `catchup_timeout`, asks the
//! acceptors for their history with a [`CatchupRequest`](crate::networking::messages::CatchupRequest).
//! Each acceptor answers with its decision log and its votes for instances it has no decision for.
//! - Entries from a decision log are trusted, since every one of them was broadcast by a proposer that
//!   saw a quorum accept the value.
//! - A vote is trusted only once a quorum of distinct acceptors has reported the same ballot and value
//!   for the instance, which is exactly the condition for the value being chosen. A vote reported by
//!   fewer acceptors may belong to a ballot that never reached a quorum, and is kept aside.
//!
//! A catch-up round ends once a quorum of acceptors has answered, and is re-sent if that has not
//! happened within `catchup_timeout`.

pub mod implementation;

pub mod types;
