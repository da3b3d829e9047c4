/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The role that enforces safety.
//!
//! An acceptor keeps, per instance, the highest ballot it has promised (`rnd`) and the last vote it
//! cast (`vRnd`, `vVal`). It answers exactly two protocol requests:
//! 1. [`Phase1a`](crate::networking::messages::Phase1a) in ballot `b`: if `b > rnd`, promise `b` and
//!    reply with the vote it holds. Otherwise, stay silent.
//! 2. [`Phase2a`](crate::networking::messages::Phase2a) in ballot `b`: if `b >= rnd`, accept the value
//!    in `b` and reply. Otherwise, stay silent.
//!
//! Every other role's correctness depends on acceptors obeying these two comparisons.
//!
//! Besides its votes, an acceptor keeps a log of the decisions proposers broadcast to it, and serves
//! both the log and its votes to learners (and recovering acceptors) that ask for them through a
//! [`CatchupRequest`](crate::networking::messages::CatchupRequest). An acceptor configured to recover
//! pages through the decision logs of its peers on start, re-sending requests that go unanswered.
//!
//! Acceptor state lives in memory only. An acceptor that restarts forgets its promises and votes, so at
//! most a minority of acceptors may restart at any one time.

pub mod implementation;

pub mod types;
