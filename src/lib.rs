/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! paxos_rs is a Rust implementation of multi-instance Paxos. It offers:
//! 1. Agreement on one value per instance, across any number of concurrently decided instances, as long
//!    as messages are not corrupted and decisions are never forged,
//! 2. Separate [acceptor], [proposer], and [learner] roles, each usable on its own in an event-oriented
//!    fashion, or run on a threaded [node],
//! 3. A small API [app::App] for consuming decided commands in order,
//! 4. Pluggable [networking], with a UDP implementation included.

pub mod acceptor;

pub mod app;

pub mod client;

pub mod events;

pub mod learner;

pub mod logging;

pub mod membership;

pub mod networking;

pub mod node;

pub mod proposer;

pub mod retry;

pub mod types;

pub(crate) mod algorithm;

pub(crate) mod event_bus;

pub(crate) mod timers;
