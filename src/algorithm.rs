/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The algorithm thread, which drives a single role.
//!
//! The algorithm thread owns the node's [`Acceptor`], [`Proposer`], or [`Learner`], and is the only
//! thread that touches it. It repeatedly:
//! 1. Checks for a shutdown signal.
//! 2. Waits for a message from the poller until the role's next deadline, or for at most
//!    `tick_interval`, whichever comes first.
//! 3. Hands the message, if any, to the role.
//! 4. Ticks the role, which fires every timer that has expired.
//!
//! If the role reports an error, the thread logs it, marks the node as
//! [halted](crate::node::Node::is_halted), and processes nothing more until it is shut down.

use std::{
    cmp::min,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    acceptor::{implementation::Acceptor, types::AcceptorError},
    learner::{implementation::Learner, types::LearnerError},
    networking::{messages::Message, network::Network},
    proposer::{implementation::Proposer, types::ProposerError},
};

/// The role run by a node.
pub(crate) enum RoleState<N: Network> {
    Acceptor(Acceptor<N>),
    Proposer(Proposer<N>),
    Learner(Learner<N>),
}

impl<N: Network> RoleState<N> {
    fn start(&mut self, now: Instant) {
        match self {
            RoleState::Acceptor(acceptor) => acceptor.start(now),
            RoleState::Proposer(_) => (),
            RoleState::Learner(learner) => learner.start(now),
        }
    }

    fn on_receive_msg(&mut self, msg: Message, now: Instant) -> Result<(), RoleError> {
        match self {
            RoleState::Acceptor(acceptor) => Ok(acceptor.on_receive_msg(msg, now)?),
            RoleState::Proposer(proposer) => Ok(proposer.on_receive_msg(msg, now)?),
            RoleState::Learner(learner) => Ok(learner.on_receive_msg(msg, now)?),
        }
    }

    fn tick(&mut self, now: Instant) {
        match self {
            RoleState::Acceptor(acceptor) => acceptor.tick(now),
            RoleState::Proposer(proposer) => proposer.tick(now),
            RoleState::Learner(learner) => learner.tick(now),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self {
            RoleState::Acceptor(acceptor) => acceptor.next_deadline(),
            RoleState::Proposer(proposer) => proposer.next_deadline(),
            RoleState::Learner(learner) => learner.next_deadline(),
        }
    }
}

/// An error returned by a role. Every variant is fatal for the node.
#[derive(Debug)]
pub(crate) enum RoleError {
    Acceptor(AcceptorError),
    Proposer(ProposerError),
    Learner(LearnerError),
}

impl From<AcceptorError> for RoleError {
    fn from(value: AcceptorError) -> Self {
        RoleError::Acceptor(value)
    }
}

impl From<ProposerError> for RoleError {
    fn from(value: ProposerError) -> Self {
        RoleError::Proposer(value)
    }
}

impl From<LearnerError> for RoleError {
    fn from(value: LearnerError) -> Self {
        RoleError::Learner(value)
    }
}

pub(crate) struct Algorithm<N: Network + 'static> {
    role: RoleState<N>,
    messages: Receiver<Message>,
    tick_interval: Duration,
    halted: Arc<AtomicBool>,
    shutdown_signal: Receiver<()>,
}

impl<N: Network + 'static> Algorithm<N> {
    pub(crate) fn new(
        role: RoleState<N>,
        messages: Receiver<Message>,
        tick_interval: Duration,
        halted: Arc<AtomicBool>,
        shutdown_signal: Receiver<()>,
    ) -> Self {
        Self {
            role,
            messages,
            tick_interval,
            halted,
            shutdown_signal,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            self.role.start(Instant::now());

            loop {
                match self.shutdown_signal.try_recv() {
                    Ok(()) => return,
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        panic!("Algorithm thread disconnected from main thread")
                    }
                }

                let now = Instant::now();
                let wait_until = match self.role.next_deadline() {
                    Some(deadline) => min(deadline, now + self.tick_interval),
                    None => now + self.tick_interval,
                };

                match self
                    .messages
                    .recv_timeout(wait_until.saturating_duration_since(now))
                {
                    Ok(msg) => {
                        if let Err(err) = self.role.on_receive_msg(msg, Instant::now()) {
                            self.halt(err);
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => (),
                    Err(RecvTimeoutError::Disconnected) => {
                        panic!("Algorithm thread disconnected from poller thread")
                    }
                }

                self.role.tick(Instant::now());
            }
        })
    }

    /// Stop processing for good, then wait for the shutdown signal so that the main thread can still
    /// deliver it.
    fn halt(&self, err: RoleError) {
        log::error!("Halting after an unrecoverable error: {:?}", err);
        self.halted.store(true, Ordering::SeqCst);
        let _ = self.shutdown_signal.recv();
    }
}
