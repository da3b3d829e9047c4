/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the learner role.
//!
//! Main type: [`Learner`].

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use crate::{
    app::App,
    events::{
        ConsistencyViolationEvent, DeliverEvent, EndCatchupEvent, Event, LearnEvent,
        StartCatchupEvent,
    },
    networking::{
        messages::{CatchupRequest, CatchupResponse, Group, Message},
        network::Network,
        sending::SenderHandle,
    },
    timers::DeadlineQueue,
    types::{
        ballot::Vote,
        command::{Command, CommandKey},
        data_types::{AcceptorID, Instance, LearnerID},
    },
};

use super::types::{CatchupRound, LearnerConfiguration, LearnerError, LearnerTimer};

/// A single learner.
///
/// # Usage
///
/// After creating a `Learner` with [`new`](Self::new), call [`start`](Self::start) once, which sends
/// the initial catch-up request. Then call [`on_receive_msg`](Self::on_receive_msg) for every message
/// received, and [`tick`](Self::tick) whenever [`next_deadline`](Self::next_deadline) has passed.
pub struct Learner<N: Network> {
    id: LearnerID,
    config: LearnerConfiguration,
    app: Option<Box<dyn App>>,

    log: BTreeMap<Instance, Command>,
    next_to_deliver: Instance,
    delivered_keys: HashSet<CommandKey>,

    /// Acceptors that reported each vote, for instances not yet in the log.
    reports: BTreeMap<Instance, BTreeMap<Vote, BTreeSet<AcceptorID>>>,

    catchup: Option<CatchupRound>,
    next_round: u64,
    gap_since: Option<Instant>,
    timers: DeadlineQueue<LearnerTimer>,

    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> Learner<N> {
    pub fn new(
        id: LearnerID,
        config: LearnerConfiguration,
        app: Option<Box<dyn App>>,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            id,
            config,
            app,
            log: BTreeMap::new(),
            next_to_deliver: Instance::new(0),
            delivered_keys: HashSet::new(),
            reports: BTreeMap::new(),
            catchup: None,
            next_round: 0,
            gap_since: None,
            timers: DeadlineQueue::new(),
            sender: SenderHandle::new(network),
            event_publisher,
        }
    }

    /// Ask the acceptors for everything decided so far.
    pub fn start(&mut self, now: Instant) {
        self.start_catchup(now);
    }

    pub fn on_receive_msg(&mut self, msg: Message, now: Instant) -> Result<(), LearnerError> {
        match msg {
            Message::Decision(decision) => self.record(decision.instance, decision.value)?,
            Message::Phase2b(phase2b) => self.on_vote_report(
                phase2b.instance,
                phase2b.acceptor,
                Vote::new(phase2b.ballot, phase2b.value),
            )?,
            Message::CatchupResponse(response) => {
                return self.on_receive_catchup_response(response, now)
            }
            Message::Phase1a(_)
            | Message::Phase1b(_)
            | Message::Phase2a(_)
            | Message::Propose(_)
            | Message::CatchupRequest(_) => return Ok(()),
        }
        self.deliver(now);
        Ok(())
    }

    /// Handle every timer that has expired by `now`.
    pub fn tick(&mut self, now: Instant) {
        while let Some(timer) = self.timers.pop_expired(now) {
            match timer {
                LearnerTimer::CatchupRetry { round } => {
                    if self.catchup.as_ref().map_or(false, |catchup| catchup.id == round) {
                        self.start_catchup(now);
                    }
                }
                LearnerTimer::GapCheck { since } => {
                    if self.gap_since == Some(since) {
                        if self.catchup.is_none() {
                            self.start_catchup(now);
                        }
                        self.timers
                            .push(now + self.config.catchup_timeout, LearnerTimer::GapCheck { since });
                    }
                }
            }
        }
    }

    /// Get the earliest time at which [`tick`](Self::tick) may have something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn id(&self) -> LearnerID {
        self.id
    }

    /// Get the lowest instance not yet delivered to the application.
    pub fn next_to_deliver(&self) -> Instance {
        self.next_to_deliver
    }

    /// Get the value recorded as decided for `instance`, whether or not it has been delivered.
    pub fn decision(&self, instance: Instance) -> Option<&Command> {
        self.log.get(&instance)
    }

    /// Check whether a catch-up round is waiting for responses.
    pub fn is_catching_up(&self) -> bool {
        self.catchup.is_some()
    }

    fn on_receive_catchup_response(
        &mut self,
        response: CatchupResponse,
        now: Instant,
    ) -> Result<(), LearnerError> {
        if !self.config.acceptors.contains(&response.acceptor) {
            return Ok(());
        }

        for decision in response.decided {
            self.record(decision.instance, decision.value)?;
        }
        for (instance, vote) in response.accepted {
            self.on_vote_report(instance, response.acceptor, vote)?;
        }
        self.deliver(now);

        let quorum = self.config.acceptors.quorum();
        let round_complete = match &mut self.catchup {
            Some(round) => {
                round.responders.insert(response.acceptor);
                round.truncated |= response.truncated;
                round.responders.len() >= quorum
            }
            None => false,
        };

        if round_complete {
            if let Some(round) = self.catchup.take() {
                Event::publish(
                    &self.event_publisher,
                    Event::EndCatchup(EndCatchupEvent {
                        timestamp: SystemTime::now(),
                        next_to_deliver: self.next_to_deliver,
                        responders: round.responders.len(),
                    }),
                );

                // Some acceptor had more to send. Ask again from where delivery now stands, unless the
                // last round did not move it.
                if round.truncated && self.next_to_deliver > round.from {
                    self.start_catchup(now);
                }
            }
        }

        Ok(())
    }

    /// Count `acceptor`'s report of having accepted `vote` in `instance`, and record the vote's value as
    /// decided once a quorum of acceptors has reported the same vote.
    fn on_vote_report(
        &mut self,
        instance: Instance,
        acceptor: AcceptorID,
        vote: Vote,
    ) -> Result<(), LearnerError> {
        if self.log.contains_key(&instance) || !self.config.acceptors.contains(&acceptor) {
            return Ok(());
        }

        let reporters = self
            .reports
            .entry(instance)
            .or_default()
            .entry(vote.clone())
            .or_default();
        reporters.insert(acceptor);

        if reporters.len() >= self.config.acceptors.quorum() {
            self.record(instance, vote.value)?;
        }
        Ok(())
    }

    fn record(&mut self, instance: Instance, value: Command) -> Result<(), LearnerError> {
        match self.log.get(&instance) {
            Some(recorded) if *recorded == value => Ok(()),
            Some(recorded) => {
                Event::publish(
                    &self.event_publisher,
                    Event::ConsistencyViolation(ConsistencyViolationEvent {
                        timestamp: SystemTime::now(),
                        instance,
                        recorded: recorded.clone(),
                        received: value.clone(),
                    }),
                );
                Err(LearnerError::ConsistencyViolation {
                    instance,
                    recorded: recorded.clone(),
                    received: value,
                })
            }
            None => {
                self.log.insert(instance, value.clone());
                self.reports.remove(&instance);
                Event::publish(
                    &self.event_publisher,
                    Event::Learn(LearnEvent {
                        timestamp: SystemTime::now(),
                        instance,
                        value,
                    }),
                );
                Ok(())
            }
        }
    }

    /// Deliver every contiguous recorded instance from `next_to_deliver` on, then track whether a gap
    /// is holding back buffered instances.
    fn deliver(&mut self, now: Instant) {
        while let Some(value) = self.log.get(&self.next_to_deliver) {
            let instance = self.next_to_deliver;
            let duplicate = !self.delivered_keys.insert(value.key());
            if !duplicate {
                if let Some(app) = &mut self.app {
                    app.deliver(instance, value);
                }
            }

            Event::publish(
                &self.event_publisher,
                Event::Deliver(DeliverEvent {
                    timestamp: SystemTime::now(),
                    instance,
                    value: value.clone(),
                    duplicate,
                }),
            );

            self.next_to_deliver = instance.next();
        }

        let has_gap = self.log.range(self.next_to_deliver..).next().is_some();
        if !has_gap {
            self.gap_since = None;
        } else if self.gap_since.is_none() {
            self.gap_since = Some(now);
            self.timers.push(
                now + self.config.catchup_timeout,
                LearnerTimer::GapCheck { since: now },
            );
        }
    }

    fn start_catchup(&mut self, now: Instant) {
        self.next_round += 1;
        let round = self.next_round;
        let from = self.next_to_deliver;

        self.catchup = Some(CatchupRound {
            id: round,
            from,
            responders: BTreeSet::new(),
            truncated: false,
        });

        self.sender.broadcast(
            Group::Acceptors,
            CatchupRequest {
                from,
                limit: self.config.catchup_limit,
                reply_to: Group::Learners,
            },
        );
        self.timers.push(
            now + self.config.catchup_timeout,
            LearnerTimer::CatchupRetry { round },
        );

        Event::publish(
            &self.event_publisher,
            Event::StartCatchup(StartCatchupEvent {
                timestamp: SystemTime::now(),
                from,
            }),
        );
    }
}
