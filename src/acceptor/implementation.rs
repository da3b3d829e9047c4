/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the acceptor role.
//!
//! Main type: [`Acceptor`].

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use crate::{
    events::{
        AcceptEvent, ConsistencyViolationEvent, EndCatchupEvent, Event, LearnEvent, PromiseEvent,
        RejectEvent, ServeCatchupEvent, StartCatchupEvent,
    },
    networking::{
        messages::{
            encoded_len, CatchupRequest, CatchupResponse, Decision, Group, Message, Phase1a,
            Phase1b, Phase2a, Phase2b,
        },
        network::Network,
        sending::SenderHandle,
    },
    timers::DeadlineQueue,
    types::{
        ballot::Vote,
        command::Command,
        data_types::{AcceptorID, Instance},
    },
};

use super::types::{
    AcceptorConfiguration, AcceptorError, AcceptorRecord, AcceptorTimer, RecoveryRound,
};

/// A single acceptor.
///
/// # Usage
///
/// After creating an `Acceptor` with [`new`](Self::new), call [`start`](Self::start) once, then call
/// [`on_receive_msg`](Self::on_receive_msg) for every message received from the network, and
/// [`tick`](Self::tick) whenever [`next_deadline`](Self::next_deadline) has passed. Only a recovering
/// acceptor sets timers.
///
/// If `on_receive_msg` returns an [`AcceptorError`], the acceptor has observed two different decisions
/// for one instance and must not be used any further.
pub struct Acceptor<N: Network> {
    id: AcceptorID,
    config: AcceptorConfiguration,
    records: BTreeMap<Instance, AcceptorRecord>,
    decisions: BTreeMap<Instance, Command>,

    recovery: Option<RecoveryRound>,
    next_round: u64,
    timers: DeadlineQueue<AcceptorTimer>,

    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> Acceptor<N> {
    pub fn new(
        id: AcceptorID,
        config: AcceptorConfiguration,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            id,
            config,
            records: BTreeMap::new(),
            decisions: BTreeMap::new(),
            recovery: None,
            next_round: 0,
            timers: DeadlineQueue::new(),
            sender: SenderHandle::new(network),
            event_publisher,
        }
    }

    /// If recovery is configured, ask the other acceptors for their decision logs.
    pub fn start(&mut self, now: Instant) {
        if self.config.recovery {
            self.start_recovery(Instance::new(0), now);
        }
    }

    pub fn on_receive_msg(&mut self, msg: Message, now: Instant) -> Result<(), AcceptorError> {
        match msg {
            Message::Phase1a(phase1a) => self.on_receive_phase1a(phase1a),
            Message::Phase2a(phase2a) => self.on_receive_phase2a(phase2a),
            Message::Decision(decision) => self.record_decision(decision.instance, decision.value)?,
            Message::CatchupRequest(request) => self.on_receive_catchup_request(request),
            Message::CatchupResponse(response) => {
                self.on_receive_catchup_response(response, now)?
            }
            Message::Phase1b(_) | Message::Phase2b(_) | Message::Propose(_) => (),
        }
        Ok(())
    }

    /// Handle every timer that has expired by `now`.
    pub fn tick(&mut self, now: Instant) {
        while let Some(timer) = self.timers.pop_expired(now) {
            match timer {
                AcceptorTimer::RecoveryRetry { round } => {
                    let from = self
                        .recovery
                        .as_ref()
                        .filter(|recovery| recovery.id == round)
                        .map(|recovery| recovery.from);
                    if let Some(from) = from {
                        self.start_recovery(from, now);
                    }
                }
            }
        }
    }

    /// Get the earliest time at which [`tick`](Self::tick) may have something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn id(&self) -> AcceptorID {
        self.id
    }

    /// Get the state this acceptor holds for `instance`, if it has seen any message for it.
    pub fn record(&self, instance: Instance) -> Option<&AcceptorRecord> {
        self.records.get(&instance)
    }

    /// Get the value this acceptor has recorded as decided for `instance`.
    pub fn decision(&self, instance: Instance) -> Option<&Command> {
        self.decisions.get(&instance)
    }

    /// Check whether a recovery round is waiting for responses.
    pub fn is_recovering(&self) -> bool {
        self.recovery.is_some()
    }

    fn on_receive_phase1a(&mut self, phase1a: Phase1a) {
        let record = self.records.entry(phase1a.instance).or_default();
        if phase1a.ballot > record.rnd {
            record.rnd = phase1a.ballot;
            self.sender.broadcast(
                Group::Proposers,
                Phase1b {
                    instance: phase1a.instance,
                    acceptor: self.id,
                    ballot: record.rnd,
                    accepted: record.accepted.clone(),
                },
            );
            Event::publish(
                &self.event_publisher,
                Event::Promise(PromiseEvent {
                    timestamp: SystemTime::now(),
                    instance: phase1a.instance,
                    ballot: phase1a.ballot,
                }),
            );
        } else {
            Event::publish(
                &self.event_publisher,
                Event::Reject(RejectEvent {
                    timestamp: SystemTime::now(),
                    instance: phase1a.instance,
                    ballot: phase1a.ballot,
                    promised: record.rnd,
                }),
            );
        }

        self.resend_decision(phase1a.instance);
    }

    fn on_receive_phase2a(&mut self, phase2a: Phase2a) {
        let record = self.records.entry(phase2a.instance).or_default();
        if phase2a.ballot >= record.rnd {
            record.rnd = phase2a.ballot;
            record.accepted = Some(Vote::new(phase2a.ballot, phase2a.value.clone()));

            let phase2b = Phase2b {
                instance: phase2a.instance,
                acceptor: self.id,
                ballot: phase2a.ballot,
                value: phase2a.value.clone(),
            };
            if self.config.phase2b_to_learners {
                self.sender
                    .broadcast_to_all(&[Group::Proposers, Group::Learners], phase2b);
            } else {
                self.sender.broadcast(Group::Proposers, phase2b);
            }

            Event::publish(
                &self.event_publisher,
                Event::Accept(AcceptEvent {
                    timestamp: SystemTime::now(),
                    instance: phase2a.instance,
                    ballot: phase2a.ballot,
                    value: phase2a.value,
                }),
            );
        } else {
            Event::publish(
                &self.event_publisher,
                Event::Reject(RejectEvent {
                    timestamp: SystemTime::now(),
                    instance: phase2a.instance,
                    ballot: phase2a.ballot,
                    promised: record.rnd,
                }),
            );
        }

        self.resend_decision(phase2a.instance);
    }

    /// A proposer still working on a decided instance has missed its Decision. Send it again.
    fn resend_decision(&mut self, instance: Instance) {
        if let Some(value) = self.decisions.get(&instance) {
            self.sender.broadcast(
                Group::Proposers,
                Decision {
                    instance,
                    value: value.clone(),
                },
            );
        }
    }

    fn record_decision(&mut self, instance: Instance, value: Command) -> Result<(), AcceptorError> {
        match self.decisions.get(&instance) {
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
                Err(AcceptorError::ConsistencyViolation {
                    instance,
                    recorded: recorded.clone(),
                    received: value,
                })
            }
            None => {
                self.decisions.insert(instance, value.clone());
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

    /// Reply with the decision log and the votes for undecided instances, starting at `request.from`.
    /// Each list holds at most `request.limit` entries, and the encoded response must fit in
    /// `max_catchup_response_size`, except that the first decision is always sent. Does not change any
    /// state.
    fn on_receive_catchup_request(&mut self, request: CatchupRequest) {
        let limit = request.limit.max(1) as usize;
        let empty_response = Message::from(CatchupResponse {
            acceptor: self.id,
            decided: Vec::new(),
            accepted: Vec::new(),
            truncated: false,
        });
        // One byte for the version prefix.
        let mut budget = self
            .config
            .max_catchup_response_size
            .saturating_sub(1 + encoded_len(&empty_response));
        let mut truncated = false;

        let mut decided: Vec<Decision> = Vec::new();
        for (instance, value) in self.decisions.range(request.from..) {
            let decision = Decision {
                instance: *instance,
                value: value.clone(),
            };
            let size = encoded_len(&decision);
            if decided.len() == limit || (size > budget && !decided.is_empty()) {
                truncated = true;
                break;
            }
            budget = budget.saturating_sub(size);
            decided.push(decision);
        }

        let mut accepted: Vec<(Instance, Vote)> = Vec::new();
        let decisions = &self.decisions;
        let votes = self
            .records
            .range(request.from..)
            .filter(|(instance, _)| !decisions.contains_key(instance))
            .filter_map(|(instance, record)| record.accepted.as_ref().map(|vote| (*instance, vote)));
        for (instance, vote) in votes {
            let entry = (instance, vote.clone());
            let size = encoded_len(&entry);
            if accepted.len() == limit || size > budget {
                truncated = true;
                break;
            }
            budget -= size;
            accepted.push(entry);
        }

        Event::publish(
            &self.event_publisher,
            Event::ServeCatchup(ServeCatchupEvent {
                timestamp: SystemTime::now(),
                from: request.from,
                decided: decided.len(),
                accepted: accepted.len(),
            }),
        );

        self.sender.broadcast(
            request.reply_to,
            CatchupResponse {
                acceptor: self.id,
                decided,
                accepted,
                truncated,
            },
        );
    }

    /// Merge the decision log of another acceptor, and count it towards the running recovery round. Its
    /// votes are ignored: they say nothing about what was decided on their own.
    fn on_receive_catchup_response(
        &mut self,
        response: CatchupResponse,
        now: Instant,
    ) -> Result<(), AcceptorError> {
        if response.acceptor == self.id || !self.config.acceptors.contains(&response.acceptor) {
            return Ok(());
        }

        let first = response.decided.first().map(|decision| decision.instance);
        let last = response.decided.last().map(|decision| decision.instance);
        for decision in response.decided {
            self.record_decision(decision.instance, decision.value)?;
        }

        let needed = self.recovery_responders_needed();
        let round_complete = match &mut self.recovery {
            // A response that starts below the round's `from` answers an earlier round.
            Some(round) if first.map_or(true, |first| first >= round.from) => {
                round.responders.insert(response.acceptor);
                if let Some(last) = last.filter(|_| response.truncated) {
                    let resume = last.next();
                    round.resume_from = Some(round.resume_from.map_or(resume, |r| r.min(resume)));
                }
                round.responders.len() >= needed
            }
            _ => false,
        };

        if round_complete {
            if let Some(round) = self.recovery.take() {
                Event::publish(
                    &self.event_publisher,
                    Event::EndCatchup(EndCatchupEvent {
                        timestamp: SystemTime::now(),
                        next_to_deliver: self.next_unknown(),
                        responders: round.responders.len(),
                    }),
                );

                // Some peer had more decisions than fit in one response. Ask for the next page.
                if let Some(resume) = round.resume_from.filter(|resume| *resume > round.from) {
                    self.start_recovery(resume, now);
                }
            }
        }

        Ok(())
    }

    fn start_recovery(&mut self, from: Instance, now: Instant) {
        if self.recovery_responders_needed() == 0 {
            return;
        }

        self.next_round += 1;
        let round = self.next_round;
        self.recovery = Some(RecoveryRound {
            id: round,
            from,
            responders: BTreeSet::new(),
            resume_from: None,
        });

        self.sender.broadcast(
            Group::Acceptors,
            CatchupRequest {
                from,
                limit: self.config.catchup_limit,
                reply_to: Group::Acceptors,
            },
        );
        self.timers.push(
            now + self.config.catchup_timeout,
            AcceptorTimer::RecoveryRetry { round },
        );

        Event::publish(
            &self.event_publisher,
            Event::StartCatchup(StartCatchupEvent {
                timestamp: SystemTime::now(),
                from,
            }),
        );
    }

    /// The number of peers that must answer before a recovery round ends: a quorum minus this acceptor,
    /// but at least one, and no more than there are peers.
    fn recovery_responders_needed(&self) -> usize {
        let peers = self
            .config
            .acceptors
            .iter()
            .filter(|acceptor| **acceptor != self.id)
            .count();
        self.config.acceptors.quorum().saturating_sub(1).max(1).min(peers)
    }

    /// The instance after the highest recorded decision.
    fn next_unknown(&self) -> Instance {
        self.decisions
            .keys()
            .next_back()
            .map_or(Instance::new(0), |instance| instance.next())
    }
}
