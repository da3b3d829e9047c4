/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the proposer role.
//!
//! Main type: [`Proposer`].

use std::{
    cmp::max,
    collections::{BTreeMap, HashSet, VecDeque},
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use crate::{
    events::{
        ConsistencyViolationEvent, DecideEvent, Event, NoProgressEvent, PhaseTimeoutEvent,
        PreemptEvent, PrepareEvent, ReceiveCommandEvent, RequestAcceptEvent, RequeueEvent,
    },
    membership::QuorumCollector,
    networking::{
        messages::{Decision, Group, Message, Phase1a, Phase1b, Phase2a, Phase2b, Propose},
        network::Network,
        sending::SenderHandle,
    },
    retry::RetryPolicy,
    timers::DeadlineQueue,
    types::{
        ballot::Ballot,
        command::{Command, CommandKey},
        data_types::{Instance, ProposerID},
    },
};

use super::types::{
    AttemptStatus, InstanceAttempt, Phase, ProposerConfiguration, ProposerError, ProposerTimer,
};

/// A single proposer.
///
/// # Usage
///
/// The `Proposer` struct is meant to be used in an event-oriented fashion. After creating it with
/// [`new`](Self::new), the caller interacts with it through three methods:
/// 1. [`on_receive_msg`](Self::on_receive_msg): call whenever a message is received.
/// 2. [`tick`](Self::tick): call whenever the time returned by [`next_deadline`](Self::next_deadline)
///    has passed, or more often. Stale timers are ignored, so extra calls are harmless.
/// 3. [`next_deadline`](Self::next_deadline): the earliest time at which `tick` has work to do.
///
/// All three take the current time as an argument instead of reading the clock.
pub struct Proposer<N: Network> {
    id: ProposerID,
    config: ProposerConfiguration,
    retry_policy: Box<dyn RetryPolicy>,

    /// Counter of the last ballot this proposer used. Never decreases.
    ballot_counter: u64,
    /// Highest ballot observed for each undecided instance, from any proposer.
    highest_seen: BTreeMap<Instance, Ballot>,

    pending: VecDeque<Command>,
    in_flight: BTreeMap<Instance, InstanceAttempt>,
    decided: BTreeMap<Instance, Command>,
    decided_keys: HashSet<CommandKey>,
    /// Lowest instance not known to be decided.
    first_undecided: Instance,

    timers: DeadlineQueue<ProposerTimer>,
    next_generation: u64,

    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> Proposer<N> {
    pub fn new(
        id: ProposerID,
        config: ProposerConfiguration,
        retry_policy: Box<dyn RetryPolicy>,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            id,
            ballot_counter: config.initial_ballot_counter,
            config,
            retry_policy,
            highest_seen: BTreeMap::new(),
            pending: VecDeque::new(),
            in_flight: BTreeMap::new(),
            decided: BTreeMap::new(),
            decided_keys: HashSet::new(),
            first_undecided: Instance::new(0),
            timers: DeadlineQueue::new(),
            next_generation: 0,
            sender: SenderHandle::new(network),
            event_publisher,
        }
    }

    pub fn on_receive_msg(&mut self, msg: Message, now: Instant) -> Result<(), ProposerError> {
        match msg {
            Message::Propose(propose) => self.on_receive_propose(propose, now),
            Message::Phase1b(phase1b) => self.on_receive_phase1b(phase1b, now),
            Message::Phase2b(phase2b) => self.on_receive_phase2b(phase2b, now)?,
            Message::Decision(decision) => {
                self.on_receive_decision(decision.instance, decision.value, now)?
            }
            Message::Phase1a(_)
            | Message::Phase2a(_)
            | Message::CatchupRequest(_)
            | Message::CatchupResponse(_) => (),
        }
        Ok(())
    }

    /// Handle every timer that has expired by `now`.
    pub fn tick(&mut self, now: Instant) {
        while let Some(timer) = self.timers.pop_expired(now) {
            let phase_is_backoff = match self.in_flight.get(&timer.instance) {
                Some(attempt) if attempt.generation == timer.generation => {
                    matches!(attempt.phase, Phase::Backoff)
                }
                _ => continue,
            };

            if phase_is_backoff {
                self.start_phase1(timer.instance, now);
            } else {
                self.on_phase_timeout(timer.instance, now);
            }
        }
    }

    /// Get the earliest time at which [`tick`](Self::tick) may have something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn id(&self) -> ProposerID {
        self.id
    }

    /// Get the value this proposer knows to be decided for `instance`.
    pub fn decision(&self, instance: Instance) -> Option<&Command> {
        self.decided.get(&instance)
    }

    /// Get the commands waiting for a free slot in the pipeline, in the order they will be assigned.
    pub fn pending(&self) -> impl Iterator<Item = &Command> {
        self.pending.iter()
    }

    /// Get the instances currently in flight, in ascending order.
    pub fn in_flight(&self) -> impl Iterator<Item = &Instance> {
        self.in_flight.keys()
    }

    /// Get the status of the attempt on `instance`, if it is in flight.
    pub fn attempt_status(&self, instance: Instance) -> Option<AttemptStatus> {
        self.in_flight.get(&instance).map(|attempt| AttemptStatus {
            ballot: attempt.ballot,
            phase: attempt.phase.kind(),
            candidate: attempt.candidate.clone(),
            failed_attempts: attempt.failed_attempts,
        })
    }

    fn on_receive_propose(&mut self, propose: Propose, now: Instant) {
        let key = propose.command.key();
        let known = self.decided_keys.contains(&key)
            || self.pending.iter().any(|command| command.key() == key)
            || self
                .in_flight
                .values()
                .any(|attempt| attempt.candidate.key() == key);
        if known {
            return;
        }

        Event::publish(
            &self.event_publisher,
            Event::ReceiveCommand(ReceiveCommandEvent {
                timestamp: SystemTime::now(),
                command: propose.command.clone(),
            }),
        );

        self.pending.push_back(propose.command);
        self.fill_pipeline(now);
    }

    fn on_receive_phase1b(&mut self, phase1b: Phase1b, now: Instant) {
        let instance = phase1b.instance;
        self.observe_ballot(instance, phase1b.ballot);

        let attempt = match self.in_flight.get_mut(&instance) {
            Some(attempt) => attempt,
            None => return,
        };
        if phase1b.ballot > attempt.ballot {
            self.preempt(instance, phase1b.ballot, now);
            return;
        }
        if phase1b.ballot < attempt.ballot {
            return;
        }

        let promises = match &mut attempt.phase {
            Phase::Preparing { promises } => promises.collect(phase1b.acceptor, phase1b.accepted),
            _ => None,
        };

        if let Some(promises) = promises {
            // Safety: if any acceptor in the quorum has voted, the value of the highest vote may
            // already be decided, so it is the only value that can be proposed.
            let highest_vote = promises
                .into_iter()
                .filter_map(|(_, vote)| vote)
                .max_by(|a, b| a.ballot.cmp(&b.ballot));

            match highest_vote {
                Some(vote) => self.start_phase2(instance, vote.value, true, now),
                None => {
                    if let Some(candidate) = self.fresh_candidate(instance) {
                        self.start_phase2(instance, candidate, false, now)
                    }
                }
            }
        }
    }

    fn on_receive_phase2b(&mut self, phase2b: Phase2b, now: Instant) -> Result<(), ProposerError> {
        let instance = phase2b.instance;
        self.observe_ballot(instance, phase2b.ballot);

        let attempt = match self.in_flight.get_mut(&instance) {
            Some(attempt) => attempt,
            None => return Ok(()),
        };
        if phase2b.ballot > attempt.ballot {
            self.preempt(instance, phase2b.ballot, now);
            return Ok(());
        }
        if phase2b.ballot < attempt.ballot {
            return Ok(());
        }

        let ballot = attempt.ballot;
        let chosen = match &mut attempt.phase {
            Phase::Accepting { value, accepts } if *value == phase2b.value => accepts
                .collect(phase2b.acceptor, ())
                .map(|_| value.clone()),
            _ => None,
        };

        match chosen {
            Some(value) => self.decide(instance, ballot, value, now),
            None => Ok(()),
        }
    }

    fn on_receive_decision(
        &mut self,
        instance: Instance,
        value: Command,
        now: Instant,
    ) -> Result<(), ProposerError> {
        if let Some(recorded) = self.decided.get(&instance) {
            if *recorded == value {
                return Ok(());
            }
            Event::publish(
                &self.event_publisher,
                Event::ConsistencyViolation(ConsistencyViolationEvent {
                    timestamp: SystemTime::now(),
                    instance,
                    recorded: recorded.clone(),
                    received: value.clone(),
                }),
            );
            return Err(ProposerError::ConsistencyViolation {
                instance,
                recorded: recorded.clone(),
                received: value,
            });
        }

        self.decided_keys.insert(value.key());
        self.highest_seen.remove(&instance);

        // Retire the instance. Its timers become stale.
        if let Some(attempt) = self.in_flight.remove(&instance) {
            if attempt.candidate.key() != value.key() {
                Event::publish(
                    &self.event_publisher,
                    Event::Requeue(RequeueEvent {
                        timestamp: SystemTime::now(),
                        instance,
                        command: attempt.candidate.clone(),
                    }),
                );
                self.pending.push_front(attempt.candidate);
            }
        }

        self.decided.insert(instance, value);
        while self.decided.contains_key(&self.first_undecided) {
            self.first_undecided = self.first_undecided.next();
        }

        let decided_keys = &self.decided_keys;
        self.pending
            .retain(|command| !decided_keys.contains(&command.key()));

        self.fill_pipeline(now);
        Ok(())
    }

    /// Assign pending commands to free instances until the pipeline window is full.
    fn fill_pipeline(&mut self, now: Instant) {
        while self.in_flight.len() < max(self.config.pipeline_window, 1) {
            let candidate = match self.pending.pop_front() {
                Some(command) => command,
                None => return,
            };
            if self.decided_keys.contains(&candidate.key()) {
                continue;
            }

            let instance = self.next_free_instance();
            self.in_flight.insert(
                instance,
                InstanceAttempt {
                    ballot: Ballot::ZERO,
                    candidate,
                    phase: Phase::Backoff,
                    failed_attempts: 0,
                    generation: 0,
                },
            );
            self.start_phase1(instance, now);
        }
    }

    /// Get the lowest instance that is neither known to be decided nor in flight.
    fn next_free_instance(&self) -> Instance {
        let mut instance = self.first_undecided;
        while self.decided.contains_key(&instance) || self.in_flight.contains_key(&instance) {
            instance = instance.next();
        }
        instance
    }

    fn start_phase1(&mut self, instance: Instance, now: Instant) {
        let ballot = self.fresh_ballot(instance);
        let generation = self.bump_generation();
        let acceptors = self.config.acceptors.clone();

        let attempt = match self.in_flight.get_mut(&instance) {
            Some(attempt) => attempt,
            None => return,
        };
        attempt.ballot = ballot;
        attempt.generation = generation;
        attempt.phase = Phase::Preparing {
            promises: QuorumCollector::new(acceptors),
        };

        let deadline = now + self.retry_policy.phase_timeout(attempt.failed_attempts);
        self.timers.push(
            deadline,
            ProposerTimer {
                instance,
                generation,
            },
        );

        self.sender
            .broadcast(Group::Acceptors, Phase1a { instance, ballot });

        Event::publish(
            &self.event_publisher,
            Event::Prepare(PrepareEvent {
                timestamp: SystemTime::now(),
                instance,
                ballot,
            }),
        );
    }

    fn start_phase2(&mut self, instance: Instance, value: Command, adopted: bool, now: Instant) {
        let generation = self.bump_generation();
        let acceptors = self.config.acceptors.clone();

        let attempt = match self.in_flight.get_mut(&instance) {
            Some(attempt) => attempt,
            None => return,
        };
        let ballot = attempt.ballot;
        attempt.generation = generation;
        attempt.phase = Phase::Accepting {
            value: value.clone(),
            accepts: QuorumCollector::new(acceptors),
        };

        let deadline = now + self.retry_policy.phase_timeout(attempt.failed_attempts);
        self.timers.push(
            deadline,
            ProposerTimer {
                instance,
                generation,
            },
        );

        self.sender.broadcast(
            Group::Acceptors,
            Phase2a {
                instance,
                ballot,
                value: value.clone(),
            },
        );

        Event::publish(
            &self.event_publisher,
            Event::RequestAccept(RequestAcceptEvent {
                timestamp: SystemTime::now(),
                instance,
                ballot,
                value,
                adopted,
            }),
        );
    }

    fn decide(
        &mut self,
        instance: Instance,
        ballot: Ballot,
        value: Command,
        now: Instant,
    ) -> Result<(), ProposerError> {
        self.sender.broadcast_to_all(
            &[Group::Learners, Group::Acceptors, Group::Proposers],
            Decision {
                instance,
                value: value.clone(),
            },
        );

        Event::publish(
            &self.event_publisher,
            Event::Decide(DecideEvent {
                timestamp: SystemTime::now(),
                instance,
                ballot,
                value: value.clone(),
            }),
        );

        self.on_receive_decision(instance, value, now)
    }

    fn preempt(&mut self, instance: Instance, observed: Ballot, now: Instant) {
        let ballot = match self.in_flight.get(&instance) {
            Some(attempt) if !matches!(attempt.phase, Phase::Backoff) => attempt.ballot,
            _ => return,
        };

        Event::publish(
            &self.event_publisher,
            Event::Preempt(PreemptEvent {
                timestamp: SystemTime::now(),
                instance,
                ballot,
                observed,
            }),
        );

        self.back_off(instance, now);
    }

    fn on_phase_timeout(&mut self, instance: Instance, now: Instant) {
        let (ballot, attempt) = match self.in_flight.get(&instance) {
            Some(attempt) => (attempt.ballot, attempt.failed_attempts),
            None => return,
        };

        Event::publish(
            &self.event_publisher,
            Event::PhaseTimeout(PhaseTimeoutEvent {
                timestamp: SystemTime::now(),
                instance,
                ballot,
                attempt,
            }),
        );

        self.back_off(instance, now);
    }

    /// Abandon the current attempt on `instance` and arm the timer that starts the next one.
    fn back_off(&mut self, instance: Instance, now: Instant) {
        let generation = self.bump_generation();

        let attempt = match self.in_flight.get_mut(&instance) {
            Some(attempt) => attempt,
            None => return,
        };
        attempt.phase = Phase::Backoff;
        attempt.generation = generation;
        attempt.failed_attempts = attempt.failed_attempts.saturating_add(1);
        let failed_attempts = attempt.failed_attempts;

        let delay = self.retry_policy.backoff(failed_attempts);
        self.timers.push(
            now + delay,
            ProposerTimer {
                instance,
                generation,
            },
        );

        if failed_attempts >= self.config.no_progress_warning_after {
            Event::publish(
                &self.event_publisher,
                Event::NoProgress(NoProgressEvent {
                    timestamp: SystemTime::now(),
                    instance,
                    attempts: failed_attempts,
                }),
            );
        }
    }

    /// Pick a ballot for `instance` that is higher than every ballot this proposer has used or seen
    /// for it.
    fn fresh_ballot(&mut self, instance: Instance) -> Ballot {
        let seen = self
            .highest_seen
            .get(&instance)
            .map_or(0, |ballot| ballot.counter());
        self.ballot_counter = max(self.ballot_counter, seen).saturating_add(1);

        let ballot = Ballot::new(self.ballot_counter, self.id);
        self.observe_ballot(instance, ballot);
        ballot
    }

    fn observe_ballot(&mut self, instance: Instance, ballot: Ballot) {
        if self.decided.contains_key(&instance) {
            return;
        }
        let highest = self.highest_seen.entry(instance).or_insert(ballot);
        if ballot > *highest {
            *highest = ballot;
        }
    }

    /// Get the command to propose in `instance` when no acceptor in the quorum has voted.
    ///
    /// If the candidate was decided in another instance in the meantime, the next pending command
    /// replaces it. The instance still needs some value, so with nothing else pending the candidate
    /// is proposed again, and learners will skip the duplicate.
    fn fresh_candidate(&mut self, instance: Instance) -> Option<Command> {
        let candidate_is_decided = match self.in_flight.get(&instance) {
            Some(attempt) => self.decided_keys.contains(&attempt.candidate.key()),
            None => false,
        };

        if candidate_is_decided {
            let decided_keys = &self.decided_keys;
            self.pending
                .retain(|command| !decided_keys.contains(&command.key()));
            if let Some(replacement) = self.pending.pop_front() {
                if let Some(attempt) = self.in_flight.get_mut(&instance) {
                    attempt.candidate = replacement;
                }
            }
        }

        self.in_flight
            .get(&instance)
            .map(|attempt| attempt.candidate.clone())
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}
