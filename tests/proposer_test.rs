//! Tests that drive a single [`Proposer`] by hand, playing the acceptors' part.

use std::{
    sync::mpsc::{self, Receiver},
    time::{Duration, Instant},
};

use paxos_rs::{
    events::Event,
    membership::AcceptorSet,
    networking::messages::{Decision, Group, Message, Phase1b, Phase2b, Propose},
    proposer::{
        implementation::Proposer,
        types::{PhaseKind, ProposerConfiguration, ProposerError},
    },
    retry::RetryPolicy,
    types::{
        ballot::{Ballot, Vote},
        command::Command,
        data_types::{AcceptorID, ClientID, Instance, ProposerID, Sequence},
    },
};

mod common;

use crate::common::sim::{drain, Outbox, SimNetwork};

const PHASE_TIMEOUT: Duration = Duration::from_millis(100);
const BACKOFF: Duration = Duration::from_millis(10);

/// A retry policy without randomness or growth.
struct FixedRetryPolicy;

impl RetryPolicy for FixedRetryPolicy {
    fn phase_timeout(&mut self, _: u32) -> Duration {
        PHASE_TIMEOUT
    }

    fn backoff(&mut self, _: u32) -> Duration {
        BACKOFF
    }
}

fn config() -> ProposerConfiguration {
    ProposerConfiguration {
        acceptors: AcceptorSet::with_size(3).unwrap(),
        pipeline_window: 8,
        initial_ballot_counter: 0,
        no_progress_warning_after: 5,
        phase_timeout: PHASE_TIMEOUT,
        max_phase_timeout: PHASE_TIMEOUT,
        retry_backoff: BACKOFF,
    }
}

fn proposer_with(config: ProposerConfiguration) -> (Proposer<SimNetwork>, Outbox, Receiver<Event>) {
    let (network, outbox) = SimNetwork::capture();
    let (event_publisher, events) = mpsc::channel();
    let proposer = Proposer::new(
        ProposerID::new(0),
        config,
        Box::new(FixedRetryPolicy),
        network,
        Some(event_publisher),
    );
    (proposer, outbox, events)
}

fn command(sequence: u64, value: &str) -> Command {
    Command::new(ClientID::new(0), Sequence::new(sequence), value.as_bytes().to_vec())
}

fn ballot(counter: u64, proposer: u32) -> Ballot {
    Ballot::new(counter, ProposerID::new(proposer))
}

fn propose(command: Command) -> Message {
    Propose { command }.into()
}

fn phase1b(instance: u64, acceptor: u32, ballot: Ballot, accepted: Option<Vote>) -> Message {
    Phase1b {
        instance: Instance::new(instance),
        acceptor: AcceptorID::new(acceptor),
        ballot,
        accepted,
    }
    .into()
}

fn phase2b(instance: u64, acceptor: u32, ballot: Ballot, value: Command) -> Message {
    Phase2b {
        instance: Instance::new(instance),
        acceptor: AcceptorID::new(acceptor),
        ballot,
        value,
    }
    .into()
}

/// Get the ballots of the Phase1a messages broadcast to the acceptors, with their instances.
fn prepares(broadcasts: &[(Group, Message)]) -> Vec<(u64, Ballot)> {
    broadcasts
        .iter()
        .filter_map(|broadcast| match broadcast {
            (Group::Acceptors, Message::Phase1a(phase1a)) => {
                Some((phase1a.instance.int(), phase1a.ballot))
            }
            _ => None,
        })
        .collect()
}

/// Get the values of the Phase2a messages broadcast to the acceptors, with their instances.
fn accept_requests(broadcasts: &[(Group, Message)]) -> Vec<(u64, Ballot, Command)> {
    broadcasts
        .iter()
        .filter_map(|broadcast| match broadcast {
            (Group::Acceptors, Message::Phase2a(phase2a)) => Some((
                phase2a.instance.int(),
                phase2a.ballot,
                phase2a.value.clone(),
            )),
            _ => None,
        })
        .collect()
}

#[test]
fn propose_starts_phase_one_on_lowest_free_instance() {
    let (mut proposer, outbox, _events) = proposer_with(config());
    let now = Instant::now();

    proposer.on_receive_msg(propose(command(0, "X")), now).unwrap();

    assert_eq!(prepares(&drain(&outbox)), vec![(0, ballot(1, 0))]);
    let status = proposer.attempt_status(Instance::new(0)).unwrap();
    assert_eq!(status.phase, PhaseKind::Preparing);
    assert_eq!(status.candidate, command(0, "X"));
    assert_eq!(proposer.next_deadline(), Some(now + PHASE_TIMEOUT));
}

#[test]
fn adopt_value_of_highest_vote_in_quorum() {
    let (mut proposer, outbox, _events) = proposer_with(ProposerConfiguration {
        initial_ballot_counter: 4,
        ..config()
    });
    let now = Instant::now();
    let x = command(0, "X");
    let a = command(10, "A");
    let b = command(11, "B");

    proposer.on_receive_msg(propose(x.clone()), now).unwrap();
    assert_eq!(prepares(&drain(&outbox)), vec![(0, ballot(5, 0))]);

    proposer
        .on_receive_msg(phase1b(0, 0, ballot(5, 0), Some(Vote::new(ballot(2, 1), a))), now)
        .unwrap();
    assert!(accept_requests(&drain(&outbox)).is_empty());
    proposer
        .on_receive_msg(phase1b(0, 1, ballot(5, 0), Some(Vote::new(ballot(3, 2), b.clone()))), now)
        .unwrap();
    assert_eq!(
        accept_requests(&drain(&outbox)),
        vec![(0, ballot(5, 0), b.clone())]
    );

    // A quorum accepts B, so B is decided and X moves on to the next instance.
    proposer.on_receive_msg(phase2b(0, 2, ballot(5, 0), b.clone()), now).unwrap();
    proposer.on_receive_msg(phase2b(0, 0, ballot(5, 0), b.clone()), now).unwrap();

    let broadcasts = drain(&outbox);
    for group in [Group::Learners, Group::Acceptors, Group::Proposers] {
        assert!(broadcasts.contains(&(
            group,
            Message::Decision(Decision {
                instance: Instance::new(0),
                value: b.clone(),
            })
        )));
    }
    assert_eq!(proposer.decision(Instance::new(0)), Some(&b));
    assert_eq!(prepares(&broadcasts), vec![(1, ballot(6, 0))]);
    assert_eq!(proposer.attempt_status(Instance::new(1)).unwrap().candidate, x);
}

#[test]
fn propose_own_value_when_quorum_has_no_votes() {
    let (mut proposer, outbox, _events) = proposer_with(config());
    let now = Instant::now();
    let x = command(0, "X");

    proposer.on_receive_msg(propose(x.clone()), now).unwrap();
    drain(&outbox);

    proposer.on_receive_msg(phase1b(0, 2, ballot(1, 0), None), now).unwrap();
    proposer.on_receive_msg(phase1b(0, 1, ballot(1, 0), None), now).unwrap();
    assert_eq!(accept_requests(&drain(&outbox)), vec![(0, ballot(1, 0), x.clone())]);
    assert_eq!(
        proposer.attempt_status(Instance::new(0)).unwrap().phase,
        PhaseKind::Accepting
    );

    // A late third promise does not restart phase 2.
    proposer.on_receive_msg(phase1b(0, 0, ballot(1, 0), None), now).unwrap();
    assert!(drain(&outbox).is_empty());
}

#[test]
fn stale_and_duplicate_replies_do_not_count() {
    let (mut proposer, outbox, _events) = proposer_with(ProposerConfiguration {
        initial_ballot_counter: 4,
        ..config()
    });
    let now = Instant::now();
    let x = command(0, "X");

    proposer.on_receive_msg(propose(x.clone()), now).unwrap();
    drain(&outbox);

    proposer.on_receive_msg(phase1b(0, 0, ballot(5, 0), None), now).unwrap();
    proposer.on_receive_msg(phase1b(0, 0, ballot(5, 0), None), now).unwrap();
    proposer.on_receive_msg(phase1b(0, 1, ballot(2, 1), None), now).unwrap();
    assert!(drain(&outbox).is_empty());
    assert_eq!(
        proposer.attempt_status(Instance::new(0)).unwrap().phase,
        PhaseKind::Preparing
    );

    proposer.on_receive_msg(phase1b(0, 1, ballot(5, 0), None), now).unwrap();
    drain(&outbox);

    // Phase2b for a different value in the same ballot cannot exist, and is not counted.
    proposer.on_receive_msg(phase2b(0, 0, ballot(5, 0), x.clone()), now).unwrap();
    proposer.on_receive_msg(phase2b(0, 0, ballot(5, 0), x.clone()), now).unwrap();
    proposer.on_receive_msg(phase2b(0, 1, ballot(5, 0), command(9, "Z")), now).unwrap();
    assert!(proposer.decision(Instance::new(0)).is_none());

    proposer.on_receive_msg(phase2b(0, 2, ballot(5, 0), x.clone()), now).unwrap();
    assert_eq!(proposer.decision(Instance::new(0)), Some(&x));
}

#[test]
fn higher_ballot_preempts_and_retry_uses_higher_counter() {
    let (mut proposer, outbox, events) = proposer_with(config());
    let now = Instant::now();

    proposer.on_receive_msg(propose(command(0, "X")), now).unwrap();
    drain(&outbox);

    // Another proposer's ballot (3, 1) shows up in an acceptor's promise.
    proposer.on_receive_msg(phase1b(0, 0, ballot(3, 1), None), now).unwrap();
    let status = proposer.attempt_status(Instance::new(0)).unwrap();
    assert_eq!(status.phase, PhaseKind::Backoff);
    assert_eq!(status.failed_attempts, 1);
    assert!(events
        .try_iter()
        .any(|event| matches!(event, Event::Preempt(preempt) if preempt.observed == ballot(3, 1))));

    // Nothing happens before the backoff expires.
    proposer.tick(now + BACKOFF / 2);
    assert!(drain(&outbox).is_empty());

    proposer.tick(now + BACKOFF);
    assert_eq!(prepares(&drain(&outbox)), vec![(0, ballot(4, 0))]);
}

#[test]
fn phase_timeout_backs_off_then_retries() {
    let (mut proposer, outbox, events) = proposer_with(ProposerConfiguration {
        no_progress_warning_after: 2,
        ..config()
    });
    let start = Instant::now();

    proposer.on_receive_msg(propose(command(0, "X")), start).unwrap();
    drain(&outbox);

    let first_timeout = start + PHASE_TIMEOUT;
    proposer.tick(first_timeout);
    assert_eq!(
        proposer.attempt_status(Instance::new(0)).unwrap().phase,
        PhaseKind::Backoff
    );
    assert!(drain(&outbox).is_empty());

    proposer.tick(first_timeout + BACKOFF);
    assert_eq!(prepares(&drain(&outbox)), vec![(0, ballot(2, 0))]);

    let second_timeout = first_timeout + BACKOFF + PHASE_TIMEOUT;
    proposer.tick(second_timeout);
    assert_eq!(
        proposer.attempt_status(Instance::new(0)).unwrap().failed_attempts,
        2
    );
    assert!(events
        .try_iter()
        .any(|event| matches!(event, Event::NoProgress(no_progress) if no_progress.attempts == 2)));
}

#[test]
fn timers_of_finished_phases_are_ignored() {
    let (mut proposer, outbox, _events) = proposer_with(config());
    let start = Instant::now();

    proposer.on_receive_msg(propose(command(0, "X")), start).unwrap();

    // Phase 2 starts halfway through the phase 1 timeout.
    let phase2_start = start + PHASE_TIMEOUT / 2;
    proposer.on_receive_msg(phase1b(0, 0, ballot(1, 0), None), phase2_start).unwrap();
    proposer.on_receive_msg(phase1b(0, 1, ballot(1, 0), None), phase2_start).unwrap();
    drain(&outbox);

    proposer.tick(start + PHASE_TIMEOUT);
    assert_eq!(
        proposer.attempt_status(Instance::new(0)).unwrap().phase,
        PhaseKind::Accepting
    );

    proposer.tick(phase2_start + PHASE_TIMEOUT);
    assert_eq!(
        proposer.attempt_status(Instance::new(0)).unwrap().phase,
        PhaseKind::Backoff
    );
}

#[test]
fn pipeline_window_limits_instances_in_flight() {
    let (mut proposer, outbox, _events) = proposer_with(ProposerConfiguration {
        pipeline_window: 2,
        ..config()
    });
    let now = Instant::now();

    for (i, value) in ["X", "Y", "Z"].iter().enumerate() {
        proposer.on_receive_msg(propose(command(i as u64, value)), now).unwrap();
    }

    let instances: Vec<u64> = prepares(&drain(&outbox)).into_iter().map(|(i, _)| i).collect();
    assert_eq!(instances, vec![0, 1]);
    let in_flight: Vec<Instance> = proposer.in_flight().copied().collect();
    assert_eq!(in_flight, vec![Instance::new(0), Instance::new(1)]);
    let pending: Vec<&Command> = proposer.pending().collect();
    assert_eq!(pending, vec![&command(2, "Z")]);

    // Instance 1 is decided first. Z takes instance 2, and instance 0 keeps going.
    proposer
        .on_receive_msg(
            Decision {
                instance: Instance::new(1),
                value: command(1, "Y"),
            }
            .into(),
            now,
        )
        .unwrap();
    assert_eq!(prepares(&drain(&outbox)), vec![(2, ballot(3, 0))]);
    assert!(proposer.attempt_status(Instance::new(0)).is_some());
    assert_eq!(proposer.pending().count(), 0);
}

#[test]
fn resubmitted_commands_are_proposed_once() {
    let (mut proposer, outbox, _events) = proposer_with(config());
    let now = Instant::now();
    let x = command(0, "X");

    proposer.on_receive_msg(propose(x.clone()), now).unwrap();
    proposer.on_receive_msg(propose(x.clone()), now).unwrap();
    assert_eq!(prepares(&drain(&outbox)).len(), 1);

    proposer
        .on_receive_msg(
            Decision {
                instance: Instance::new(0),
                value: x.clone(),
            }
            .into(),
            now,
        )
        .unwrap();
    assert!(proposer.in_flight().next().is_none());

    proposer.on_receive_msg(propose(x), now).unwrap();
    assert!(drain(&outbox).is_empty());
    assert_eq!(proposer.pending().count(), 0);
}

#[test]
fn lost_instance_requeues_candidate() {
    let (mut proposer, outbox, events) = proposer_with(config());
    let now = Instant::now();
    let x = command(0, "X");
    let other = Command::new(ClientID::new(1), Sequence::new(0), b"W".to_vec());

    proposer.on_receive_msg(propose(x.clone()), now).unwrap();
    drain(&outbox);

    // Another proposer won instance 0.
    proposer
        .on_receive_msg(
            Decision {
                instance: Instance::new(0),
                value: other,
            }
            .into(),
            now,
        )
        .unwrap();

    assert!(events
        .try_iter()
        .any(|event| matches!(event, Event::Requeue(requeue) if requeue.command == x)));
    assert_eq!(prepares(&drain(&outbox)), vec![(1, ballot(2, 0))]);
    assert_eq!(proposer.attempt_status(Instance::new(1)).unwrap().candidate, x);
}

#[test]
fn conflicting_decisions_are_an_error() {
    let (mut proposer, _outbox, _events) = proposer_with(config());
    let now = Instant::now();
    let decision = |value: Command| -> Message {
        Decision {
            instance: Instance::new(0),
            value,
        }
        .into()
    };

    proposer.on_receive_msg(decision(command(0, "X")), now).unwrap();
    assert!(matches!(
        proposer.on_receive_msg(decision(command(1, "Y")), now),
        Err(ProposerError::ConsistencyViolation { .. })
    ));
}
