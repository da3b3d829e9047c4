/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [configuration](crate::node::Configuration).
//!
//! paxos_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [Decide](crate::events::DecideEvent) is printed:
//!
//! ```text
//! Decide, 1701329264, 12, (3, 1), 7:41, aGVsbG8
//! ```
//!
//! In the snippet:
//! - The third value is the instance.
//! - The fourth value is the ballot the instance was decided in, as `(counter, proposer)`.
//! - The fifth value is the idempotency key of the decided command, as `client:sequence`.
//! - The sixth value is the first seven characters of the Base64 encoding of the command's value.
//!
//! Most events are logged at the `Info` level. [NoProgress](crate::events::NoProgressEvent) is logged
//! at `Warn` and [ConsistencyViolation](crate::events::ConsistencyViolationEvent) at `Error`.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::{events::*, types::command::Command};

// Names of each event in PascalCase for printing:
pub const PROMISE: &str = "Promise";
pub const ACCEPT: &str = "Accept";
pub const REJECT: &str = "Reject";
pub const SERVE_CATCHUP: &str = "ServeCatchup";

pub const RECEIVE_COMMAND: &str = "ReceiveCommand";
pub const PREPARE: &str = "Prepare";
pub const REQUEST_ACCEPT: &str = "RequestAccept";
pub const DECIDE: &str = "Decide";
pub const PREEMPT: &str = "Preempt";
pub const PHASE_TIMEOUT: &str = "PhaseTimeout";
pub const NO_PROGRESS: &str = "NoProgress";
pub const REQUEUE: &str = "Requeue";

pub const LEARN: &str = "Learn";
pub const DELIVER: &str = "Deliver";
pub const START_CATCHUP: &str = "StartCatchup";
pub const END_CATCHUP: &str = "EndCatchup";
pub const CONSISTENCY_VIOLATION: &str = "ConsistencyViolation";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for PromiseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |promise_event: &PromiseEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PROMISE,
                secs_since_unix_epoch(promise_event.timestamp),
                promise_event.instance,
                promise_event.ballot
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |accept_event: &AcceptEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ACCEPT,
                secs_since_unix_epoch(accept_event.timestamp),
                accept_event.instance,
                accept_event.ballot,
                command_info(&accept_event.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_event: &RejectEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                REJECT,
                secs_since_unix_epoch(reject_event.timestamp),
                reject_event.instance,
                reject_event.ballot,
                reject_event.promised
            )
        };
        Box::new(logger)
    }
}

impl Logger for ServeCatchupEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |serve_catchup_event: &ServeCatchupEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SERVE_CATCHUP,
                secs_since_unix_epoch(serve_catchup_event.timestamp),
                serve_catchup_event.from,
                serve_catchup_event.decided,
                serve_catchup_event.accepted
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveCommandEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_command_event: &ReceiveCommandEvent| {
            log::info!(
                "{}, {}, {}",
                RECEIVE_COMMAND,
                secs_since_unix_epoch(receive_command_event.timestamp),
                command_info(&receive_command_event.command)
            )
        };
        Box::new(logger)
    }
}

impl Logger for PrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prepare_event: &PrepareEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PREPARE,
                secs_since_unix_epoch(prepare_event.timestamp),
                prepare_event.instance,
                prepare_event.ballot
            )
        };
        Box::new(logger)
    }
}

impl Logger for RequestAcceptEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |request_accept_event: &RequestAcceptEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                REQUEST_ACCEPT,
                secs_since_unix_epoch(request_accept_event.timestamp),
                request_accept_event.instance,
                request_accept_event.ballot,
                command_info(&request_accept_event.value),
                if request_accept_event.adopted { "adopted" } else { "own" }
            )
        };
        Box::new(logger)
    }
}

impl Logger for DecideEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |decide_event: &DecideEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                DECIDE,
                secs_since_unix_epoch(decide_event.timestamp),
                decide_event.instance,
                decide_event.ballot,
                command_info(&decide_event.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for PreemptEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |preempt_event: &PreemptEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PREEMPT,
                secs_since_unix_epoch(preempt_event.timestamp),
                preempt_event.instance,
                preempt_event.ballot,
                preempt_event.observed
            )
        };
        Box::new(logger)
    }
}

impl Logger for PhaseTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |phase_timeout_event: &PhaseTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PHASE_TIMEOUT,
                secs_since_unix_epoch(phase_timeout_event.timestamp),
                phase_timeout_event.instance,
                phase_timeout_event.ballot,
                phase_timeout_event.attempt
            )
        };
        Box::new(logger)
    }
}

impl Logger for NoProgressEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |no_progress_event: &NoProgressEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                NO_PROGRESS,
                secs_since_unix_epoch(no_progress_event.timestamp),
                no_progress_event.instance,
                no_progress_event.attempts
            )
        };
        Box::new(logger)
    }
}

impl Logger for RequeueEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |requeue_event: &RequeueEvent| {
            log::info!(
                "{}, {}, {}, {}",
                REQUEUE,
                secs_since_unix_epoch(requeue_event.timestamp),
                requeue_event.instance,
                command_info(&requeue_event.command)
            )
        };
        Box::new(logger)
    }
}

impl Logger for LearnEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |learn_event: &LearnEvent| {
            log::info!(
                "{}, {}, {}, {}",
                LEARN,
                secs_since_unix_epoch(learn_event.timestamp),
                learn_event.instance,
                command_info(&learn_event.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for DeliverEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |deliver_event: &DeliverEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                DELIVER,
                secs_since_unix_epoch(deliver_event.timestamp),
                deliver_event.instance,
                command_info(&deliver_event.value),
                deliver_event.duplicate
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartCatchupEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_catchup_event: &StartCatchupEvent| {
            log::info!(
                "{}, {}, {}",
                START_CATCHUP,
                secs_since_unix_epoch(start_catchup_event.timestamp),
                start_catchup_event.from
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndCatchupEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_catchup_event: &EndCatchupEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_CATCHUP,
                secs_since_unix_epoch(end_catchup_event.timestamp),
                end_catchup_event.next_to_deliver,
                end_catchup_event.responders
            )
        };
        Box::new(logger)
    }
}

impl Logger for ConsistencyViolationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |consistency_violation_event: &ConsistencyViolationEvent| {
            log::error!(
                "{}, {}, {}, {}, {}",
                CONSISTENCY_VIOLATION,
                secs_since_unix_epoch(consistency_violation_event.timestamp),
                consistency_violation_event.instance,
                command_info(&consistency_violation_event.recorded),
                command_info(&consistency_violation_event.received)
            )
        };
        Box::new(logger)
    }
}

// Print a command as its idempotency key and an abbreviation of its value.
fn command_info(command: &Command) -> String {
    format!("{}, {}", command.key(), first_seven_base64_chars(&command.value))
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
