/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which runs the handlers registered for each kind of [`Event`].

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus blocks waiting for an event before checking for a shutdown signal.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct EventHandlers {
    pub(crate) promise_handlers: Vec<HandlerPtr<PromiseEvent>>,
    pub(crate) accept_handlers: Vec<HandlerPtr<AcceptEvent>>,
    pub(crate) reject_handlers: Vec<HandlerPtr<RejectEvent>>,
    pub(crate) serve_catchup_handlers: Vec<HandlerPtr<ServeCatchupEvent>>,
    pub(crate) receive_command_handlers: Vec<HandlerPtr<ReceiveCommandEvent>>,
    pub(crate) prepare_handlers: Vec<HandlerPtr<PrepareEvent>>,
    pub(crate) request_accept_handlers: Vec<HandlerPtr<RequestAcceptEvent>>,
    pub(crate) decide_handlers: Vec<HandlerPtr<DecideEvent>>,
    pub(crate) preempt_handlers: Vec<HandlerPtr<PreemptEvent>>,
    pub(crate) phase_timeout_handlers: Vec<HandlerPtr<PhaseTimeoutEvent>>,
    pub(crate) no_progress_handlers: Vec<HandlerPtr<NoProgressEvent>>,
    pub(crate) requeue_handlers: Vec<HandlerPtr<RequeueEvent>>,
    pub(crate) learn_handlers: Vec<HandlerPtr<LearnEvent>>,
    pub(crate) deliver_handlers: Vec<HandlerPtr<DeliverEvent>>,
    pub(crate) start_catchup_handlers: Vec<HandlerPtr<StartCatchupEvent>>,
    pub(crate) end_catchup_handlers: Vec<HandlerPtr<EndCatchupEvent>>,
    pub(crate) consistency_violation_handlers: Vec<HandlerPtr<ConsistencyViolationEvent>>,
}

impl EventHandlers {
    /// Collect the user-supplied handlers, and, if `log_events` is true, the default logging handler
    /// of every event type.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        promise_handler: Option<HandlerPtr<PromiseEvent>>,
        accept_handler: Option<HandlerPtr<AcceptEvent>>,
        reject_handler: Option<HandlerPtr<RejectEvent>>,
        serve_catchup_handler: Option<HandlerPtr<ServeCatchupEvent>>,
        receive_command_handler: Option<HandlerPtr<ReceiveCommandEvent>>,
        prepare_handler: Option<HandlerPtr<PrepareEvent>>,
        request_accept_handler: Option<HandlerPtr<RequestAcceptEvent>>,
        decide_handler: Option<HandlerPtr<DecideEvent>>,
        preempt_handler: Option<HandlerPtr<PreemptEvent>>,
        phase_timeout_handler: Option<HandlerPtr<PhaseTimeoutEvent>>,
        no_progress_handler: Option<HandlerPtr<NoProgressEvent>>,
        requeue_handler: Option<HandlerPtr<RequeueEvent>>,
        learn_handler: Option<HandlerPtr<LearnEvent>>,
        deliver_handler: Option<HandlerPtr<DeliverEvent>>,
        start_catchup_handler: Option<HandlerPtr<StartCatchupEvent>>,
        end_catchup_handler: Option<HandlerPtr<EndCatchupEvent>>,
        consistency_violation_handler: Option<HandlerPtr<ConsistencyViolationEvent>>,
    ) -> EventHandlers {
        fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
            let mut handlers = Vec::new();
            if log_events {
                handlers.push(T::get_logger());
            }
            handlers.extend(user_handler);
            handlers
        }

        EventHandlers {
            promise_handlers: handlers(log_events, promise_handler),
            accept_handlers: handlers(log_events, accept_handler),
            reject_handlers: handlers(log_events, reject_handler),
            serve_catchup_handlers: handlers(log_events, serve_catchup_handler),
            receive_command_handlers: handlers(log_events, receive_command_handler),
            prepare_handlers: handlers(log_events, prepare_handler),
            request_accept_handlers: handlers(log_events, request_accept_handler),
            decide_handlers: handlers(log_events, decide_handler),
            preempt_handlers: handlers(log_events, preempt_handler),
            phase_timeout_handlers: handlers(log_events, phase_timeout_handler),
            no_progress_handlers: handlers(log_events, no_progress_handler),
            requeue_handlers: handlers(log_events, requeue_handler),
            learn_handlers: handlers(log_events, learn_handler),
            deliver_handlers: handlers(log_events, deliver_handler),
            start_catchup_handlers: handlers(log_events, start_catchup_handler),
            end_catchup_handlers: handlers(log_events, end_catchup_handler),
            consistency_violation_handlers: handlers(log_events, consistency_violation_handler),
        }
    }

    /// Check whether no handler at all is registered, in which case the event bus is not started.
    pub(crate) fn is_empty(&self) -> bool {
        self.promise_handlers.is_empty()
            && self.accept_handlers.is_empty()
            && self.reject_handlers.is_empty()
            && self.serve_catchup_handlers.is_empty()
            && self.receive_command_handlers.is_empty()
            && self.prepare_handlers.is_empty()
            && self.request_accept_handlers.is_empty()
            && self.decide_handlers.is_empty()
            && self.preempt_handlers.is_empty()
            && self.phase_timeout_handlers.is_empty()
            && self.no_progress_handlers.is_empty()
            && self.requeue_handlers.is_empty()
            && self.learn_handlers.is_empty()
            && self.deliver_handlers.is_empty()
            && self.start_catchup_handlers.is_empty()
            && self.end_catchup_handlers.is_empty()
            && self.consistency_violation_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Promise(promise_event) => self
                .promise_handlers
                .iter()
                .for_each(|handler| handler(&promise_event)),

            Event::Accept(accept_event) => self
                .accept_handlers
                .iter()
                .for_each(|handler| handler(&accept_event)),

            Event::Reject(reject_event) => self
                .reject_handlers
                .iter()
                .for_each(|handler| handler(&reject_event)),

            Event::ServeCatchup(serve_catchup_event) => self
                .serve_catchup_handlers
                .iter()
                .for_each(|handler| handler(&serve_catchup_event)),

            Event::ReceiveCommand(receive_command_event) => self
                .receive_command_handlers
                .iter()
                .for_each(|handler| handler(&receive_command_event)),

            Event::Prepare(prepare_event) => self
                .prepare_handlers
                .iter()
                .for_each(|handler| handler(&prepare_event)),

            Event::RequestAccept(request_accept_event) => self
                .request_accept_handlers
                .iter()
                .for_each(|handler| handler(&request_accept_event)),

            Event::Decide(decide_event) => self
                .decide_handlers
                .iter()
                .for_each(|handler| handler(&decide_event)),

            Event::Preempt(preempt_event) => self
                .preempt_handlers
                .iter()
                .for_each(|handler| handler(&preempt_event)),

            Event::PhaseTimeout(phase_timeout_event) => self
                .phase_timeout_handlers
                .iter()
                .for_each(|handler| handler(&phase_timeout_event)),

            Event::NoProgress(no_progress_event) => self
                .no_progress_handlers
                .iter()
                .for_each(|handler| handler(&no_progress_event)),

            Event::Requeue(requeue_event) => self
                .requeue_handlers
                .iter()
                .for_each(|handler| handler(&requeue_event)),

            Event::Learn(learn_event) => self
                .learn_handlers
                .iter()
                .for_each(|handler| handler(&learn_event)),

            Event::Deliver(deliver_event) => self
                .deliver_handlers
                .iter()
                .for_each(|handler| handler(&deliver_event)),

            Event::StartCatchup(start_catchup_event) => self
                .start_catchup_handlers
                .iter()
                .for_each(|handler| handler(&start_catchup_event)),

            Event::EndCatchup(end_catchup_event) => self
                .end_catchup_handlers
                .iter()
                .for_each(|handler| handler(&end_catchup_event)),

            Event::ConsistencyViolation(consistency_violation_event) => self
                .consistency_violation_handlers
                .iter()
                .for_each(|handler| handler(&consistency_violation_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Event bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                panic!("The algorithm thread (event publisher) was disconnected from the channel")
            }
        }
    })
}
