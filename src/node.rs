/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a node.
//!
//! A node runs exactly one [`Role`]: an acceptor, a proposer, or a learner. The key components of this
//! module are:
//! - The builder-pattern interface to construct a [specification of the node](NodeSpec) with:
//!   1. `NodeSpec::builder` to construct a `NodeSpecBuilder`,
//!   2. The setters of the `NodeSpecBuilder`, and
//!   3. The `NodeSpecBuilder::build` method to construct a [`NodeSpec`],
//! - The function to [start](NodeSpec::start) a [`Node`] given its specification,
//! - [The type](Node) which keeps the node alive.
//!
//! ## Starting a node
//!
//! ```ignore
//! let node =
//!     NodeSpec::builder()
//!     .role(Role::Learner(LearnerID::new(0)))
//!     .network(network)
//!     .configuration(configuration)
//!     .app(app)
//!     .on_deliver(deliver_handler)
//!     .build()
//!     .start();
//! ```
//!
//! ### Required setters
//!
//! - `.role(...)`
//! - `.network(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! - `.app(...)`: the application a learner delivers decided commands to. Ignored by other roles.
//! - `.retry_policy(...)`: the proposer's timeouts and backoff. Ignored by other roles. Defaults to a
//!   [`DefaultRetryPolicy`] built from the configuration.
//! - One `.on_<event>(...)` setter per event in [`crate::events`], for example `.on_decide(...)`.
//!
//! The node's [configuration](Configuration) is also built using the builder pattern. Only the
//! acceptor set is required:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .acceptors(AcceptorSet::with_size(3)?)
//!     .pipeline_window(16)
//!     .phase_timeout(Duration::from_millis(250))
//!     .build();
//! ```
//!
//! ## Threads
//!
//! A running node has a poller thread that drains the [`Network`], an algorithm thread that runs the
//! role, and, if any event handler is registered (including the default logging handlers), an event bus
//! thread. Dropping the [`Node`] stops all of them.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::{
    acceptor::{implementation::Acceptor, types::AcceptorConfiguration},
    algorithm::{Algorithm, RoleState},
    app::App,
    event_bus::*,
    events::*,
    learner::{implementation::Learner, types::LearnerConfiguration},
    membership::AcceptorSet,
    networking::{datagram::MAX_DATAGRAM_SIZE, network::Network, receiving::start_polling},
    proposer::{implementation::Proposer, types::ProposerConfiguration},
    retry::{DefaultRetryPolicy, RetryPolicy},
    types::data_types::{AcceptorID, LearnerID, ProposerID},
};

/// Stores the user-defined parameters of a node.
///
/// One `Configuration` holds the parameters of every role, so a deployment can share a single value
/// across all of its nodes.
///
/// ## Timeouts
///
/// Durations must be "well below" [u64::MAX] seconds, since they are added to [`Instant`](std::time::Instant)s.
/// A good limit is to cap them at [u32::MAX] seconds.
///
/// ## Log Events
///
/// paxos_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
/// onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.acceptors(...)`

    Optional:
    - `.pipeline_window(...)`
    - `.phase_timeout(...)`
    - `.max_phase_timeout(...)`
    - `.retry_backoff(...)`
    - `.no_progress_warning_after(...)`
    - `.catchup_timeout(...)`
    - `.catchup_limit(...)`
    - `.max_catchup_response_size(...)`
    - `.initial_ballot_counter(...)`
    - `.tick_interval(...)`
    - `.phase2b_to_learners(...)`
    - `.acceptor_recovery(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the static set of acceptors. Required."))]
    pub acceptors: AcceptorSet,
    #[builder(
        default = 8,
        setter(doc = "Set the maximum number of instances a proposer works on at once. Defaults to 8.")
    )]
    pub pipeline_window: usize,
    #[builder(
        default = Duration::from_millis(500),
        setter(doc = "Set how long a proposer waits for a quorum in its first attempt at a phase. Defaults to 500 ms.")
    )]
    pub phase_timeout: Duration,
    #[builder(
        default = Duration::from_secs(8),
        setter(doc = "Set the cap on phase timeouts and backoff delays. Defaults to 8 s.")
    )]
    pub max_phase_timeout: Duration,
    #[builder(
        default = Duration::from_millis(200),
        setter(doc = "Set the base of the randomized backoff between failed attempts. Defaults to 200 ms.")
    )]
    pub retry_backoff: Duration,
    #[builder(
        default = 5,
        setter(doc = "Set the number of failed attempts at one instance after which a proposer warns. Defaults to 5.")
    )]
    pub no_progress_warning_after: u32,
    #[builder(
        default = Duration::from_secs(1),
        setter(doc = "Set how long a learner or a recovering acceptor waits for catch-up responses, or a learner tolerates a gap, before asking the acceptors. Defaults to 1 s.")
    )]
    pub catchup_timeout: Duration,
    #[builder(
        default = 256,
        setter(doc = "Set the maximum number of entries per list in one catch-up response. Defaults to 256.")
    )]
    pub catchup_limit: u32,
    #[builder(
        default = MAX_DATAGRAM_SIZE,
        setter(doc = "Set the maximum size in bytes of an encoded catch-up response frame. An acceptor cuts its response short to fit, but always sends at least one decision. Defaults to the largest UDP payload.")
    )]
    pub max_catchup_response_size: usize,
    #[builder(
        default = 0,
        setter(doc = "Set the ballot counter a proposer starts from. A restarted proposer must start above every counter it used before. Defaults to 0.")
    )]
    pub initial_ballot_counter: u64,
    #[builder(
        default = Duration::from_millis(10),
        setter(doc = "Set the longest time the algorithm thread waits for a message before ticking its role. Defaults to 10 ms.")
    )]
    pub tick_interval: Duration,
    #[builder(
        default = false,
        setter(doc = "Send acceptors' Phase2b messages to the learners too, so that they can learn without a Decision. Defaults to false.")
    )]
    pub phase2b_to_learners: bool,
    #[builder(
        default = false,
        setter(doc = "Have a starting acceptor recover the decision log from its peers. Defaults to false.")
    )]
    pub acceptor_recovery: bool,
    #[builder(
        default = true,
        setter(doc = "Log every event with the default logging handlers? Defaults to true.")
    )]
    pub log_events: bool,
}

impl Into<(AcceptorConfiguration, ProposerConfiguration, LearnerConfiguration)> for Configuration {
    fn into(self) -> (AcceptorConfiguration, ProposerConfiguration, LearnerConfiguration) {
        let acceptor_config = AcceptorConfiguration {
            acceptors: self.acceptors.clone(),
            phase2b_to_learners: self.phase2b_to_learners,
            catchup_limit: self.catchup_limit,
            max_catchup_response_size: self.max_catchup_response_size,
            catchup_timeout: self.catchup_timeout,
            recovery: self.acceptor_recovery,
        };
        let proposer_config = ProposerConfiguration {
            acceptors: self.acceptors.clone(),
            pipeline_window: self.pipeline_window,
            initial_ballot_counter: self.initial_ballot_counter,
            no_progress_warning_after: self.no_progress_warning_after,
            phase_timeout: self.phase_timeout,
            max_phase_timeout: self.max_phase_timeout,
            retry_backoff: self.retry_backoff,
        };
        let learner_config = LearnerConfiguration {
            acceptors: self.acceptors,
            catchup_timeout: self.catchup_timeout,
            catchup_limit: self.catchup_limit,
        };
        (acceptor_config, proposer_config, learner_config)
    }
}

/// The role a node plays, and its identity within that role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Acceptor(AcceptorID),
    Proposer(ProposerID),
    Learner(LearnerID),
}

/// Stores all necessary parameters and trait implementations required to run a [`Node`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.role(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.app(...)`
    - `.retry_policy(...)`
    - `.on_promise(...)`
    - `.on_accept(...)`
    - `.on_reject(...)`
    - `.on_serve_catchup(...)`
    - `.on_receive_command(...)`
    - `.on_prepare(...)`
    - `.on_request_accept(...)`
    - `.on_decide(...)`
    - `.on_preempt(...)`
    - `.on_phase_timeout(...)`
    - `.on_no_progress(...)`
    - `.on_requeue(...)`
    - `.on_learn(...)`
    - `.on_deliver(...)`
    - `.on_start_catchup(...)`
    - `.on_end_catchup(...)`
    - `.on_consistency_violation(...)`
"))]
pub struct NodeSpec<N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the role the node runs. Required."))]
    role: Role,
    #[builder(setter(doc = "Set the implementation of networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration). Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |app: impl App + 'static| Some(Box::new(app) as Box<dyn App>),
    doc = "Set the application that a learner delivers decided commands to. The argument must implement the [App](crate::app::App) trait. Optional."))]
    app: Option<Box<dyn App>>,
    #[builder(default, setter(transform = |retry_policy: impl RetryPolicy + 'static| Some(Box::new(retry_policy) as Box<dyn RetryPolicy>),
    doc = "Set the proposer's [retry policy](crate::retry::RetryPolicy). Optional."))]
    retry_policy: Option<Box<dyn RetryPolicy>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PromiseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PromiseEvent>),
    doc = "Register a handler closure to be invoked after an acceptor promises a ballot. Optional."))]
    on_promise: Option<HandlerPtr<PromiseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcceptEvent>),
    doc = "Register a handler closure to be invoked after an acceptor accepts a value. Optional."))]
    on_accept: Option<HandlerPtr<AcceptEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectEvent>),
    doc = "Register a handler closure to be invoked after an acceptor ignores a request with a stale ballot. Optional."))]
    on_reject: Option<HandlerPtr<RejectEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ServeCatchupEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ServeCatchupEvent>),
    doc = "Register a handler closure to be invoked after an acceptor answers a catch-up request. Optional."))]
    on_serve_catchup: Option<HandlerPtr<ServeCatchupEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveCommandEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveCommandEvent>),
    doc = "Register a handler closure to be invoked after a proposer queues a new command. Optional."))]
    on_receive_command: Option<HandlerPtr<ReceiveCommandEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PrepareEvent>),
    doc = "Register a handler closure to be invoked after a proposer broadcasts a Phase1a. Optional."))]
    on_prepare: Option<HandlerPtr<PrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RequestAcceptEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RequestAcceptEvent>),
    doc = "Register a handler closure to be invoked after a proposer broadcasts a Phase2a. Optional."))]
    on_request_accept: Option<HandlerPtr<RequestAcceptEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DecideEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DecideEvent>),
    doc = "Register a handler closure to be invoked after a proposer observes a quorum of Phase2b messages. Optional."))]
    on_decide: Option<HandlerPtr<DecideEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PreemptEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PreemptEvent>),
    doc = "Register a handler closure to be invoked after a proposer abandons an attempt because of a higher ballot. Optional."))]
    on_preempt: Option<HandlerPtr<PreemptEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PhaseTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PhaseTimeoutEvent>),
    doc = "Register a handler closure to be invoked after a proposer's phase times out. Optional."))]
    on_phase_timeout: Option<HandlerPtr<PhaseTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NoProgressEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NoProgressEvent>),
    doc = "Register a handler closure to be invoked when a proposer keeps failing to decide an instance. Optional."))]
    on_no_progress: Option<HandlerPtr<NoProgressEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RequeueEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RequeueEvent>),
    doc = "Register a handler closure to be invoked after a proposer puts a command that lost an instance back in its queue. Optional."))]
    on_requeue: Option<HandlerPtr<RequeueEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&LearnEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<LearnEvent>),
    doc = "Register a handler closure to be invoked after a learner records a decision. Optional."))]
    on_learn: Option<HandlerPtr<LearnEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DeliverEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DeliverEvent>),
    doc = "Register a handler closure to be invoked after a learner delivers an instance. Optional."))]
    on_deliver: Option<HandlerPtr<DeliverEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartCatchupEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartCatchupEvent>),
    doc = "Register a handler closure to be invoked after a learner sends a catch-up request. Optional."))]
    on_start_catchup: Option<HandlerPtr<StartCatchupEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndCatchupEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndCatchupEvent>),
    doc = "Register a handler closure to be invoked after a quorum of acceptors has answered a learner's catch-up request. Optional."))]
    on_end_catchup: Option<HandlerPtr<EndCatchupEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ConsistencyViolationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ConsistencyViolationEvent>),
    doc = "Register a handler closure to be invoked when two different values are reported as decided for one instance. Optional."))]
    on_consistency_violation: Option<HandlerPtr<ConsistencyViolationEvent>>,
}

impl<N: Network + 'static> NodeSpec<N> {
    /// Starts all threads and channels associated with running a node, and returns the handles to them
    /// in a [`Node`] struct.
    pub fn start(self) -> Node {
        let log_events = self.configuration.log_events;
        let tick_interval = self.configuration.tick_interval;
        let (acceptor_config, proposer_config, learner_config) = self.configuration.into();

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, messages) = start_polling(self.network.clone(), poller_shutdown_receiver);

        let event_handlers = EventHandlers::new(
            log_events,
            self.on_promise,
            self.on_accept,
            self.on_reject,
            self.on_serve_catchup,
            self.on_receive_command,
            self.on_prepare,
            self.on_request_accept,
            self.on_decide,
            self.on_preempt,
            self.on_phase_timeout,
            self.on_no_progress,
            self.on_requeue,
            self.on_learn,
            self.on_deliver,
            self.on_start_catchup,
            self.on_end_catchup,
            self.on_consistency_violation,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let role = match self.role {
            Role::Acceptor(id) => RoleState::Acceptor(Acceptor::new(
                id,
                acceptor_config,
                self.network,
                event_publisher,
            )),
            Role::Proposer(id) => {
                let retry_policy = self.retry_policy.unwrap_or_else(|| {
                    Box::new(DefaultRetryPolicy::new(
                        proposer_config.phase_timeout,
                        proposer_config.max_phase_timeout,
                        proposer_config.retry_backoff,
                    ))
                });
                RoleState::Proposer(Proposer::new(
                    id,
                    proposer_config,
                    retry_policy,
                    self.network,
                    event_publisher,
                ))
            }
            Role::Learner(id) => RoleState::Learner(Learner::new(
                id,
                learner_config,
                self.app,
                self.network,
                event_publisher,
            )),
        };

        let halted = Arc::new(AtomicBool::new(false));
        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = Algorithm::new(
            role,
            messages,
            tick_interval,
            halted.clone(),
            algorithm_shutdown_receiver,
        )
        .start();

        let (event_bus_shutdown, event_bus) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus =
                    start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
                (Some(event_bus_shutdown), Some(event_bus))
            }
            None => (None, None),
        };

        Node {
            role: self.role,
            halted,
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// A handle to the background threads of a node. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Node {
    role: Role,
    halted: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Node {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Check whether the role has stopped after an unrecoverable error, such as two different values
    /// being reported as decided for one instance. A halted node ignores all further messages.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Safety: the order of thread shutdown in this function is important. The algorithm thread
        // receives messages from the poller, and assumes that the poller will live longer than it.

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| shutdown.send(()).unwrap());
        if let Some(event_bus) = self.event_bus.take() {
            event_bus.join().unwrap();
        }

        self.algorithm_shutdown.send(()).unwrap();
        if let Some(algorithm) = self.algorithm.take() {
            algorithm.join().unwrap();
        }

        self.poller_shutdown.send(()).unwrap();
        if let Some(poller) = self.poller.take() {
            poller.join().unwrap();
        }
    }
}
