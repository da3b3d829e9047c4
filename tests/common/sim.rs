//! [`Cluster`], a deterministic, single-threaded cluster that drives roles directly in virtual time.
//!
//! Every role gets a [`SimNetwork`] whose broadcasts land in an outbox. The cluster moves messages
//! from the outboxes to an in-flight queue, one copy per member of the target group, and delivers them
//! one at a time. Depending on its [`Faults`], each copy may be dropped, duplicated, or delivered out of
//! order, with all randomness drawn from one seeded [`StdRng`].
//!
//! Virtual time only moves when no message is in flight: the cluster then jumps to the earliest
//! deadline of any role and ticks every role.

use std::{
    cmp::max,
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Instant,
};

use paxos_rs::{
    acceptor::{implementation::Acceptor, types::AcceptorConfiguration},
    client::Client,
    learner::{implementation::Learner, types::LearnerConfiguration},
    membership::AcceptorSet,
    networking::{
        messages::{Group, Message, Propose},
        network::Network,
    },
    node::Configuration,
    proposer::{implementation::Proposer, types::ProposerConfiguration},
    retry::DefaultRetryPolicy,
    types::{
        command::Command,
        data_types::{ClientID, Instance, LearnerID, ProposerID, Sequence},
    },
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::app::RecordingApp;

pub(crate) type Outbox = Arc<Mutex<Vec<(Group, Message)>>>;

/// A network that only records what is broadcast. The [`Cluster`] does the delivering.
#[derive(Clone)]
pub(crate) struct SimNetwork {
    outbox: Outbox,
}

impl SimNetwork {
    /// Create a network for driving a single role by hand. Its broadcasts can be read from the returned
    /// outbox with [`drain`].
    pub(crate) fn capture() -> (SimNetwork, Outbox) {
        let outbox = Outbox::default();
        (
            SimNetwork {
                outbox: outbox.clone(),
            },
            outbox,
        )
    }
}

/// Take every broadcast recorded in `outbox` so far.
pub(crate) fn drain(outbox: &Outbox) -> Vec<(Group, Message)> {
    outbox.lock().unwrap().drain(..).collect()
}

impl Network for SimNetwork {
    fn broadcast(&mut self, group: Group, message: Message) {
        self.outbox.lock().unwrap().push((group, message));
    }

    fn recv(&mut self) -> Option<Message> {
        None
    }
}

/// The destination of a message copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Addr {
    Acceptor(usize),
    Proposer(usize),
    Learner(usize),
}

/// How unreliable the simulated network is.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Faults {
    /// Probability that a message copy is lost.
    pub(crate) drop: f64,
    /// Probability that a message copy is delivered twice.
    pub(crate) duplicate: f64,
    /// Deliver in-flight messages in random order instead of first-in, first-out.
    pub(crate) reorder: bool,
}

impl Faults {
    pub(crate) fn none() -> Faults {
        Faults {
            drop: 0.0,
            duplicate: 0.0,
            reorder: false,
        }
    }

    pub(crate) fn lossy(drop: f64, duplicate: f64) -> Faults {
        Faults {
            drop,
            duplicate,
            reorder: true,
        }
    }
}

type DropFilter = Box<dyn FnMut(Addr, &Message) -> bool>;

pub(crate) struct Cluster {
    pub(crate) acceptors: Vec<Acceptor<SimNetwork>>,
    pub(crate) proposers: Vec<Proposer<SimNetwork>>,
    pub(crate) learners: Vec<Learner<SimNetwork>>,
    /// The app of each learner, by learner index.
    pub(crate) apps: Vec<RecordingApp>,
    client: Client<SimNetwork>,
    next_direct_sequence: u64,
    config: Configuration,
    outboxes: Vec<Outbox>,
    in_flight: VecDeque<(Addr, Message)>,
    faults: Faults,
    drop_filter: Option<DropFilter>,
    rng: StdRng,
    seed: u64,
    now: Instant,
}

impl Cluster {
    /// Create a cluster of `acceptors` acceptors, `proposers` proposers, and `learners` learners that
    /// runs on a reliable network with the default configuration.
    pub(crate) fn new(acceptors: u32, proposers: usize, learners: usize, seed: u64) -> Cluster {
        let config = Configuration::builder()
            .acceptors(AcceptorSet::with_size(acceptors).unwrap())
            .build();
        Cluster::with_configuration(config, proposers, learners, Faults::none(), seed)
    }

    pub(crate) fn with_configuration(
        config: Configuration,
        proposers: usize,
        learners: usize,
        faults: Faults,
        seed: u64,
    ) -> Cluster {
        let client_outbox = Outbox::default();
        let client = Client::new(
            ClientID::new(0),
            SimNetwork {
                outbox: client_outbox.clone(),
            },
        );

        let mut cluster = Cluster {
            acceptors: Vec::new(),
            proposers: Vec::new(),
            learners: Vec::new(),
            apps: Vec::new(),
            client,
            next_direct_sequence: 0,
            config: config.clone(),
            outboxes: vec![client_outbox],
            in_flight: VecDeque::new(),
            faults,
            drop_filter: None,
            rng: StdRng::seed_from_u64(seed),
            seed,
            now: Instant::now(),
        };

        let (acceptor_config, _, _) = cluster.split_config();
        for id in config.acceptors.iter() {
            let network = cluster.new_network();
            let mut acceptor = Acceptor::new(*id, acceptor_config.clone(), network, None);
            acceptor.start(cluster.now);
            cluster.acceptors.push(acceptor);
        }
        for _ in 0..proposers {
            cluster.add_proposer();
        }
        for _ in 0..learners {
            cluster.add_learner();
        }

        cluster
    }

    /// Add a proposer with the next proposer id, and return its index.
    pub(crate) fn add_proposer(&mut self) -> usize {
        let index = self.proposers.len();
        let (_, proposer_config, _) = self.split_config();
        let retry_policy = DefaultRetryPolicy::with_seed(
            proposer_config.phase_timeout,
            proposer_config.max_phase_timeout,
            proposer_config.retry_backoff,
            self.seed.wrapping_add(index as u64 + 1),
        );
        let network = self.new_network();
        self.proposers.push(Proposer::new(
            ProposerID::new(index as u32),
            proposer_config,
            Box::new(retry_policy),
            network,
            None,
        ));
        index
    }

    /// Add a learner, start it, and return its index. A learner added late only hears about earlier
    /// decisions through catch-up.
    pub(crate) fn add_learner(&mut self) -> usize {
        let index = self.learners.len();
        let (_, _, learner_config) = self.split_config();
        let app = RecordingApp::new();
        let network = self.new_network();
        let mut learner = Learner::new(
            LearnerID::new(index as u32),
            learner_config,
            Some(Box::new(app.clone())),
            network,
            None,
        );
        learner.start(self.now);
        self.learners.push(learner);
        self.apps.push(app);
        index
    }

    /// Replace acceptor `index` with a fresh one that has lost all of its state, as after a crash.
    pub(crate) fn restart_acceptor(&mut self, index: usize) {
        let (acceptor_config, _, _) = self.split_config();
        let id = self.acceptors[index].id();
        let network = self.new_network();
        let mut acceptor = Acceptor::new(id, acceptor_config, network, None);
        acceptor.start(self.now);
        self.acceptors[index] = acceptor;
    }

    /// Submit a new command with `value` through the client, which broadcasts it to every proposer.
    pub(crate) fn submit(&mut self, value: &[u8]) -> Command {
        self.client.submit(value.to_vec())
    }

    /// Submit a new command with `value` to proposer `index` only. Such commands come from a client
    /// other than the one used by [`submit`](Self::submit).
    pub(crate) fn submit_to(&mut self, index: usize, value: &[u8]) -> Command {
        let command = Command::new(
            ClientID::new(u32::MAX),
            Sequence::new(self.next_direct_sequence),
            value.to_vec(),
        );
        self.next_direct_sequence += 1;
        self.propose_to(index, command.clone());
        command
    }

    /// Put a Propose message for `command` in flight to proposer `index` only.
    pub(crate) fn propose_to(&mut self, index: usize, command: Command) {
        self.in_flight
            .push_back((Addr::Proposer(index), Message::Propose(Propose { command })));
    }

    /// Drop every message copy for which `filter` returns true.
    pub(crate) fn set_drop_filter(&mut self, filter: impl FnMut(Addr, &Message) -> bool + 'static) {
        self.drop_filter = Some(Box::new(filter));
    }

    pub(crate) fn clear_drop_filter(&mut self) {
        self.drop_filter = None;
    }

    pub(crate) fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    /// Deliver one in-flight message copy. Returns false if there was nothing to deliver.
    pub(crate) fn step(&mut self) -> bool {
        self.collect();
        if self.in_flight.is_empty() {
            return false;
        }

        let index = if self.faults.reorder {
            self.rng.gen_range(0, self.in_flight.len())
        } else {
            0
        };
        let (to, message) = match self.in_flight.remove(index) {
            Some(copy) => copy,
            None => return false,
        };

        if let Some(filter) = &mut self.drop_filter {
            if filter(to, &message) {
                return true;
            }
        }
        if self.faults.drop > 0.0 && self.rng.gen_bool(self.faults.drop) {
            return true;
        }
        if self.faults.duplicate > 0.0 && self.rng.gen_bool(self.faults.duplicate) {
            self.in_flight.push_back((to, message.clone()));
        }

        self.deliver(to, message);
        self.collect();
        true
    }

    /// Deliver messages until none is in flight, without moving time.
    pub(crate) fn deliver_all(&mut self) {
        while self.step() {}
    }

    /// Move virtual time to the earliest deadline of any role, and tick every role. Returns false if no
    /// role has a deadline.
    pub(crate) fn fire_next_timer(&mut self) -> bool {
        let next_deadline = self
            .acceptors
            .iter()
            .filter_map(|acceptor| acceptor.next_deadline())
            .chain(
                self.proposers
                    .iter()
                    .filter_map(|proposer| proposer.next_deadline()),
            )
            .chain(
                self.learners
                    .iter()
                    .filter_map(|learner| learner.next_deadline()),
            )
            .min();

        match next_deadline {
            Some(deadline) => {
                self.now = max(self.now, deadline);
                self.tick();
                true
            }
            None => false,
        }
    }

    /// Deliver messages and fire timers until `done` holds. Returns false if it still does not hold
    /// after `max_steps` deliveries and timer firings.
    pub(crate) fn run_until(&mut self, max_steps: usize, mut done: impl FnMut(&Cluster) -> bool) -> bool {
        for _ in 0..max_steps {
            if done(self) {
                return true;
            }
            if !self.step() && !self.fire_next_timer() {
                break;
            }
        }
        done(self)
    }

    /// Check that no two roles know different values as decided for any instance below `up_to`.
    pub(crate) fn assert_agreement(&self, up_to: u64) {
        for i in 0..up_to {
            let instance = Instance::new(i);
            let decisions = self
                .acceptors
                .iter()
                .filter_map(|acceptor| acceptor.decision(instance))
                .chain(
                    self.proposers
                        .iter()
                        .filter_map(|proposer| proposer.decision(instance)),
                )
                .chain(
                    self.learners
                        .iter()
                        .filter_map(|learner| learner.decision(instance)),
                );

            let mut first: Option<&Command> = None;
            for decision in decisions {
                match first {
                    None => first = Some(decision),
                    Some(first) => assert_eq!(
                        first, decision,
                        "two values decided for instance {}",
                        instance
                    ),
                }
            }
        }
    }

    fn tick(&mut self) {
        for acceptor in &mut self.acceptors {
            acceptor.tick(self.now);
        }
        for proposer in &mut self.proposers {
            proposer.tick(self.now);
        }
        for learner in &mut self.learners {
            learner.tick(self.now);
        }
    }

    fn deliver(&mut self, to: Addr, message: Message) {
        match to {
            Addr::Acceptor(i) => self.acceptors[i]
                .on_receive_msg(message, self.now)
                .expect("acceptor observed conflicting decisions"),
            Addr::Proposer(i) => self.proposers[i]
                .on_receive_msg(message, self.now)
                .expect("proposer observed conflicting decisions"),
            Addr::Learner(i) => self.learners[i]
                .on_receive_msg(message, self.now)
                .expect("learner observed conflicting decisions"),
        }
    }

    /// Move broadcasts from every outbox to the in-flight queue, one copy per group member.
    fn collect(&mut self) {
        for outbox in &self.outboxes {
            let broadcasts: Vec<(Group, Message)> = outbox.lock().unwrap().drain(..).collect();
            for (group, message) in broadcasts {
                let members = match group {
                    Group::Acceptors => (0..self.acceptors.len()).map(Addr::Acceptor).collect::<Vec<_>>(),
                    Group::Proposers => (0..self.proposers.len()).map(Addr::Proposer).collect(),
                    Group::Learners => (0..self.learners.len()).map(Addr::Learner).collect(),
                };
                for member in members {
                    self.in_flight.push_back((member, message.clone()));
                }
            }
        }
    }

    fn new_network(&mut self) -> SimNetwork {
        let outbox = Outbox::default();
        self.outboxes.push(outbox.clone());
        SimNetwork { outbox }
    }

    fn split_config(&self) -> (AcceptorConfiguration, ProposerConfiguration, LearnerConfiguration) {
        self.config.clone().into()
    }
}
