//! End-to-end test of threaded nodes talking over a [`MockNetwork`].
//!
//! Three acceptors, one proposer, and one learner are started as separate [`Node`]s. A client submits
//! a handful of commands, and the test waits for the learner to deliver all of them. Then a second
//! learner joins late and catches up.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use paxos_rs::{
    client::Client,
    membership::AcceptorSet,
    networking::messages::Group,
    node::{Configuration, Node, NodeSpec, Role},
    types::data_types::{AcceptorID, ClientID, LearnerID, ProposerID},
};

mod common;

use crate::common::{
    app::RecordingApp,
    logging::{log_with_context, setup_logger},
    network::MockNetwork,
};

const COMMANDS: usize = 5;
const WAIT_LIMIT: Duration = Duration::from_secs(30);

fn configuration() -> Configuration {
    Configuration::builder()
        .acceptors(AcceptorSet::with_size(3).unwrap())
        .phase_timeout(Duration::from_millis(200))
        .catchup_timeout(Duration::from_millis(300))
        .build()
}

fn start_learner(network: &MockNetwork, id: u32, app: &RecordingApp) -> Node {
    NodeSpec::builder()
        .role(Role::Learner(LearnerID::new(id)))
        .network(network.stub(&[Group::Learners]))
        .configuration(configuration())
        .app(app.clone())
        .build()
        .start()
}

/// Sleep until `done` holds, or panic after [`WAIT_LIMIT`].
fn wait_until(node: &str, what: &str, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < WAIT_LIMIT, "{} timed out waiting: {}", node, what);
        log_with_context(node, &format!("waiting: {}", what));
        thread::sleep(Duration::from_millis(100));
    }
}

#[test]
fn threaded_nodes_decide_and_deliver() {
    setup_logger(log::LevelFilter::Debug);

    let network = MockNetwork::new();

    let acceptors: Vec<Node> = (0..3)
        .map(|i| {
            NodeSpec::builder()
                .role(Role::Acceptor(AcceptorID::new(i)))
                .network(network.stub(&[Group::Acceptors]))
                .configuration(configuration())
                .build()
                .start()
        })
        .collect();

    let proposer = NodeSpec::builder()
        .role(Role::Proposer(ProposerID::new(0)))
        .network(network.stub(&[Group::Proposers]))
        .configuration(configuration())
        .build()
        .start();

    let delivered_events = Arc::new(AtomicUsize::new(0));
    let app = RecordingApp::new();
    let learner = {
        let delivered_events = delivered_events.clone();
        NodeSpec::builder()
            .role(Role::Learner(LearnerID::new(0)))
            .network(network.stub(&[Group::Learners]))
            .configuration(configuration())
            .app(app.clone())
            .on_deliver(move |_| {
                delivered_events.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .start()
    };

    let mut client = Client::new(ClientID::new(0), network.stub(&[]));
    let submitted: Vec<Vec<u8>> = (0..COMMANDS)
        .map(|i| {
            let value = format!("command {}", i).into_bytes();
            client.submit(value.clone());
            value
        })
        .collect();

    wait_until("learner 0", "deliver every command", || {
        app.delivered().len() == COMMANDS
    });

    // With a single proposer and a reliable network, instances follow submission order.
    assert_eq!(app.values(), submitted);
    wait_until("learner 0", "run the deliver handler for every command", || {
        delivered_events.load(Ordering::SeqCst) == COMMANDS
    });

    // A learner that joins now has missed every Decision, and relies on catch-up.
    let late_app = RecordingApp::new();
    let late_learner = start_learner(&network, 1, &late_app);
    wait_until("learner 1", "catch up", || late_app.delivered().len() == COMMANDS);
    assert_eq!(late_app.delivered(), app.delivered());

    for node in acceptors.iter().chain([&proposer, &learner, &late_learner]) {
        assert!(!node.is_halted(), "{:?} halted", node.role());
    }
    assert_eq!(late_learner.role(), Role::Learner(LearnerID::new(1)));
}
