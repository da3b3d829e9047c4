use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use paxos_rs::networking::{
    messages::{Group, Message},
    network::Network,
};

type Registry = Arc<Mutex<HashMap<Group, Vec<Sender<Message>>>>>;

/// A mock network which passes messages between threads using channels.
///
/// Stubs are created through [`MockNetwork::stub`] and can be created at any time. A stub only receives
/// broadcasts made after it was created, like a node that joins a real network late.
#[derive(Clone)]
pub(crate) struct MockNetwork {
    registry: Registry,
}

impl MockNetwork {
    pub(crate) fn new() -> MockNetwork {
        MockNetwork {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a stub that receives every broadcast to the groups in `member_of`.
    pub(crate) fn stub(&self, member_of: &[Group]) -> NetworkStub {
        let (sender, inbox) = mpsc::channel();
        let mut registry = self.registry.lock().unwrap();
        for group in member_of {
            registry.entry(*group).or_default().push(sender.clone());
        }

        NetworkStub {
            registry: self.registry.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
        }
    }
}

#[derive(Clone)]
pub(crate) struct NetworkStub {
    registry: Registry,
    inbox: Arc<Mutex<Receiver<Message>>>,
}

impl Network for NetworkStub {
    fn broadcast(&mut self, group: Group, message: Message) {
        if let Some(members) = self.registry.lock().unwrap().get(&group) {
            for member in members {
                let _ = member.send(message.clone());
            }
        }
    }

    fn recv(&mut self) -> Option<Message> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}
