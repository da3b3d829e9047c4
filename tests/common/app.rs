//! [`RecordingApp`], an implementation of [`App`] used in all of the integration tests.

use std::sync::{Arc, Mutex};

use paxos_rs::{
    app::App,
    types::{command::Command, data_types::Instance},
};

/// An app that appends every delivered command to a shared list, which tests read through a clone of the
/// list obtained from [`delivered`](RecordingApp::delivered).
#[derive(Clone)]
pub(crate) struct RecordingApp {
    delivered: Arc<Mutex<Vec<(Instance, Command)>>>,
}

impl RecordingApp {
    pub(crate) fn new() -> RecordingApp {
        RecordingApp {
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn delivered(&self) -> Vec<(Instance, Command)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Get the values of the delivered commands, in delivery order.
    pub(crate) fn values(&self) -> Vec<Vec<u8>> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, command)| command.value.clone())
            .collect()
    }
}

impl App for RecordingApp {
    fn deliver(&mut self, instance: Instance, command: &Command) {
        self.delivered.lock().unwrap().push((instance, command.clone()));
    }
}
