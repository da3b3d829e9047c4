/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the network.

use super::{
    messages::{Group, Message},
    network::Network,
};

/// Handle for broadcasting messages to a [`Network`].
///
/// It can be used to broadcast instances of any type that implement the [`Into<Message>`] trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn broadcast<S: Into<Message>>(&mut self, group: Group, msg: S) {
        self.network.broadcast(group, msg.into())
    }

    /// Broadcast the same message to several groups.
    pub(crate) fn broadcast_to_all<S: Into<Message>>(&mut self, groups: &[Group], msg: S) {
        let msg = msg.into();
        for group in groups {
            self.network.broadcast(*group, msg.clone())
        }
    }
}
