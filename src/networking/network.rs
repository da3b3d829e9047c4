/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use super::messages::{Group, Message};

/// A best-effort broadcast medium connecting the nodes of a Paxos deployment.
///
/// Implementations may lose, duplicate, and reorder messages; every role tolerates this. The set of
/// nodes in each [`Group`] is fixed when the network is created.
pub trait Network: Clone + Send {
    /// Send a message to every member of `group` without blocking.
    fn broadcast(&mut self, group: Group, message: Message);

    /// Receive a message addressed to this node. Returns immediately with a None if no message is
    /// available now.
    fn recv(&mut self) -> Option<Message>;
}
