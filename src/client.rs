/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A minimal client that submits commands to the proposers.
//!
//! Each command a client submits is stamped with the client's [`ClientID`] and the next [`Sequence`]
//! number. The pair is the command's [key](crate::types::command::CommandKey), which proposers and
//! learners use to recognize a resubmitted command.
//!
//! A client does not learn whether its command was decided. Applications that need to know can watch
//! the [`Deliver`](crate::events::Event::Deliver) events of a learner, and call
//! [`resubmit`](Client::resubmit) for commands that have not shown up after some time.

use crate::{
    networking::{
        messages::{Group, Propose},
        network::Network,
        sending::SenderHandle,
    },
    types::{
        command::Command,
        data_types::{ClientID, Sequence},
    },
};

pub struct Client<N: Network> {
    id: ClientID,
    next_sequence: Sequence,
    sender: SenderHandle<N>,
}

impl<N: Network> Client<N> {
    pub fn new(id: ClientID, network: N) -> Self {
        Self::with_first_sequence(id, Sequence::new(0), network)
    }

    /// Create a client whose first command gets sequence number `first`. A restarted client must
    /// start past every sequence number it used before.
    pub fn with_first_sequence(id: ClientID, first: Sequence, network: N) -> Self {
        Self {
            id,
            next_sequence: first,
            sender: SenderHandle::new(network),
        }
    }

    /// Broadcast `value` to the proposers as a new command, and return the command.
    pub fn submit(&mut self, value: Vec<u8>) -> Command {
        let command = Command::new(self.id, self.next_sequence, value);
        self.next_sequence += 1;
        self.resubmit(&command);
        command
    }

    /// Broadcast an already submitted command again, for example after a proposer crashed.
    pub fn resubmit(&mut self, command: &Command) {
        self.sender.broadcast(
            Group::Proposers,
            Propose {
                command: command.clone(),
            },
        );
    }

    pub fn id(&self) -> ClientID {
        self.id
    }
}
