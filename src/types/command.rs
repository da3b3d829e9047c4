/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Commands submitted by clients, which are the values Paxos instances decide on.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{ClientID, Sequence};

/// An opaque value submitted by a client, labelled with an idempotency key.
///
/// Two commands with the same [`key`](Self::key) are considered the same submission. Proposers and
/// learners use the key to avoid deciding or delivering a resubmitted command twice.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Command {
    pub client: ClientID,
    pub sequence: Sequence,
    pub value: Vec<u8>,
}

impl Command {
    pub fn new(client: ClientID, sequence: Sequence, value: Vec<u8>) -> Self {
        Self {
            client,
            sequence,
            value,
        }
    }

    /// Get the idempotency key of this command.
    pub fn key(&self) -> CommandKey {
        CommandKey {
            client: self.client,
            sequence: self.sequence,
        }
    }
}

/// The `(client, sequence)` pair that identifies a [`Command`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CommandKey {
    pub client: ClientID,
    pub sequence: Sequence,
}

impl Display for CommandKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.sequence)
    }
}
