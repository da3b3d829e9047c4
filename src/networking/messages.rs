/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between roles, and their wire encoding.
//!
//! Every message kind is a variant of [`Message`]. Messages are turned into bytes only at the
//! transport boundary (see [`datagram`](super::datagram)), using [`Message::encode`] and
//! [`Message::decode`].
//!
//! ## Wire format
//!
//! A frame is a single version byte ([`WIRE_VERSION`]) followed by the borsh encoding of the
//! `Message`. Frames with any other version, truncated frames, and frames with trailing bytes are
//! rejected with a [`CodecError`].

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    ballot::{Ballot, Vote},
    command::Command,
    data_types::{AcceptorID, Instance},
};

/// Version byte that prefixes every encoded frame.
pub const WIRE_VERSION: u8 = 1;

/// A logical group of nodes that a message can be broadcast to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum Group {
    Acceptors,
    Proposers,
    Learners,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    Phase1a(Phase1a),
    Phase1b(Phase1b),
    Phase2a(Phase2a),
    Phase2b(Phase2b),
    Decision(Decision),
    Propose(Propose),
    CatchupRequest(CatchupRequest),
    CatchupResponse(CatchupResponse),
}

impl Message {
    /// Get the instance this message is about, if it is about a single instance.
    pub fn instance(&self) -> Option<Instance> {
        match self {
            Message::Phase1a(msg) => Some(msg.instance),
            Message::Phase1b(msg) => Some(msg.instance),
            Message::Phase2a(msg) => Some(msg.instance),
            Message::Phase2b(msg) => Some(msg.instance),
            Message::Decision(msg) => Some(msg.instance),
            Message::Propose(_) | Message::CatchupRequest(_) | Message::CatchupResponse(_) => None,
        }
    }

    /// Encode this message into a frame.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut frame = vec![WIRE_VERSION];
        self.serialize(&mut frame)?;
        Ok(frame)
    }

    /// Decode a frame produced by [`encode`](Self::encode).
    pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
        match frame.split_first() {
            None => Err(CodecError::Empty),
            Some((&WIRE_VERSION, body)) => Ok(Message::try_from_slice(body)?),
            Some((&version, _)) => Err(CodecError::UnsupportedVersion(version)),
        }
    }
}

/// Get the number of bytes `value` takes up inside a frame. Values that cannot be encoded count as
/// infinitely large.
pub(crate) fn encoded_len<T: BorshSerialize>(value: &T) -> usize {
    value.try_to_vec().map_or(usize::MAX, |bytes| bytes.len())
}

/// Phase 1a ("prepare"): a proposer asks acceptors to promise not to accept ballots lower than `ballot`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Phase1a {
    pub instance: Instance,
    pub ballot: Ballot,
}

/// Phase 1b ("promise"): an acceptor's promise for `ballot`, carrying the vote it has accepted for the
/// instance so far, if any.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Phase1b {
    pub instance: Instance,
    pub acceptor: AcceptorID,
    pub ballot: Ballot,
    pub accepted: Option<Vote>,
}

/// Phase 2a ("accept request"): a proposer asks acceptors to accept `value` in `ballot`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Phase2a {
    pub instance: Instance,
    pub ballot: Ballot,
    pub value: Command,
}

/// Phase 2b ("accepted"): an acceptor has accepted `value` in `ballot`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Phase2b {
    pub instance: Instance,
    pub acceptor: AcceptorID,
    pub ballot: Ballot,
    pub value: Command,
}

/// The final, agreed value of an instance.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Decision {
    pub instance: Instance,
    pub value: Command,
}

/// A client submission.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Propose {
    pub command: Command,
}

/// A request for an acceptor's decision log and accepted votes, starting at instance `from`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CatchupRequest {
    pub from: Instance,
    pub limit: u32,
    pub reply_to: Group,
}

/// An acceptor's answer to a [`CatchupRequest`].
///
/// `decided` holds entries from the acceptor's decision log. `accepted` holds the acceptor's votes for
/// instances absent from its decision log; these are not decisions and must be cross-checked by the
/// receiver. `truncated` is set if either list was cut short, by the request's `limit` or by the
/// responding acceptor's size limit.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CatchupResponse {
    pub acceptor: AcceptorID,
    pub decided: Vec<Decision>,
    pub accepted: Vec<(Instance, Vote)>,
    pub truncated: bool,
}

impl From<Phase1a> for Message {
    fn from(value: Phase1a) -> Self {
        Message::Phase1a(value)
    }
}

impl From<Phase1b> for Message {
    fn from(value: Phase1b) -> Self {
        Message::Phase1b(value)
    }
}

impl From<Phase2a> for Message {
    fn from(value: Phase2a) -> Self {
        Message::Phase2a(value)
    }
}

impl From<Phase2b> for Message {
    fn from(value: Phase2b) -> Self {
        Message::Phase2b(value)
    }
}

impl From<Decision> for Message {
    fn from(value: Decision) -> Self {
        Message::Decision(value)
    }
}

impl From<Propose> for Message {
    fn from(value: Propose) -> Self {
        Message::Propose(value)
    }
}

impl From<CatchupRequest> for Message {
    fn from(value: CatchupRequest) -> Self {
        Message::CatchupRequest(value)
    }
}

impl From<CatchupResponse> for Message {
    fn from(value: CatchupResponse) -> Self {
        Message::CatchupResponse(value)
    }
}

/// Enumerates the ways decoding a frame can fail.
#[derive(Debug)]
pub enum CodecError {
    /// The frame had no bytes at all.
    Empty,
    /// The frame's version byte is not [`WIRE_VERSION`].
    UnsupportedVersion(u8),
    /// The frame body is not a valid borsh-encoded [`Message`].
    Malformed(io::Error),
}

impl From<io::Error> for CodecError {
    fn from(value: io::Error) -> Self {
        CodecError::Malformed(value)
    }
}

#[test]
fn decode_rejects_bad_frames() {
    use crate::types::data_types::{ClientID, Sequence};

    let msg = Message::from(Decision {
        instance: Instance::new(4),
        value: Command::new(ClientID::new(1), Sequence::new(2), b"X".to_vec()),
    });
    let frame = msg.encode().unwrap();
    assert_eq!(Message::decode(&frame).unwrap(), msg);

    assert!(matches!(Message::decode(&[]), Err(CodecError::Empty)));

    let mut wrong_version = frame.clone();
    wrong_version[0] = WIRE_VERSION + 1;
    assert!(matches!(
        Message::decode(&wrong_version),
        Err(CodecError::UnsupportedVersion(_))
    ));

    assert!(matches!(
        Message::decode(&frame[..frame.len() - 1]),
        Err(CodecError::Malformed(_))
    ));

    let mut trailing = frame;
    trailing.push(0);
    assert!(matches!(
        Message::decode(&trailing),
        Err(CodecError::Malformed(_))
    ));
}
