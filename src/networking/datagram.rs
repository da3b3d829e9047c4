/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A [`Network`] built on top of any unreliable frame transport.
//!
//! [`DatagramNetwork`] is where messages are encoded and decoded. It accepts any [`Datagram`]
//! transport, and this module provides one over UDP, [`UdpDatagram`], which fans every broadcast out
//! to a static list of endpoints per [`Group`].

use std::{
    collections::HashMap,
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Arc,
};

use super::{
    messages::{Group, Message},
    network::Network,
};

/// Largest frame that fits in a single UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A transport that moves opaque frames to the members of a [`Group`].
pub trait Datagram: Clone + Send {
    /// Send `frame` to every member of `group` without blocking.
    fn send_to(&mut self, group: Group, frame: &[u8]) -> io::Result<()>;

    /// Receive one frame. Returns immediately with `Ok(None)` if no frame is available now.
    fn recv_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Adapts a [`Datagram`] transport into a [`Network`].
///
/// Frames that fail to decode are dropped and logged at debug level. Transport errors are logged as
/// warnings and otherwise ignored: the roles' timeouts take care of retransmission.
#[derive(Clone)]
pub struct DatagramNetwork<D: Datagram> {
    datagram: D,
}

impl<D: Datagram> DatagramNetwork<D> {
    pub fn new(datagram: D) -> Self {
        Self { datagram }
    }
}

impl<D: Datagram> Network for DatagramNetwork<D> {
    fn broadcast(&mut self, group: Group, message: Message) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Failed to encode a message for {:?}: {:?}", group, err);
                return;
            }
        };
        if frame.len() > MAX_DATAGRAM_SIZE {
            log::warn!(
                "Dropped an outgoing frame of {} bytes for {:?}: larger than a datagram",
                frame.len(),
                group
            );
            return;
        }
        if let Err(err) = self.datagram.send_to(group, &frame) {
            log::warn!("Failed to send a frame to {:?}: {}", group, err);
        }
    }

    fn recv(&mut self) -> Option<Message> {
        loop {
            match self.datagram.recv_frame() {
                Ok(Some(frame)) => match Message::decode(&frame) {
                    Ok(msg) => return Some(msg),
                    Err(err) => {
                        log::debug!("Dropped a malformed frame of {} bytes: {:?}", frame.len(), err);
                    }
                },
                Ok(None) => return None,
                Err(err) => {
                    log::warn!("Failed to receive a frame: {}", err);
                    return None;
                }
            }
        }
    }
}

/// A [`Datagram`] transport over a non-blocking UDP socket.
///
/// Each [`Group`] maps to a fixed list of endpoint addresses, and a broadcast to a group is sent to
/// each of its endpoints in turn.
#[derive(Clone)]
pub struct UdpDatagram {
    socket: Arc<UdpSocket>,
    endpoints: Arc<HashMap<Group, Vec<SocketAddr>>>,
}

impl UdpDatagram {
    /// Bind a socket on `addr` and use `endpoints` to resolve groups.
    pub fn bind(
        addr: impl ToSocketAddrs,
        endpoints: HashMap<Group, Vec<SocketAddr>>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: Arc::new(socket),
            endpoints: Arc::new(endpoints),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Datagram for UdpDatagram {
    fn send_to(&mut self, group: Group, frame: &[u8]) -> io::Result<()> {
        // Try every endpoint, and report the last failure.
        let mut result = Ok(());
        for addr in self.endpoints.get(&group).into_iter().flatten() {
            if let Err(err) = self.socket.send_to(frame, addr) {
                result = Err(err);
            }
        }
        result
    }

    fn recv_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0; MAX_DATAGRAM_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                buf.truncate(len);
                Ok(Some(buf))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}
