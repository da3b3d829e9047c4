/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions for receiving messages from the network.

use std::{
    sync::mpsc::{self, Receiver, TryRecvError},
    thread::{self, JoinHandle},
};

use super::{messages::Message, network::Network};

/// Spawn the poller thread, which polls the [`Network`] for messages and forwards them to the
/// algorithm thread through the returned receiver.
///
/// The poller exits when it receives a shutdown signal. Messages arriving after the algorithm thread
/// has exited are discarded.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<Message>) {
    let (to_algorithm, messages) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some(msg) = network.recv() {
            let _ = to_algorithm.send(msg);
        } else {
            thread::yield_now()
        }
    });

    (poller_thread, messages)
}
