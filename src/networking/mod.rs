/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable, best-effort group networking.

pub mod datagram;

pub mod messages;

pub mod network;

pub(crate) mod receiving;

pub(crate) mod sending;
