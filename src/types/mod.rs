/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that are used across all of the Paxos roles.
//!
//! Types specific to a single role can be found in the "types" submodule of that role, e.g.,
//! [`crate::proposer::types`].

pub mod ballot;

pub mod command;

pub mod data_types;
