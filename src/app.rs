/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The trait implemented by the application that consumes decided commands.
//!
//! An application is attached to a learner, which calls [`App::deliver`] once per instance, in
//! increasing instance order with no gaps. A command that was decided in more than one instance (a
//! client resubmission that two proposers both got through) is only delivered at the first of them.
//!
//! `deliver` is called on the learner's algorithm thread, so it should return quickly.

use crate::types::{command::Command, data_types::Instance};

pub trait App: Send {
    fn deliver(&mut self, instance: Instance, command: &Command);
}
