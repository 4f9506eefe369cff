// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data model shared between the legacy engine adapter and the host platform.
//!
//! [`TestCaseDescriptor`] describes a test as the legacy engine reports it, and
//! [`TestNodeUpdateMessage`] is what gets published to the host.

mod descriptor;
mod exit_codes;
mod messages;

pub use descriptor::*;
pub use exit_codes::*;
pub use messages::*;
