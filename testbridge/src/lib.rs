// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line driver for testbridge.
//!
//! Loads a scripted engine, sends it through the bridge as a host request, and prints each
//! message the host would receive as a line of JSON on stdout. Logs go to stderr.

mod bus;
mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::TestBridgeApp;
#[doc(hidden)]
pub use errors::ExpectedError;
#[doc(hidden)]
pub use output::OutputContext;
