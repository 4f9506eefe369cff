// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for testbridge: a bridge between a legacy test engine and a test
//! orchestration host.
//!
//! The engine discovers and runs tests, reporting what happens as [lifecycle
//! events](events::LifecycleEvent). testbridge filters the tests, and translates the events into
//! [test node updates](testbridge_metadata::TestNodeUpdateMessage) published to the host's
//! [message bus](bus::MessageBus).
//!
//! The entry point is [`TestFramework::execute_request`](framework::TestFramework::execute_request).

pub mod bus;
pub mod cancel;
pub mod capabilities;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod events;
pub mod framework;
pub mod identity;
pub mod options;
pub mod sink;
pub mod source_info;
pub mod test_filter;
