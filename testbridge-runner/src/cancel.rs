// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation.
//!
//! Cancellation is only ever checked between events: an event that is being processed when
//! cancellation is requested is processed to completion.

use crate::capabilities::GracefulStopCapability;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A cancellation token, set by the host when a request should be abandoned.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The condition under which sinks ask the engine to stop: the host cancelled the request, or
/// asked for a graceful stop.
#[derive(Clone, Debug)]
pub struct StopCondition {
    token: CancellationToken,
    graceful_stop: GracefulStopCapability,
}

impl StopCondition {
    /// Creates a new `StopCondition`.
    pub fn new(token: CancellationToken, graceful_stop: GracefulStopCapability) -> Self {
        Self {
            token,
            graceful_stop,
        }
    }

    /// A condition that is never satisfied.
    pub fn never() -> Self {
        Self::new(CancellationToken::new(), GracefulStopCapability::new())
    }

    /// Returns true if the engine should stop delivering events.
    pub fn should_stop(&self) -> bool {
        self.token.is_cancelled() || self.graceful_stop.is_stop_requested()
    }
}
