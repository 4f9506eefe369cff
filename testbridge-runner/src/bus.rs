// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host's message bus.

use crate::errors::PublishError;
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Mutex, PoisonError};
use testbridge_metadata::TestNodeUpdateMessage;

/// A sink for messages addressed to the host.
///
/// Publishing is asynchronous, but testbridge waits for each publish to complete before
/// processing the next event. Returned futures are driven by a simple executor on the thread that
/// delivered the event, so they must not depend on a Tokio reactor.
pub trait MessageBus: Send + Sync {
    /// Publishes a message to the host.
    fn publish(&self, message: TestNodeUpdateMessage) -> BoxFuture<'_, Result<(), PublishError>>;
}

/// Publishes a message and blocks the current thread until the bus acknowledges it.
pub(crate) fn publish_blocking(
    bus: &dyn MessageBus,
    message: TestNodeUpdateMessage,
) -> Result<(), PublishError> {
    futures::executor::block_on(bus.publish(message))
}

/// A message bus that stores every message in memory, in the order it was published.
#[derive(Debug, Default)]
pub struct RecordingBus {
    messages: Mutex<Vec<TestNodeUpdateMessage>>,
}

impl RecordingBus {
    /// Creates a new, empty `RecordingBus`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the messages published so far.
    pub fn messages(&self) -> Vec<TestNodeUpdateMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageBus for RecordingBus {
    fn publish(&self, message: TestNodeUpdateMessage) -> BoxFuture<'_, Result<(), PublishError>> {
        async move {
            self.messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message);
            Ok(())
        }
        .boxed()
    }
}
