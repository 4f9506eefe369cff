// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use futures::future::{BoxFuture, FutureExt};
use std::{
    io::Write,
    sync::{Mutex, PoisonError},
};
use testbridge_metadata::TestNodeUpdateMessage;
use testbridge_runner::{bus::MessageBus, errors::PublishError};

/// A message bus that writes each message as a line of JSON.
#[derive(Debug)]
pub(crate) struct JsonLinesBus<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesBus<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, message: &TestNodeUpdateMessage) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(message)
            .map_err(|error| PublishError::new(format!("failed to serialize message: {error}")))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(&line)
            .and_then(|()| writer.flush())
            .map_err(|error| PublishError::new(format!("failed to write message: {error}")))
    }
}

impl<W: Write + Send> MessageBus for JsonLinesBus<W> {
    fn publish(&self, message: TestNodeUpdateMessage) -> BoxFuture<'_, Result<(), PublishError>> {
        async move { self.write_line(&message) }.boxed()
    }
}
