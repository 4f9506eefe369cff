// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic messages sent by the engine outside of the per-test event stream.

use crate::events::FailureInformation;
use tracing::{error, warn};

/// A message from the engine that isn't associated with a test.
#[derive(Clone, Debug)]
pub enum DiagnosticMessage {
    /// Free-form diagnostic text.
    Diagnostic(String),

    /// An error, such as a failure to load a test class.
    Error(FailureInformation),
}

/// Receives diagnostic messages from the engine.
pub trait DiagnosticSink: Send + Sync {
    /// Handles a diagnostic message.
    fn on_message(&self, message: &DiagnosticMessage);
}

/// A diagnostic sink that drops every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopDiagnosticSink;

impl NopDiagnosticSink {
    /// The shared instance.
    pub const INSTANCE: Self = Self;
}

impl DiagnosticSink for NopDiagnosticSink {
    fn on_message(&self, _message: &DiagnosticMessage) {}
}

/// A diagnostic sink that logs messages, prefixed by the name of the test binary.
#[derive(Clone, Debug)]
pub struct LoggingDiagnosticSink {
    header: String,
    show_diagnostics: bool,
}

impl LoggingDiagnosticSink {
    /// Creates a new `LoggingDiagnosticSink`. Nothing is logged unless `show_diagnostics` is true.
    pub fn new(binary_name: &str, show_diagnostics: bool) -> Self {
        Self {
            header: format!("{binary_name}: "),
            show_diagnostics,
        }
    }

    /// Formats a message the way it is logged.
    pub fn format(&self, message: &DiagnosticMessage) -> String {
        match message {
            DiagnosticMessage::Diagnostic(text) => format!("{}{text}", self.header),
            DiagnosticMessage::Error(failure) => {
                format!("{}{}", self.header, failure.combined_message())
            }
        }
    }
}

impl DiagnosticSink for LoggingDiagnosticSink {
    fn on_message(&self, message: &DiagnosticMessage) {
        if !self.show_diagnostics {
            return;
        }
        let text = self.format(message);
        match message {
            DiagnosticMessage::Diagnostic(_) => warn!("{text}"),
            DiagnosticMessage::Error(failure) => {
                error!(stack_trace = %failure.combined_stack_trace(), "{text}");
            }
        }
    }
}
