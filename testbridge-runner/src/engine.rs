// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interface to the legacy test engine.
//!
//! testbridge does not discover or run tests itself. A [`TestEngine`] does that, and reports
//! what it finds to a [`DiscoverySink`] and what happens during a run to an
//! [`ExecutionSink`].

mod scripted;

pub use scripted::*;

use crate::{
    diagnostics::DiagnosticSink, discovery::DiscoverySink, errors::EngineError,
    sink::ExecutionSink,
};
use std::sync::Arc;
use testbridge_metadata::TestCaseDescriptor;

/// Options passed to [`TestEngine::find`].
#[derive(Clone)]
pub struct DiscoveryOptions {
    /// Whether data-driven tests are enumerated into individual cases.
    pub pre_enumerate_theories: bool,

    /// Receives diagnostic messages.
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

/// Options passed to [`TestEngine::run`].
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Whether test collections may run in parallel.
    pub parallelize_test_collections: bool,

    /// Whether events must be delivered one at a time, even if collections run in parallel.
    pub synchronous_message_reporting: bool,

    /// Receives diagnostic messages.
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl ExecutionOptions {
    /// Creates execution options from the parallelization setting.
    ///
    /// Disabling parallelization also requests synchronous message reporting.
    pub fn new(parallelize_test_collections: bool, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            parallelize_test_collections,
            synchronous_message_reporting: !parallelize_test_collections,
            diagnostics,
        }
    }
}

/// A legacy test engine.
///
/// Both methods block until the engine is done.
pub trait TestEngine: Send + Sync {
    /// Discovers tests, reporting each one to `sink`.
    ///
    /// The engine must stop discovering tests once `sink` returns `ControlFlow::Break`.
    fn find(&self, options: &DiscoveryOptions, sink: &DiscoverySink) -> Result<(), EngineError>;

    /// Runs the given tests, reporting lifecycle events to `sink`.
    ///
    /// The engine must not start any further tests once `sink` returns `ControlFlow::Break`, and
    /// must end the run with a
    /// [`RunFinished`](crate::events::LifecycleEvent::RunFinished) event unless `sink` fails.
    fn run(
        &self,
        test_cases: Vec<Arc<TestCaseDescriptor>>,
        options: &ExecutionOptions,
        sink: &ExecutionSink,
    ) -> Result<(), EngineError>;
}
