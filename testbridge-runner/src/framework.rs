// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration: the entry point the host calls into.
//!
//! For each request, [`TestFramework::execute_request`] validates its inputs, discovers tests
//! through the engine, and then either reports the discovered tests or runs them.

use crate::{
    bus::MessageBus,
    cancel::{CancellationToken, StopCondition},
    capabilities::{GracefulStopCapability, StructuredReportCapability},
    config::BridgeSettings,
    diagnostics::{DiagnosticSink, LoggingDiagnosticSink},
    discovery::{DiscoverySink, DiscoveryTranslator},
    engine::{DiscoveryOptions, ExecutionOptions, TestEngine},
    errors::{ConfigurationError, ExecuteRequestError, UnsupportedRequestKind},
    events::RunSummary,
    sink::{ExecutionSink, ExecutionSinkOptions, run_completion},
    source_info,
    test_filter::{FilterSpec, TestFilter},
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use std::sync::Arc;
use testbridge_metadata::{SessionUid, TestCaseDescriptor};
use tracing::{debug, info};

/// A request from the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestRequest {
    /// Discover tests and report them.
    Discover {
        /// The host filter.
        filter: FilterSpec,
    },

    /// Run tests.
    Run {
        /// The host filter.
        filter: FilterSpec,
    },

    /// A kind of request that testbridge does not understand.
    Other {
        /// The name of the request kind.
        kind: String,
    },
}

/// Everything the host passes along with a request.
#[derive(Debug)]
pub struct ExecuteRequestContext {
    request: TestRequest,
    session_uid: SessionUid,
    bus: DebugIgnore<Arc<dyn MessageBus>>,
    cancellation: CancellationToken,
    on_complete: DebugIgnore<Option<Box<dyn FnOnce() + Send>>>,
}

impl ExecuteRequestContext {
    /// Creates a new context.
    pub fn new(
        request: TestRequest,
        session_uid: SessionUid,
        bus: Arc<dyn MessageBus>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request,
            session_uid,
            bus: DebugIgnore(bus),
            cancellation,
            on_complete: DebugIgnore(None),
        }
    }

    /// Sets a callback to run when the request completes.
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = DebugIgnore(Some(Box::new(f)));
        self
    }

    /// Returns the request.
    pub fn request(&self) -> &TestRequest {
        &self.request
    }

    /// Returns the session this request belongs to.
    pub fn session_uid(&self) -> &SessionUid {
        &self.session_uid
    }

    /// Marks the request as complete. This consumes the context, so it can only happen once.
    pub fn complete(self) {
        debug!(session_uid = %self.session_uid, "request complete");
        if let Some(on_complete) = self.on_complete.0 {
            on_complete();
        }
    }
}

/// The result of a successful request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestOutcome {
    /// Tests were discovered.
    Discovered {
        /// The number of test cases reported to the host.
        published: usize,
    },

    /// Tests were run.
    Ran(RunSummary),
}

/// Options for a [`TestFramework`], usually from the command line.
#[derive(Clone, Debug, Default)]
pub struct TestFrameworkOptions {
    /// The legacy filter expression.
    pub filter: Option<String>,

    /// The run settings file.
    pub settings: Option<Utf8PathBuf>,

    /// Extra modules to read source information from.
    pub extra_modules: Vec<Utf8PathBuf>,
}

#[derive(Clone, Copy, Debug)]
enum RequestKind {
    Discover,
    Run,
}

/// Bridges a legacy test engine to the host.
pub struct TestFramework {
    engine: Arc<dyn TestEngine>,
    test_binary: Utf8PathBuf,
    options: TestFrameworkOptions,
    report: StructuredReportCapability,
    graceful_stop: GracefulStopCapability,
}

impl TestFramework {
    /// Creates a new `TestFramework` for the given test binary.
    pub fn new(
        engine: Arc<dyn TestEngine>,
        test_binary: impl Into<Utf8PathBuf>,
        options: TestFrameworkOptions,
    ) -> Self {
        Self {
            engine,
            test_binary: test_binary.into(),
            options,
            report: StructuredReportCapability::new(),
            graceful_stop: GracefulStopCapability::new(),
        }
    }

    /// Returns the test binary.
    pub fn test_binary(&self) -> &Utf8Path {
        &self.test_binary
    }

    /// Returns the structured report capability.
    pub fn structured_report(&self) -> &StructuredReportCapability {
        &self.report
    }

    /// Returns the graceful stop capability.
    pub fn graceful_stop(&self) -> &GracefulStopCapability {
        &self.graceful_stop
    }

    /// Executes a request from the host.
    ///
    /// `context` is completed once all updates have been published. If an error is returned, it
    /// is dropped without being completed.
    pub async fn execute_request(
        &self,
        context: ExecuteRequestContext,
    ) -> Result<RequestOutcome, ExecuteRequestError> {
        if !self.test_binary.is_file() {
            return Err(ConfigurationError::MissingTestBinary {
                path: self.test_binary.clone(),
            }
            .into());
        }

        let host_filter = match context.request() {
            TestRequest::Discover { filter } | TestRequest::Run { filter } => filter.clone(),
            TestRequest::Other { .. } => FilterSpec::None,
        };
        let filter = TestFilter::new(self.options.filter.as_deref(), host_filter)?;
        filter.validate()?;

        let settings = BridgeSettings::load(&self.test_binary, self.options.settings.as_deref())?;
        let kind = match context.request() {
            TestRequest::Discover { .. } => RequestKind::Discover,
            TestRequest::Run { .. } => RequestKind::Run,
            TestRequest::Other { kind } => {
                return Err(UnsupportedRequestKind::new(kind).into());
            }
        };
        let binary_name = self.test_binary.file_name().unwrap_or(self.test_binary.as_str());
        let diagnostics: Arc<dyn DiagnosticSink> = Arc::new(LoggingDiagnosticSink::new(
            binary_name,
            settings.assembly.diagnostic_messages,
        ));
        let stop = StopCondition::new(context.cancellation.clone(), self.graceful_stop.clone());

        let test_cases = self
            .discover(&settings, Arc::clone(&diagnostics), stop.clone())
            .await?;

        let outcome = match kind {
            RequestKind::Discover => {
                let published = self
                    .publish_discovered(test_cases, filter, &settings, &context, stop)
                    .await?;
                info!(published, "discovery complete");
                RequestOutcome::Discovered { published }
            }
            RequestKind::Run => {
                let summary = self
                    .run(test_cases, &filter, &settings, diagnostics, &context, stop)
                    .await?;
                info!(
                    total = summary.total,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "run complete",
                );
                RequestOutcome::Ran(summary)
            }
        };

        context.complete();
        Ok(outcome)
    }

    async fn discover(
        &self,
        settings: &BridgeSettings,
        diagnostics: Arc<dyn DiagnosticSink>,
        stop: StopCondition,
    ) -> Result<Vec<Arc<TestCaseDescriptor>>, ExecuteRequestError> {
        let engine = Arc::clone(&self.engine);
        let options = DiscoveryOptions {
            pre_enumerate_theories: settings.assembly.pre_enumerate_theories,
            diagnostics,
        };
        let test_cases = tokio::task::spawn_blocking(move || {
            let sink = DiscoverySink::new(stop);
            engine.find(&options, &sink)?;
            Ok::<_, ExecuteRequestError>(sink.into_test_cases())
        })
        .await??;

        debug!(discovered = test_cases.len(), "engine discovery finished");
        Ok(test_cases)
    }

    async fn publish_discovered(
        &self,
        test_cases: Vec<Arc<TestCaseDescriptor>>,
        filter: TestFilter,
        settings: &BridgeSettings,
        context: &ExecuteRequestContext,
        stop: StopCondition,
    ) -> Result<usize, ExecuteRequestError> {
        let test_binary = self.test_binary.clone();
        let extra_modules = self.options.extra_modules.clone();
        let collect = settings.collect_source_information;
        let report = self.report.clone();
        let bus = Arc::clone(&context.bus.0);
        let session_uid = context.session_uid.clone();

        // Source information is resolved and published on a blocking worker, since debug
        // information is read synchronously.
        tokio::task::spawn_blocking(move || {
            let source_info = source_info::create(&test_binary, collect, &extra_modules);
            let translator = DiscoveryTranslator::new(source_info.as_ref(), &report);
            translator.publish_all(&test_cases, &filter, bus.as_ref(), &session_uid, &stop)
        })
        .await?
    }

    async fn run(
        &self,
        test_cases: Vec<Arc<TestCaseDescriptor>>,
        filter: &TestFilter,
        settings: &BridgeSettings,
        diagnostics: Arc<dyn DiagnosticSink>,
        context: &ExecuteRequestContext,
        stop: StopCondition,
    ) -> Result<RunSummary, ExecuteRequestError> {
        let mut admitted = Vec::with_capacity(test_cases.len());
        for test_case in test_cases {
            if filter.admits(&test_case)? {
                admitted.push(test_case);
            }
        }
        debug!(admitted = admitted.len(), "running filtered tests");

        let (completion, waiter) = run_completion();
        let sink = ExecutionSink::new(
            Arc::clone(&context.bus.0),
            context.session_uid.clone(),
            self.report.clone(),
            stop,
            ExecutionSinkOptions {
                fail_skips: settings.assembly.fail_skips,
            },
            completion,
        );
        let options = ExecutionOptions::new(
            settings.assembly.parallelize_test_collections,
            diagnostics,
        );

        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.run(admitted, &options, &sink)).await??;

        waiter.wait().await
    }
}
