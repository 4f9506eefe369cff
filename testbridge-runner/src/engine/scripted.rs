// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DiscoveryOptions, ExecutionOptions, TestEngine};
use crate::{
    diagnostics::DiagnosticMessage,
    discovery::DiscoverySink,
    errors::{EngineError, SinkError},
    events::{CleanupFailure, FailureInformation, LifecycleEvent, RunSummary, TestResult},
    sink::ExecutionSink,
};
use camino::Utf8Path;
use indexmap::IndexMap;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use testbridge_metadata::{
    CleanupScope, SourceInformation, TestCaseDescriptor, TestNodeUid, TraitMap,
};
use tracing::{debug, info};

/// The script for a [`ScriptedEngine`], usually read from a JSON file.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineScript {
    /// The full name of the test assembly.
    pub assembly_name: String,

    /// The tests, in discovery order.
    #[serde(default)]
    pub tests: Vec<ScriptedTest>,

    /// Cleanup failures, reported after every test has finished.
    #[serde(default)]
    pub cleanup_failures: Vec<ScriptedCleanupFailure>,

    /// Diagnostic messages emitted during discovery.
    #[serde(default)]
    pub diagnostics: Vec<String>,

    /// Error messages emitted during discovery.
    #[serde(default)]
    pub errors: Vec<FailureInformation>,
}

/// A test in an [`EngineScript`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptedTest {
    /// The test's unique identifier.
    pub uid: TestNodeUid,

    /// The display name. Defaults to `{type}.{method}`.
    #[serde(default)]
    pub display_name: Option<String>,

    /// The fully-qualified name of the type that owns the test.
    #[serde(rename = "type")]
    pub type_name: String,

    /// The test method.
    pub method: String,

    /// The collection the test belongs to. Defaults to the type name.
    #[serde(default)]
    pub collection: Option<String>,

    /// The number of generic parameters on the method.
    #[serde(default)]
    pub generic_arity: u32,

    /// The names of the method's parameter types.
    #[serde(default)]
    pub parameter_types: Vec<String>,

    /// The name of the method's return type.
    #[serde(default)]
    pub return_type: String,

    /// Traits attached to the test.
    #[serde(default)]
    pub traits: TraitMap,

    /// Source information reported by the engine itself.
    #[serde(default)]
    pub source: Option<SourceInformation>,

    /// Data rows for a data-driven test. If pre-enumeration is enabled, each row is discovered
    /// as a separate test case.
    #[serde(default)]
    pub theory_rows: Vec<String>,

    /// What happens when the test runs.
    #[serde(default)]
    pub outcome: ScriptedOutcome,

    /// Output produced by the test.
    #[serde(default)]
    pub output: String,

    /// How long the test takes, in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl ScriptedTest {
    fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(&self.type_name)
    }
}

/// The outcome of a [`ScriptedTest`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScriptedOutcome {
    /// The test passes.
    #[default]
    Passed,

    /// The test fails.
    Failed {
        /// The failure.
        failure: FailureInformation,
    },

    /// The test is skipped.
    Skipped {
        /// The reason the test is skipped.
        #[serde(default)]
        reason: Option<String>,
    },
}

/// A cleanup failure in an [`EngineScript`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptedCleanupFailure {
    /// The scope of the cleanup step.
    pub scope: CleanupScope,

    /// The unit that failed to clean up: a test's display name, `{type}.{method}`, a type name,
    /// a collection name, or the assembly name.
    pub unit: String,

    /// The failure.
    pub failure: FailureInformation,

    /// Output produced during cleanup.
    #[serde(default)]
    pub output: String,

    /// How long cleanup takes, in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,
}

/// A deterministic, in-process [`TestEngine`] driven by an [`EngineScript`].
///
/// Each collection runs on its own thread if parallelization is enabled.
#[derive(Clone, Debug)]
pub struct ScriptedEngine {
    script: EngineScript,
}

impl ScriptedEngine {
    /// Creates a new `ScriptedEngine`.
    pub fn new(script: EngineScript) -> Self {
        Self { script }
    }

    /// Reads a script from a JSON file.
    pub fn from_path(path: &Utf8Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|error| EngineError::ReadScript {
            path: path.to_owned(),
            error,
        })?;
        let script: EngineScript =
            serde_json::from_str(&contents).map_err(|error| EngineError::ParseScript {
                path: path.to_owned(),
                error,
            })?;

        let mut seen = HashSet::new();
        for test in &script.tests {
            if !seen.insert(&test.uid) {
                return Err(EngineError::DuplicateTest {
                    path: path.to_owned(),
                    uid: test.uid.clone(),
                });
            }
        }

        debug!(%path, tests = script.tests.len(), "loaded engine script");
        Ok(Self::new(script))
    }

    /// Returns the script.
    pub fn script(&self) -> &EngineScript {
        &self.script
    }

    fn descriptor(&self, test: &ScriptedTest, row: Option<(usize, &str)>) -> TestCaseDescriptor {
        let display_name = test
            .display_name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", test.type_name, test.method));
        let (uid, display_name) = match row {
            Some((index, row)) => (
                row_uid(&test.uid, index),
                format!("{display_name}({row})"),
            ),
            None => (test.uid.clone(), display_name),
        };

        let mut descriptor = TestCaseDescriptor::new(
            uid,
            display_name,
            &self.script.assembly_name,
            &test.type_name,
            &test.method,
        )
        .with_signature(
            test.generic_arity,
            test.parameter_types.clone(),
            &test.return_type,
        );
        descriptor.traits = test.traits.clone();
        descriptor.source_information = test.source.clone();
        descriptor
    }

    fn descriptors(
        &self,
        test: &ScriptedTest,
        pre_enumerate_theories: bool,
    ) -> Vec<TestCaseDescriptor> {
        if pre_enumerate_theories && !test.theory_rows.is_empty() {
            test.theory_rows
                .iter()
                .enumerate()
                .map(|(index, row)| self.descriptor(test, Some((index, row))))
                .collect()
        } else {
            vec![self.descriptor(test, None)]
        }
    }

    // Maps every identifier this engine can produce, with or without pre-enumeration, to its
    // scripted test.
    fn tests_by_uid(&self) -> HashMap<TestNodeUid, &ScriptedTest> {
        let mut tests = HashMap::new();
        for test in &self.script.tests {
            tests.insert(test.uid.clone(), test);
            for index in 0..test.theory_rows.len() {
                tests.insert(row_uid(&test.uid, index), test);
            }
        }
        tests
    }

    fn run_collection(
        &self,
        cases: &[(Arc<TestCaseDescriptor>, &ScriptedTest)],
        options: &ExecutionOptions,
        sink: &ExecutionSink,
        state: &RunState,
    ) -> Result<(), SinkError> {
        for (test_case, test) in cases {
            // With parallel collections, another worker may stop the run between this check and
            // the start event below. Such a test is already in flight: it still starts, and its
            // result is still reported.
            if state.is_stopped() {
                state.not_run.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let starting = LifecycleEvent::TestStarting {
                test_case: Arc::clone(test_case),
            };
            state.deliver(sink, options, starting)?;

            // The test has started, so its result is reported even if a stop was requested.
            let result = TestResult {
                test_case: Arc::clone(test_case),
                execution_time: Duration::from_millis(test.execution_time_ms),
                output: test.output.clone(),
            };
            state.total.fetch_add(1, Ordering::Relaxed);
            let event = match &test.outcome {
                ScriptedOutcome::Passed => LifecycleEvent::TestPassed { result },
                ScriptedOutcome::Failed { failure } => {
                    state.failed.fetch_add(1, Ordering::Relaxed);
                    LifecycleEvent::TestFailed {
                        result,
                        failure: failure.clone(),
                    }
                }
                ScriptedOutcome::Skipped { reason } => {
                    state.skipped.fetch_add(1, Ordering::Relaxed);
                    LifecycleEvent::TestSkipped {
                        result,
                        reason: reason.clone(),
                    }
                }
            };
            state.deliver(sink, options, event)?;
        }
        Ok(())
    }

    fn cleanup_failure(
        &self,
        cleanup: &ScriptedCleanupFailure,
        cases: &[(Arc<TestCaseDescriptor>, &ScriptedTest)],
    ) -> CleanupFailure {
        let unit = cleanup.unit.as_str();
        let affected = cases
            .iter()
            .filter(|(test_case, test)| match cleanup.scope {
                CleanupScope::Test => test_case.display_name == unit,
                CleanupScope::TestMethod => test_case.fully_qualified_name() == unit,
                CleanupScope::TestClass => test_case.type_name == unit,
                CleanupScope::TestCollection => test.collection() == unit,
                CleanupScope::TestAssembly => {
                    test_case.assembly_name == unit || test_case.simple_assembly_name() == unit
                }
            })
            .map(|(test_case, _)| Arc::clone(test_case))
            .collect();

        CleanupFailure {
            scope: cleanup.scope,
            unit_name: cleanup.unit.clone(),
            affected,
            failure: cleanup.failure.clone(),
            execution_time: Duration::from_millis(cleanup.execution_time_ms),
            output: cleanup.output.clone(),
        }
    }
}

impl TestEngine for ScriptedEngine {
    fn find(&self, options: &DiscoveryOptions, sink: &DiscoverySink) -> Result<(), EngineError> {
        for diagnostic in &self.script.diagnostics {
            options
                .diagnostics
                .on_message(&DiagnosticMessage::Diagnostic(diagnostic.clone()));
        }
        for error in &self.script.errors {
            options
                .diagnostics
                .on_message(&DiagnosticMessage::Error(error.clone()));
        }

        for test in &self.script.tests {
            for descriptor in self.descriptors(test, options.pre_enumerate_theories) {
                if sink.on_test_case(descriptor).is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn run(
        &self,
        test_cases: Vec<Arc<TestCaseDescriptor>>,
        options: &ExecutionOptions,
        sink: &ExecutionSink,
    ) -> Result<(), EngineError> {
        let start = Instant::now();
        let tests_by_uid = self.tests_by_uid();

        let mut cases = Vec::with_capacity(test_cases.len());
        for test_case in test_cases {
            let Some(&test) = tests_by_uid.get(&test_case.unique_id) else {
                return Err(EngineError::UnknownTest {
                    uid: test_case.unique_id.clone(),
                });
            };
            cases.push((test_case, test));
        }

        let mut collections: IndexMap<&str, Vec<_>> = IndexMap::new();
        for (test_case, test) in &cases {
            collections
                .entry(test.collection())
                .or_default()
                .push((Arc::clone(test_case), *test));
        }

        info!(
            tests = cases.len(),
            collections = collections.len(),
            parallel = options.parallelize_test_collections,
            "starting scripted run",
        );

        let state = RunState::default();
        if options.parallelize_test_collections {
            let results: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = collections
                    .iter()
                    .map(|(&name, collection)| {
                        let state = &state;
                        let handle = scope
                            .spawn(move || self.run_collection(collection, options, sink, state));
                        (name, handle)
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(name, handle)| (name, handle.join()))
                    .collect()
            });
            for (name, result) in results {
                match result {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(EngineError::WorkerPanicked {
                            collection: name.to_owned(),
                        });
                    }
                }
            }
        } else {
            for collection in collections.values() {
                self.run_collection(collection, options, sink, &state)?;
            }
        }

        for cleanup in &self.script.cleanup_failures {
            if state.is_stopped() {
                break;
            }
            let event = self.cleanup_failure(cleanup, &cases);
            if event.affected.is_empty() {
                options
                    .diagnostics
                    .on_message(&DiagnosticMessage::Diagnostic(format!(
                        "{} cleanup failure for `{}` affects no tests",
                        cleanup.scope, cleanup.unit,
                    )));
                continue;
            }
            state.deliver(sink, options, LifecycleEvent::CleanupFailure(event))?;
        }

        let summary = RunSummary {
            total: state.total.load(Ordering::Relaxed),
            failed: state.failed.load(Ordering::Relaxed),
            skipped: state.skipped.load(Ordering::Relaxed),
            not_run: state.not_run.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };
        sink.on_event(LifecycleEvent::RunFinished(summary))?;
        Ok(())
    }
}

fn row_uid(uid: &TestNodeUid, index: usize) -> TestNodeUid {
    TestNodeUid::new(format!("{uid}/{index}"))
}

#[derive(Debug, Default)]
struct RunState {
    stopped: AtomicBool,
    delivery: Mutex<()>,
    total: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    not_run: AtomicUsize,
}

impl RunState {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn deliver(
        &self,
        sink: &ExecutionSink,
        options: &ExecutionOptions,
        event: LifecycleEvent,
    ) -> Result<(), SinkError> {
        let result = if options.synchronous_message_reporting {
            let _guard = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
            sink.on_event(event)
        } else {
            sink.on_event(event)
        };

        match result {
            Ok(flow) => {
                if flow.is_break() {
                    self.stopped.store(true, Ordering::Release);
                }
                Ok(())
            }
            Err(error) => {
                // Let the other workers wind down.
                self.stopped.store(true, Ordering::Release);
                Err(error)
            }
        }
    }
}
