// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle events emitted by a test engine during a run.
//!
//! Events are consumed by an [`ExecutionSink`](crate::sink::ExecutionSink). Each event carries
//! everything needed to report it, so the sink does not keep any per-test state between events.

use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use testbridge_metadata::{CleanupScope, FailureDetail, TestCaseDescriptor};

/// A lifecycle event.
#[derive(Clone, Debug)]
pub enum LifecycleEvent {
    /// A test is about to start running.
    TestStarting {
        /// The test case.
        test_case: Arc<TestCaseDescriptor>,
    },

    /// A test passed.
    TestPassed {
        /// The result of the test.
        result: TestResult,
    },

    /// A test failed.
    TestFailed {
        /// The result of the test.
        result: TestResult,

        /// The failure reported by the engine.
        failure: FailureInformation,
    },

    /// A test was skipped.
    TestSkipped {
        /// The result of the test.
        result: TestResult,

        /// The reason the test was skipped, if known.
        reason: Option<String>,
    },

    /// A cleanup step failed.
    CleanupFailure(CleanupFailure),

    /// All events for the run have been delivered.
    RunFinished(RunSummary),
}

impl LifecycleEvent {
    /// Returns a short description of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TestStarting { .. } => "test-starting",
            Self::TestPassed { .. } => "test-passed",
            Self::TestFailed { .. } => "test-failed",
            Self::TestSkipped { .. } => "test-skipped",
            Self::CleanupFailure(_) => "cleanup-failure",
            Self::RunFinished(_) => "run-finished",
        }
    }
}

/// The outcome-independent part of a test result.
#[derive(Clone, Debug)]
pub struct TestResult {
    /// The test case this result is for.
    pub test_case: Arc<TestCaseDescriptor>,

    /// How long the test took to run, as measured by the engine.
    pub execution_time: Duration,

    /// Output captured while the test ran.
    pub output: String,
}

/// A cleanup step that failed, along with every test case it affects.
#[derive(Clone, Debug)]
pub struct CleanupFailure {
    /// The scope of the cleanup step.
    pub scope: CleanupScope,

    /// The name of the unit that was being cleaned up: a test's display name, a method, class,
    /// collection or assembly name.
    pub unit_name: String,

    /// The test cases in the unit.
    pub affected: Vec<Arc<TestCaseDescriptor>>,

    /// The failure reported by the engine.
    pub failure: FailureInformation,

    /// How long the cleanup step took.
    pub execution_time: Duration,

    /// Output captured during cleanup.
    pub output: String,
}

/// Statistics about a finished run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// The number of tests that were run.
    pub total: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// The number of tests that were not run because the run was stopped.
    pub not_run: usize,

    /// The total time taken by the run.
    pub elapsed: Duration,
}

/// A failure reported by the engine, as a flattened tree of exceptions.
///
/// The lists are parallel: entry `i` of each describes one exception. `parent_indices[i]` is the
/// index of the exception that `i` is nested under, or `-1` for the root.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureInformation {
    /// The type names of the exceptions, if known.
    #[serde(default)]
    pub exception_types: Vec<Option<String>>,

    /// The exception messages.
    pub messages: Vec<String>,

    /// The stack traces, if known.
    #[serde(default)]
    pub stack_traces: Vec<Option<String>>,

    /// The parent index of each exception.
    #[serde(default)]
    pub parent_indices: Vec<i32>,
}

impl FailureInformation {
    /// Creates a failure with a single root exception.
    pub fn new(
        exception_type: Option<impl Into<String>>,
        message: impl Into<String>,
        stack_trace: Option<impl Into<String>>,
    ) -> Self {
        Self {
            exception_types: vec![exception_type.map(Into::into)],
            messages: vec![message.into()],
            stack_traces: vec![stack_trace.map(Into::into)],
            parent_indices: vec![-1],
        }
    }

    /// Creates a failure that consists only of a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(None::<String>, message, None::<String>)
    }

    /// Adds an exception nested under the exception at `parent`.
    pub fn with_inner(
        mut self,
        parent: usize,
        exception_type: Option<impl Into<String>>,
        message: impl Into<String>,
        stack_trace: Option<impl Into<String>>,
    ) -> Self {
        self.exception_types.push(exception_type.map(Into::into));
        self.messages.push(message.into());
        self.stack_traces.push(stack_trace.map(Into::into));
        self.parent_indices.push(i32::try_from(parent).unwrap_or(-1));
        self
    }

    /// Combines the messages of every exception into one.
    ///
    /// Each exception is rendered as `{type} : {message}`, and nested exceptions follow their
    /// parent on a new line, prefixed with `----` once per level of nesting.
    pub fn combined_message(&self) -> String {
        if self.messages.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        self.write_message(0, 0, &mut out);
        out
    }

    /// Combines the stack traces of every exception into one.
    ///
    /// Nested traces follow their parent's, each under an `----- Inner Stack Trace -----` header.
    /// If there are several nested exceptions, headers are numbered and name the exception type.
    pub fn combined_stack_trace(&self) -> String {
        if self.messages.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        self.write_stack_trace(0, &mut out);
        out
    }

    /// Converts this failure into the detail published to the host.
    pub fn to_detail(&self) -> FailureDetail {
        FailureDetail {
            message: self.combined_message(),
            stack_trace: self.combined_stack_trace(),
        }
    }

    fn exception_type(&self, index: usize) -> Option<&str> {
        self.exception_types.get(index).and_then(Option::as_deref)
    }

    fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.parent_indices
            .iter()
            .enumerate()
            .skip(index + 1)
            .filter(move |&(_, &parent)| usize::try_from(parent).is_ok_and(|p| p == index))
            .map(|(child, _)| child)
    }

    fn write_message(&self, index: usize, level: usize, out: &mut String) {
        if level > 0 {
            out.push_str(&"----".repeat(level));
            out.push(' ');
        }
        if let Some(exception_type) = self.exception_type(index) {
            out.push_str(exception_type);
            out.push_str(" : ");
        }
        if let Some(message) = self.messages.get(index) {
            out.push_str(message);
        }
        for child in self.children(index) {
            out.push('\n');
            self.write_message(child, level + 1, out);
        }
    }

    fn write_stack_trace(&self, index: usize, out: &mut String) {
        if let Some(Some(trace)) = self.stack_traces.get(index) {
            out.push_str(trace);
        }
        let children: Vec<_> = self.children(index).collect();
        if let [child] = children.as_slice() {
            out.push_str("\n----- Inner Stack Trace -----\n");
            self.write_stack_trace(*child, out);
        } else {
            for (n, &child) in children.iter().enumerate() {
                out.push_str("\n----- Inner Stack Trace #");
                out.push_str(&(n + 1).to_string());
                out.push_str(" (");
                out.push_str(self.exception_type(child).unwrap_or("unknown"));
                out.push_str(") -----\n");
                self.write_stack_trace(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_exception() {
        let failure = FailureInformation::new(
            Some("Xunit.Sdk.EqualException"),
            "Assert.Equal() Failure",
            Some("   at Tests.Adds()"),
        );
        assert_eq!(
            failure.to_detail(),
            FailureDetail {
                message: "Xunit.Sdk.EqualException : Assert.Equal() Failure".to_owned(),
                stack_trace: "   at Tests.Adds()".to_owned(),
            }
        );
    }

    #[test]
    fn message_only() {
        let failure = FailureInformation::from_message("not yet implemented");
        assert_eq!(failure.combined_message(), "not yet implemented");
        assert_eq!(failure.combined_stack_trace(), "");
    }

    #[test]
    fn empty_failure() {
        let failure = FailureInformation::default();
        assert_eq!(failure.to_detail(), FailureDetail::default());
    }

    #[test]
    fn single_inner_exception() {
        let failure = FailureInformation::new(Some("Outer"), "outer", Some("at a"))
            .with_inner(0, Some("Inner"), "inner", Some("at b"))
            .with_inner(1, None::<String>, "innermost", Some("at c"));

        assert_eq!(
            failure.combined_message(),
            indoc! {"
                Outer : outer
                ---- Inner : inner
                -------- innermost"
            }
        );
        assert_eq!(
            failure.combined_stack_trace(),
            indoc! {"
                at a
                ----- Inner Stack Trace -----
                at b
                ----- Inner Stack Trace -----
                at c"
            }
        );
    }

    #[test]
    fn multiple_inner_exceptions() {
        let failure = FailureInformation::new(Some("Aggregate"), "many", Some("at a"))
            .with_inner(0, Some("First"), "one", Some("at b"))
            .with_inner(0, Some("Second"), "two", None::<String>);

        assert_eq!(
            failure.combined_message(),
            indoc! {"
                Aggregate : many
                ---- First : one
                ---- Second : two"
            }
        );
        // The second inner exception has no stack trace.
        assert_eq!(
            failure.combined_stack_trace(),
            "at a\n\
             ----- Inner Stack Trace #1 (First) -----\n\
             at b\n\
             ----- Inner Stack Trace #2 (Second) -----\n"
        );
    }

    #[test]
    fn deserialize() {
        let failure: FailureInformation = serde_json::from_str(
            r#"{ "exception-types": ["E"], "messages": ["m"], "stack-traces": ["t"], "parent-indices": [-1] }"#,
        )
        .unwrap();
        assert_eq!(failure, FailureInformation::new(Some("E"), "m", Some("t")));
    }
}
