// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages published to the host platform.

use crate::TestNodeUid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, time::Duration};

/// Identifies the host session that a message belongs to.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionUid(SmolStr);

impl SessionUid {
    /// Creates a new `SessionUid`.
    pub fn new(uid: impl AsRef<str>) -> Self {
        Self(SmolStr::new(uid))
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SessionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status update for a single test node, addressed to a session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestNodeUpdateMessage {
    /// The session this update belongs to.
    pub session_uid: SessionUid,

    /// The test node.
    pub node: TestNode,
}

/// The host-facing representation of a test case's current state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestNode {
    /// The test's unique identifier.
    pub uid: TestNodeUid,

    /// The name shown to users.
    pub display_name: String,

    /// The state transition this update represents.
    pub state: TestNodeState,

    /// The canonical method identity. Only set for discovered nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_identifier: Option<CanonicalIdentity>,

    /// The source location of the test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TestFileLocation>,

    /// One entry per trait value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<TestMetadata>,

    /// Timing information, for results and cleanup failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingInfo>,

    /// Standard output captured while the test ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_output: Option<String>,

    /// Set if this update reports a cleanup failure rather than a test result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupTag>,

    /// Extra properties attached in structured report mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportProperties>,
}

impl TestNode {
    /// Creates a node with the given identity and state, and no other properties.
    pub fn new(
        uid: TestNodeUid,
        display_name: impl Into<String>,
        state: TestNodeState,
    ) -> Self {
        Self {
            uid,
            display_name: display_name.into(),
            state,
            method_identifier: None,
            location: None,
            metadata: Vec::new(),
            timing: None,
            standard_output: None,
            cleanup: None,
            report: None,
        }
    }

    /// Returns the report properties, creating them if necessary.
    pub fn report_mut(&mut self) -> &mut ReportProperties {
        self.report.get_or_insert_with(ReportProperties::default)
    }
}

/// The state transition carried by a [`TestNode`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TestNodeState {
    /// The test was found during discovery.
    Discovered,

    /// The test started running.
    InProgress,

    /// The test passed.
    Passed,

    /// The test failed, or a cleanup step affecting it failed.
    Failed {
        /// Details about the failure.
        failure: FailureDetail,
    },

    /// The test was skipped.
    Skipped {
        /// The reason the test was skipped, if one was given.
        #[serde(default)]
        reason: Option<String>,
    },
}

impl TestNodeState {
    /// Returns true if this is a terminal state (passed, failed or skipped).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed { .. } | Self::Skipped { .. }
        )
    }

    /// Returns a short, static description of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::InProgress => "in-progress",
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// A human-readable message and a stack trace describing a failure.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureDetail {
    /// The combined failure message.
    pub message: String,

    /// The combined stack trace.
    pub stack_trace: String,
}

/// The canonical, addressable identity of a test method.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CanonicalIdentity {
    /// The full name of the assembly.
    pub assembly_name: String,

    /// The namespace, or an empty string if the type has none.
    pub namespace: String,

    /// The type name without its namespace.
    pub type_name: String,

    /// The method name.
    pub method_name: String,

    /// The number of generic parameters on the method.
    pub arity: u32,

    /// The parameter type names.
    pub parameter_type_names: Vec<String>,

    /// The return type name.
    pub return_type_name: String,
}

/// A file and line for a test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestFileLocation {
    /// The path to the source file.
    pub file_path: String,

    /// The line number, if known.
    #[serde(default)]
    pub line: Option<u32>,
}

/// A key-value pair derived from a test trait.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    /// The trait key.
    pub key: String,

    /// The trait value.
    pub value: String,
}

/// Start, end and duration of a test execution.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimingInfo {
    /// When the test started, computed as the end time minus the duration.
    pub start_time: DateTime<Utc>,

    /// When the result was reported.
    pub end_time: DateTime<Utc>,

    /// The execution time reported by the legacy engine.
    pub duration: Duration,
}

/// The scope of a cleanup step.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupScope {
    /// Cleanup of a single test.
    Test,

    /// Cleanup of a test method, shared by all of its cases.
    TestMethod,

    /// Cleanup of a test class.
    TestClass,

    /// Cleanup of a test collection.
    TestCollection,

    /// Cleanup of the whole test assembly.
    TestAssembly,
}

impl CleanupScope {
    /// All scopes, from narrowest to broadest.
    pub const ALL: [Self; 5] = [
        Self::Test,
        Self::TestMethod,
        Self::TestClass,
        Self::TestCollection,
        Self::TestAssembly,
    ];

    /// A human-readable name for this scope.
    pub fn description(self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::TestMethod => "Test Method",
            Self::TestClass => "Test Class",
            Self::TestCollection => "Test Collection",
            Self::TestAssembly => "Test Assembly",
        }
    }
}

impl fmt::Display for CleanupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Marks an update as a cleanup failure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CleanupTag {
    /// The scope that failed to clean up.
    pub scope: CleanupScope,

    /// A label naming the scope, e.g. `[Test Class Cleanup Failure (Ns.Type)]`.
    pub label: String,
}

impl CleanupTag {
    /// Creates a tag for the given scope, naming the unit that failed (a test, method, class,
    /// collection or assembly name).
    pub fn new(scope: CleanupScope, unit_name: &str) -> Self {
        Self {
            scope,
            label: format!("[{} Cleanup Failure ({unit_name})]", scope.description()),
        }
    }
}

/// Properties only attached when structured report mode is enabled.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportProperties {
    /// Categories, from the `category` trait.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Messages to include in the report.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ReportMessage>,

    /// The failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<FailureDetail>,

    /// The fully-qualified name of the test's type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_type_name: Option<String>,
}

/// A message in a structured report.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "kebab-case")]
pub enum ReportMessage {
    /// Captured standard output.
    StandardOutput(String),
}
