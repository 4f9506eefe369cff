// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testbridge.

use camino::Utf8PathBuf;
use config::ConfigError;
use testbridge_filtering::errors::{FilterExpressionParseErrors, TreeFilterParseError};
use testbridge_metadata::TestNodeUid;
use thiserror::Error;

/// An error that occurred while parsing an assembly configuration file.
#[derive(Debug, Error)]
#[error("failed to parse testbridge config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error that occurred while parsing a run settings document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunSettingsParseError {
    /// The document was not well-formed XML.
    #[error("run settings document is not well-formed XML")]
    Xml(#[from] quick_xml::Error),

    /// A boolean element held something other than `true` or `false`.
    #[error("invalid value `{value}` for `{element}`: expected `true` or `false`")]
    InvalidBool {
        /// The element name.
        element: &'static str,

        /// The value that was found.
        value: String,
    },
}

/// An error that occurred while setting up a request, before any events were processed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The test binary does not exist.
    #[error("test binary `{path}` does not exist")]
    MissingTestBinary {
        /// The path that was checked.
        path: Utf8PathBuf,
    },

    /// The settings file passed in does not exist.
    #[error("settings file `{path}` does not exist")]
    MissingSettingsFile {
        /// The path that was checked.
        path: Utf8PathBuf,
    },

    /// The settings file could not be read.
    #[error("failed to read settings file `{path}`")]
    ReadSettingsFile {
        /// The path to the settings file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The settings file could not be parsed.
    #[error("failed to parse settings file `{path}`")]
    InvalidSettingsFile {
        /// The path to the settings file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: RunSettingsParseError,
    },

    /// The assembly configuration file could not be parsed.
    #[error(transparent)]
    Config(#[from] ConfigParseError),
}

/// An error that occurred while building a test filter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestFilterBuildError {
    /// The legacy filter expression failed to parse.
    #[error("invalid --filter expression")]
    Expression(#[source] FilterExpressionParseErrors),

    /// The host's expression filter failed to parse.
    #[error("invalid host filter expression")]
    HostExpression(#[source] FilterExpressionParseErrors),

    /// The host's tree node filter failed to parse.
    #[error("invalid tree node filter")]
    TreeNode(#[source] TreeFilterParseError),
}

impl TestFilterBuildError {
    /// Returns the underlying filter expression errors, if any.
    pub fn expression_errors(&self) -> Option<&FilterExpressionParseErrors> {
        match self {
            Self::Expression(errors) | Self::HostExpression(errors) => Some(errors),
            Self::TreeNode(_) => None,
        }
    }
}

/// The host sent a kind of filter that testbridge does not understand.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("filter kind `{kind}` is not supported")]
pub struct UnsupportedFilterKind {
    kind: String,
}

impl UnsupportedFilterKind {
    pub(crate) fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// Returns the kind of filter that was sent.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// The host sent a kind of request that testbridge does not understand.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("request kind `{kind}` is not supported")]
pub struct UnsupportedRequestKind {
    kind: String,
}

impl UnsupportedRequestKind {
    pub(crate) fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// Returns the kind of request that was sent.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// An error returned by a [`MessageBus`](crate::bus::MessageBus) while publishing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("message bus rejected update: {message}")]
pub struct PublishError {
    message: String,
}

impl PublishError {
    /// Creates a new `PublishError`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An error that occurred within the execution or discovery sink.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// Publishing an update to the host failed.
    #[error("failed to publish `{state}` update for test `{uid}`")]
    Publish {
        /// The test whose update failed to publish.
        uid: TestNodeUid,

        /// The state that was being published.
        state: &'static str,

        /// The underlying error.
        #[source]
        error: PublishError,
    },
}

/// An error that occurred within a test engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine script could not be read.
    #[error("failed to read engine script `{path}`")]
    ReadScript {
        /// The path to the script.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The engine script could not be parsed.
    #[error("failed to parse engine script `{path}`")]
    ParseScript {
        /// The path to the script.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The script listed the same test twice.
    #[error("engine script `{path}` lists test `{uid}` more than once")]
    DuplicateTest {
        /// The path to the script.
        path: Utf8PathBuf,

        /// The duplicated identifier.
        uid: TestNodeUid,
    },

    /// The engine was asked to run a test it does not know about.
    #[error("test `{uid}` is not known to the engine")]
    UnknownTest {
        /// The unknown identifier.
        uid: TestNodeUid,
    },

    /// A worker thread panicked.
    #[error("engine worker for collection `{collection}` panicked")]
    WorkerPanicked {
        /// The collection the worker was running.
        collection: String,
    },

    /// A sink rejected an event.
    #[error("sink failed while processing engine events")]
    Sink(#[from] SinkError),
}

/// An error returned by [`TestFramework::execute_request`](crate::framework::TestFramework::execute_request).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecuteRequestError {
    /// The request could not be set up.
    #[error("failed to set up request")]
    Configuration(#[from] ConfigurationError),

    /// A filter could not be parsed.
    #[error("failed to build test filter")]
    TestFilter(#[from] TestFilterBuildError),

    /// The host sent a filter kind that is not supported.
    #[error(transparent)]
    UnsupportedFilterKind(#[from] UnsupportedFilterKind),

    /// The host sent a request kind that is not supported.
    #[error(transparent)]
    UnsupportedRequestKind(#[from] UnsupportedRequestKind),

    /// The engine failed.
    #[error("test engine failed")]
    Engine(#[from] EngineError),

    /// Publishing an update failed.
    #[error("failed to report test status")]
    Sink(#[from] SinkError),

    /// The engine stopped without reporting that the run finished.
    #[error("test engine exited without signaling run completion")]
    RunNotCompleted,

    /// A blocking worker task failed to complete.
    #[error("worker task failed")]
    WorkerTask(#[from] tokio::task::JoinError),
}
