// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::NO_HEADING_TARGET;
use std::error::Error;
use testbridge_metadata::TestBridgeExitCode;
use testbridge_runner::errors::{EngineError, ExecuteRequestError};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are printed with display_to_stderr.

/// An error that the command-line driver knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("failed to load engine script")]
    ScriptLoad {
        #[source]
        err: EngineError,
    },
    #[error("failed to create async runtime")]
    RuntimeCreate {
        #[source]
        err: std::io::Error,
    },
    #[error("request failed")]
    Request {
        #[from]
        err: ExecuteRequestError,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ScriptLoad { .. } | Self::RuntimeCreate { .. } => TestBridgeExitCode::SETUP_ERROR,
            Self::Request { err } => match err {
                ExecuteRequestError::TestFilter(_) => TestBridgeExitCode::INVALID_FILTER,
                ExecuteRequestError::UnsupportedFilterKind(_) => {
                    TestBridgeExitCode::UNSUPPORTED_FILTER
                }
                ExecuteRequestError::Sink(_)
                | ExecuteRequestError::Engine(EngineError::Sink(_)) => {
                    TestBridgeExitCode::PUBLISH_ERROR
                }
                _ => TestBridgeExitCode::SETUP_ERROR,
            },
        }
    }

    /// Displays this error to stderr, along with its chain of causes.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::ScriptLoad { err } => {
                error!("failed to load engine script");
                Some(err as &dyn Error)
            }
            Self::RuntimeCreate { err } => {
                error!("failed to create async runtime");
                Some(err as &dyn Error)
            }
            Self::Request { err } => match err {
                ExecuteRequestError::TestFilter(filter_err) => {
                    match filter_err.expression_errors() {
                        Some(errors) => {
                            // Parse errors are rendered with miette, pointing into the input.
                            for single_error in &errors.errors {
                                let report = miette::Report::new(single_error.clone())
                                    .with_source_code(errors.input.clone());
                                error!(target: NO_HEADING_TARGET, "{:?}", report);
                            }
                            error!("{filter_err}");
                            None
                        }
                        None => {
                            error!("{filter_err}");
                            filter_err.source()
                        }
                    }
                }
                ExecuteRequestError::UnsupportedFilterKind(_)
                | ExecuteRequestError::UnsupportedRequestKind(_) => {
                    error!("{err}");
                    None
                }
                _ => {
                    error!("{err}");
                    err.source()
                }
            },
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
