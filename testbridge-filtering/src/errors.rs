// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while parsing filters.

use miette::{Diagnostic, SourceSpan};
use std::cell::RefCell;
use thiserror::Error;

/// A backslash in a filter string was not followed by one of the special characters
/// `\ ( ) & | = ! ~`.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("filter string `{input}` includes unrecognized escape sequence")]
#[non_exhaustive]
pub struct InvalidFilterSyntax {
    /// The string that failed to unescape.
    pub input: String,

    /// The byte offset of the offending backslash within `input`.
    pub offset: usize,
}

impl InvalidFilterSyntax {
    pub(crate) fn new(input: impl Into<String>, offset: usize) -> Self {
        Self {
            input: input.into(),
            offset,
        }
    }
}

/// A set of errors that occurred while parsing a legacy filter expression.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to parse filter expression `{input}`")]
#[non_exhaustive]
pub struct FilterExpressionParseErrors {
    /// The input string.
    pub input: String,

    /// The parse errors returned.
    pub errors: Vec<ParseSingleError>,
}

impl FilterExpressionParseErrors {
    pub(crate) fn new(input: impl Into<String>, errors: Vec<ParseSingleError>) -> Self {
        Self {
            input: input.into(),
            errors,
        }
    }
}

/// An individual error that occurred while parsing a filter expression.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseSingleError {
    /// A backslash was not followed by a special character.
    #[error("unrecognized escape sequence")]
    InvalidEscapeSequence(#[label("a backslash must be followed by one of \\ ( ) & | = ! ~")] SourceSpan),

    /// A property name was expected before an operator.
    #[error("expected property name")]
    ExpectedPropertyName(#[label("missing property name")] SourceSpan),

    /// A value was expected after an operator.
    #[error("expected value")]
    ExpectedValue(#[label("missing value after operator")] SourceSpan),

    /// A close parenthesis was expected.
    #[error("expected close parenthesis")]
    ExpectedCloseParenthesis(#[label("missing ')'")] SourceSpan),

    /// An expression was expected.
    #[error("expected filter expression")]
    ExpectedExpr(#[label("missing expression")] SourceSpan),

    /// The input continued past the end of a valid expression.
    #[error("expected end of expression")]
    ExpectedEndOfExpression(#[label("unparsed input")] SourceSpan),

    /// An internal error occurred while parsing.
    #[error("unknown parsing error")]
    Unknown,
}

/// An error that occurred while parsing a hierarchical path filter.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeFilterParseError {
    /// The filter did not start with `/`.
    #[error("tree node filter `{input}` must start with '/'")]
    MissingLeadingSlash {
        /// The input string.
        input: String,
    },

    /// A segment was not a valid glob.
    #[error("invalid glob `{segment}` in tree node filter")]
    InvalidGlob {
        /// The segment that failed to parse.
        segment: String,

        /// The underlying error.
        #[source]
        error: GlobConstructError,
    },

    /// A property predicate was not terminated with `]`.
    #[error("unterminated property predicate in segment `{segment}`")]
    UnterminatedPredicate {
        /// The segment that failed to parse.
        segment: String,
    },

    /// A property predicate failed to parse.
    #[error("invalid property predicate in segment `{segment}`")]
    InvalidPredicate {
        /// The segment that failed to parse.
        segment: String,

        /// The underlying errors.
        #[source]
        errors: FilterExpressionParseErrors,
    },

    /// `**` appeared somewhere other than the last segment.
    #[error("'**' must be the last segment of tree node filter `{input}`")]
    MisplacedRecursiveWildcard {
        /// The input string.
        input: String,
    },
}

/// An error that occurred while constructing a glob.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GlobConstructError {
    /// An error occurred while parsing a glob.
    #[error("{0}")]
    InvalidGlob(globset::Error),

    /// An error occurred while creating a regular expression from a glob.
    #[error("{0}")]
    RegexError(String),
}

#[derive(Clone, Debug)]
pub(crate) struct State<'a> {
    // A `RefCell` is required here because the state must implement `Clone` to work with winnow.
    errors: &'a RefCell<Vec<ParseSingleError>>,
}

impl<'a> State<'a> {
    pub(crate) fn new(errors: &'a RefCell<Vec<ParseSingleError>>) -> Self {
        Self { errors }
    }

    pub(crate) fn report_error(&self, error: ParseSingleError) {
        self.errors.borrow_mut().push(error);
    }
}
