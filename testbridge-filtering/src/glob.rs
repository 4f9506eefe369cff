// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Glob matching for tree node filter segments.

use crate::errors::GlobConstructError;

/// A glob pattern matched against a single path segment.
///
/// We do not use `globset::GlobMatcher` directly because it has path-like semantics, so we use
/// regexes directly.
#[derive(Clone, Debug)]
pub struct GenericGlob {
    /// The glob string.
    glob_str: String,

    /// The regex to match against.
    regex: regex::bytes::Regex,
}

impl GenericGlob {
    /// Creates a new generic glob.
    pub fn new(glob_str: impl Into<String>) -> Result<Self, GlobConstructError> {
        let glob_str = glob_str.into();
        let glob = globset::GlobBuilder::new(&glob_str)
            // Backslashes are filter escapes, not glob escapes. Use [] to match a metacharacter.
            .backslash_escape(false)
            // Allow Method{,Async} to match both Method and MethodAsync.
            .empty_alternates(true)
            .build()
            .map_err(GlobConstructError::InvalidGlob)?;

        let regex = regex::bytes::Regex::new(glob.regex())
            .map_err(|error| GlobConstructError::RegexError(error.to_string()))?;

        Ok(Self { glob_str, regex })
    }

    /// Returns the glob string.
    pub fn as_str(&self) -> &str {
        &self.glob_str
    }

    /// Returns true if this glob matches the given string.
    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s.as_bytes())
    }
}

impl PartialEq for GenericGlob {
    fn eq(&self, other: &Self) -> bool {
        self.glob_str == other.glob_str
    }
}

impl Eq for GenericGlob {}
