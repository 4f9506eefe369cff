// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical path filters, such as `/MyTests/Ns/*Tests/Parse*[Category=Unit]`.
//!
//! A filter is a `/`-separated list of segments matched against a test's path
//! (`/{assembly}/{namespace}/{type}/{method}`). Each segment is a glob, optionally followed by a
//! property predicate in brackets that is evaluated as a legacy filter expression. A final `**`
//! segment matches any remaining segments.

use crate::{
    FilterExpression, PropertyValue,
    errors::TreeFilterParseError,
    glob::GenericGlob,
};
use std::fmt;

const RECURSIVE_WILDCARD: &str = "**";

/// A parsed hierarchical path filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNodeFilter {
    input: String,
    segments: Vec<TreeSegment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TreeSegment {
    matcher: SegmentMatcher,
    predicate: Option<FilterExpression>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum SegmentMatcher {
    Glob(GenericGlob),
    AnyRemaining,
}

impl TreeNodeFilter {
    /// Parses a tree node filter.
    pub fn parse(input: impl Into<String>) -> Result<Self, TreeFilterParseError> {
        let input = input.into();
        let Some(rest) = input.strip_prefix('/') else {
            return Err(TreeFilterParseError::MissingLeadingSlash { input });
        };

        let raw_segments = split_segments(rest);
        let last = raw_segments.len() - 1;
        let mut segments = Vec::with_capacity(raw_segments.len());
        for (index, raw) in raw_segments.into_iter().enumerate() {
            let segment = TreeSegment::parse(raw)?;
            if segment.matcher == SegmentMatcher::AnyRemaining && index != last {
                return Err(TreeFilterParseError::MisplacedRecursiveWildcard { input });
            }
            segments.push(segment);
        }

        Ok(Self { input, segments })
    }

    /// Returns the string this filter was parsed from.
    pub fn as_str(&self) -> &str {
        &self.input
    }

    /// Returns true if `path` matches this filter.
    ///
    /// `lookup` provides the properties that bracketed predicates are evaluated against.
    pub fn matches<'a, F>(&self, path: &str, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<PropertyValue<'a>>,
    {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        let parts: Vec<&str> = rest.split('/').collect();

        for (index, segment) in self.segments.iter().enumerate() {
            match &segment.matcher {
                SegmentMatcher::AnyRemaining => return segment.predicate_matches(&lookup),
                SegmentMatcher::Glob(glob) => match parts.get(index) {
                    Some(part) if glob.is_match(part) => {}
                    _ => return false,
                },
            }
            if !segment.predicate_matches(&lookup) {
                return false;
            }
        }

        parts.len() == self.segments.len()
    }
}

impl fmt::Display for TreeNodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}

impl TreeSegment {
    fn parse(raw: &str) -> Result<Self, TreeFilterParseError> {
        let (glob_str, predicate) = match raw.find('[') {
            Some(open) => {
                let Some(inner) = raw[open + 1..].strip_suffix(']') else {
                    return Err(TreeFilterParseError::UnterminatedPredicate {
                        segment: raw.to_owned(),
                    });
                };
                let predicate = FilterExpression::parse(inner).map_err(|errors| {
                    TreeFilterParseError::InvalidPredicate {
                        segment: raw.to_owned(),
                        errors,
                    }
                })?;
                (&raw[..open], Some(predicate))
            }
            None => (raw, None),
        };

        let matcher = if glob_str == RECURSIVE_WILDCARD {
            SegmentMatcher::AnyRemaining
        } else {
            let glob = GenericGlob::new(glob_str).map_err(|error| {
                TreeFilterParseError::InvalidGlob {
                    segment: raw.to_owned(),
                    error,
                }
            })?;
            SegmentMatcher::Glob(glob)
        };

        Ok(Self { matcher, predicate })
    }

    fn predicate_matches<'a>(&self, lookup: &dyn Fn(&str) -> Option<PropertyValue<'a>>) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate.matches(lookup))
    }
}

// Splits on '/' outside of bracketed predicates, which may themselves contain '/'.
fn split_segments(s: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                segments.push(&s[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    segments.push(&s[start..]);
    segments
}
