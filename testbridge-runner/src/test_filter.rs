// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides which test cases a request applies to.
//!
//! A request can carry two independent filters: a legacy filter expression passed in on the
//! command line, and a filter sent by the host. A test case is admitted if it matches both.

use crate::{
    errors::{TestFilterBuildError, UnsupportedFilterKind},
    identity,
};
use std::{borrow::Cow, collections::BTreeSet};
use testbridge_filtering::{
    FULLY_QUALIFIED_NAME_PROPERTY, FilterExpression, PropertyValue, TreeNodeFilter,
};
use testbridge_metadata::{TestCaseDescriptor, TestNodeUid};

/// The name of the property that resolves to a test's display name.
pub const DISPLAY_NAME_PROPERTY: &str = "DisplayName";

/// A filter sent by the host, before parsing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum FilterSpec {
    /// No filter: every test case is admitted.
    #[default]
    None,

    /// A legacy filter expression.
    Expression(String),

    /// A hierarchical path filter over `/{assembly}/{namespace}/{type}/{method}`.
    TreeNode(String),

    /// An explicit list of test identifiers.
    UidList(Vec<TestNodeUid>),

    /// A kind of filter that is not known to testbridge.
    Other {
        /// The name of the filter kind.
        kind: String,
    },
}

/// A parsed host filter.
#[derive(Clone, Debug)]
pub enum HostFilter {
    /// Admits every test case.
    None,

    /// Admits test cases that match the expression.
    Expression(FilterExpression),

    /// Admits test cases whose path and properties match the filter.
    TreeNode(TreeNodeFilter),

    /// Admits test cases whose identifier is in the set.
    UidList(BTreeSet<TestNodeUid>),

    /// A filter kind that testbridge cannot evaluate.
    Unsupported {
        /// The name of the filter kind.
        kind: String,
    },
}

impl HostFilter {
    /// Parses a host filter.
    ///
    /// Unknown filter kinds are not rejected here. They are reported by
    /// [`TestFilter::validate`] and [`TestFilter::admits`].
    pub fn new(spec: FilterSpec) -> Result<Self, TestFilterBuildError> {
        match spec {
            FilterSpec::None => Ok(Self::None),
            FilterSpec::Expression(input) => FilterExpression::parse(input)
                .map(Self::Expression)
                .map_err(TestFilterBuildError::HostExpression),
            FilterSpec::TreeNode(input) => TreeNodeFilter::parse(input)
                .map(Self::TreeNode)
                .map_err(TestFilterBuildError::TreeNode),
            FilterSpec::UidList(uids) => Ok(Self::UidList(uids.into_iter().collect())),
            FilterSpec::Other { kind } => Ok(Self::Unsupported { kind }),
        }
    }
}

/// The combination of the legacy filter expression and the host filter for a request.
#[derive(Clone, Debug)]
pub struct TestFilter {
    legacy: Option<FilterExpression>,
    host: HostFilter,
}

impl TestFilter {
    /// Builds a filter out of an optional legacy expression and a host filter.
    pub fn new(legacy: Option<&str>, host: FilterSpec) -> Result<Self, TestFilterBuildError> {
        let legacy = legacy
            .map(FilterExpression::parse)
            .transpose()
            .map_err(TestFilterBuildError::Expression)?;
        let host = HostFilter::new(host)?;
        Ok(Self { legacy, host })
    }

    /// Checks that the host filter can be evaluated.
    pub fn validate(&self) -> Result<(), UnsupportedFilterKind> {
        match &self.host {
            HostFilter::Unsupported { kind } => Err(UnsupportedFilterKind::new(kind)),
            _ => Ok(()),
        }
    }

    /// Returns true if the test case should be included in the request.
    ///
    /// The legacy expression is checked first. A test case it rejects is never checked against
    /// the host filter.
    pub fn admits(&self, test_case: &TestCaseDescriptor) -> Result<bool, UnsupportedFilterKind> {
        let lookup = |name: &str| property_value(test_case, name);
        if let Some(legacy) = &self.legacy {
            if !legacy.matches(lookup) {
                return Ok(false);
            }
        }

        match &self.host {
            HostFilter::None => Ok(true),
            HostFilter::Expression(expr) => Ok(expr.matches(lookup)),
            HostFilter::TreeNode(filter) => {
                Ok(filter.matches(&identity::tree_node_path(test_case), lookup))
            }
            HostFilter::UidList(uids) => Ok(uids.contains(&test_case.unique_id)),
            HostFilter::Unsupported { kind } => Err(UnsupportedFilterKind::new(kind)),
        }
    }
}

/// Looks up a named property of a test case for filter evaluation.
///
/// `FullyQualifiedName` resolves to `{type}.{method}` and `DisplayName` to the display name. Any
/// other name is looked up among the test's traits, and resolves to absent if there is no such
/// trait.
pub fn property_value<'a>(
    test_case: &'a TestCaseDescriptor,
    name: &str,
) -> Option<PropertyValue<'a>> {
    if name.eq_ignore_ascii_case(FULLY_QUALIFIED_NAME_PROPERTY) {
        Some(PropertyValue::Single(Cow::Owned(test_case.fully_qualified_name())))
    } else if name.eq_ignore_ascii_case(DISPLAY_NAME_PROPERTY) {
        Some(PropertyValue::Single(Cow::Borrowed(&test_case.display_name)))
    } else {
        test_case
            .traits
            .get(name)
            .map(|values| PropertyValue::Multiple(values.iter().map(String::as_str).collect()))
    }
}
