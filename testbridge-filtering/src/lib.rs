// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Filters used by testbridge to select test cases.
//!
//! Two filter languages are supported:
//!
//! * Legacy filter expressions, such as `Category=Unit & FullyQualifiedName~Parser`, which
//!   compare named properties of a test case. See [`FilterExpression`].
//! * Tree node filters, such as `/MyTests/*/ParserTests/*`, which match a test's hierarchical
//!   path. See [`TreeNodeFilter`].

pub mod errors;
mod escape;
mod expression;
mod glob;
mod parsing;
mod tree_filter;

pub use escape::{ESCAPE_CHARACTER, SPECIAL_CHARACTERS, escape, unescape};
pub use expression::{FilterExpression, PropertyValue};
pub use glob::GenericGlob;
pub use parsing::{ComparisonOperator, Condition, FULLY_QUALIFIED_NAME_PROPERTY, ParsedExpr};
pub use tree_filter::TreeNodeFilter;
