// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Converts test-case descriptors into canonical, addressable identities.
//!
//! Type names are split on their last `.`: `Foo.Bar.Baz` has namespace `Foo.Bar` and type name
//! `Baz`. Nested types keep their `+` separator, so `Foo.Outer+Inner` has type name
//! `Outer+Inner`. Generic type arguments are not parsed, and type names that contain a `.`
//! inside generic brackets are split at that `.` as-is.

use testbridge_metadata::{CanonicalIdentity, TestCaseDescriptor};

/// Splits a fully-qualified type name into its namespace and simple type name.
///
/// Type names without a `.` have an empty namespace.
pub fn split_type_name(type_name: &str) -> (&str, &str) {
    match type_name.rsplit_once('.') {
        Some((namespace, simple)) => (namespace, simple),
        None => ("", type_name),
    }
}

/// Builds the canonical identity for a test case.
pub fn normalize(test_case: &TestCaseDescriptor) -> CanonicalIdentity {
    let (namespace, type_name) = split_type_name(&test_case.type_name);
    CanonicalIdentity {
        assembly_name: test_case.assembly_name.clone(),
        namespace: namespace.to_owned(),
        type_name: type_name.to_owned(),
        method_name: test_case.method_name.clone(),
        arity: test_case.generic_arity,
        parameter_type_names: test_case.parameter_type_names.clone(),
        return_type_name: test_case.return_type_name.clone(),
    }
}

/// Builds the hierarchical path for a test case: `/{assembly}/{namespace}/{type}/{method}`.
///
/// The assembly segment is the simple assembly name, and the namespace segment is empty if the
/// type has no namespace.
pub fn tree_node_path(test_case: &TestCaseDescriptor) -> String {
    let (namespace, type_name) = split_type_name(&test_case.type_name);
    format!(
        "/{}/{namespace}/{type_name}/{}",
        test_case.simple_assembly_name(),
        test_case.method_name,
    )
}
