// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt};

/// The unique identifier for a test case.
///
/// The identifier is assigned by the legacy engine and is stable across discovery and execution.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestNodeUid(SmolStr);

impl TestNodeUid {
    /// Creates a new `TestNodeUid`.
    pub fn new(uid: impl AsRef<str>) -> Self {
        Self(SmolStr::new(uid))
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TestNodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Borrow<str> for TestNodeUid {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for TestNodeUid {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

impl From<String> for TestNodeUid {
    fn from(uid: String) -> Self {
        Self::new(uid)
    }
}

/// Traits attached to a test case: a mapping from a trait key to an ordered set of values.
///
/// Keys are compared ASCII case-insensitively, both when inserting and when looking up values.
/// Deserialization merges keys the same way.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TraitMap {
    inner: IndexMap<String, IndexSet<String>>,
}

impl TraitMap {
    /// Creates a new, empty `TraitMap`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value for the given key. Duplicate values for a key are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values_mut(key.into()).insert(value.into());
    }

    // The first spelling of a key is the one that is kept.
    fn values_mut(&mut self, key: String) -> &mut IndexSet<String> {
        match self
            .inner
            .keys()
            .position(|existing| existing.eq_ignore_ascii_case(&key))
        {
            Some(index) => &mut self.inner[index],
            None => self.inner.entry(key).or_default(),
        }
    }

    /// Looks up the values for a key.
    pub fn get(&self, key: &str) -> Option<&IndexSet<String>> {
        self.inner
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, values)| values)
    }

    /// Iterates over keys and their values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> + '_ {
        self.inner
            .iter()
            .map(|(key, values)| (key.as_str(), values))
    }

    /// Iterates over every (key, value) pair, flattening multi-valued keys.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value.as_str())))
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no traits.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TraitMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<'de> Deserialize<'de> for TraitMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, Vec<String>>::deserialize(deserializer)?;
        let mut map = Self::new();
        for (key, values) in raw {
            map.values_mut(key).extend(values);
        }
        Ok(map)
    }
}

/// The location of a test in source code, if it could be resolved.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceInformation {
    /// The source file.
    pub file_name: Utf8PathBuf,

    /// The line the test starts on, if known.
    #[serde(default)]
    pub line_number: Option<u32>,
}

/// A test case, as produced by the legacy engine.
///
/// Descriptors are created during discovery and are read-only afterwards. Every downstream
/// component refers to them rather than owning a copy.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestCaseDescriptor {
    /// The unique identifier for this test case.
    pub unique_id: TestNodeUid,

    /// The name shown to users.
    pub display_name: String,

    /// The full name of the assembly (test binary) containing this test, e.g.
    /// `MyTests, Version=1.0.0.0`.
    pub assembly_name: String,

    /// The fully-qualified name of the type that owns the test method.
    pub type_name: String,

    /// The name of the test method.
    pub method_name: String,

    /// The number of generic parameters on the test method.
    #[serde(default)]
    pub generic_arity: u32,

    /// The names of the test method's parameter types.
    #[serde(default)]
    pub parameter_type_names: Vec<String>,

    /// The name of the test method's return type.
    #[serde(default)]
    pub return_type_name: String,

    /// Traits attached to this test.
    #[serde(default)]
    pub traits: TraitMap,

    /// Source information, if the engine resolved it.
    #[serde(default)]
    pub source_information: Option<SourceInformation>,
}

impl TestCaseDescriptor {
    /// Creates a new descriptor with no parameters, traits or source information.
    pub fn new(
        unique_id: impl Into<TestNodeUid>,
        display_name: impl Into<String>,
        assembly_name: impl Into<String>,
        type_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
            assembly_name: assembly_name.into(),
            type_name: type_name.into(),
            method_name: method_name.into(),
            generic_arity: 0,
            parameter_type_names: Vec::new(),
            return_type_name: String::new(),
            traits: TraitMap::new(),
            source_information: None,
        }
    }

    /// Adds a trait value to this descriptor.
    pub fn with_trait(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.traits.insert(key, value);
        self
    }

    /// Sets the method signature for this descriptor.
    pub fn with_signature(
        mut self,
        generic_arity: u32,
        parameter_type_names: impl IntoIterator<Item = impl Into<String>>,
        return_type_name: impl Into<String>,
    ) -> Self {
        self.generic_arity = generic_arity;
        self.parameter_type_names = parameter_type_names.into_iter().map(Into::into).collect();
        self.return_type_name = return_type_name.into();
        self
    }

    /// Returns the assembly name without version, culture or key information.
    pub fn simple_assembly_name(&self) -> &str {
        match self.assembly_name.split_once(',') {
            Some((simple, _)) => simple.trim(),
            None => self.assembly_name.trim(),
        }
    }

    /// Returns `{type_name}.{method_name}`.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}.{}", self.type_name, self.method_name)
    }
}
