// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line options understood by the bridge.

use crate::{framework::TestFrameworkOptions, test_filter::FilterSpec};
use camino::Utf8PathBuf;
use clap::Args;
use testbridge_metadata::TestNodeUid;

/// Options that configure a [`TestFramework`](crate::framework::TestFramework).
#[derive(Clone, Debug, Default, Args)]
pub struct BridgeOpts {
    /// Legacy filter expression, e.g. `FullyQualifiedName~Parser|Category=Unit`
    #[arg(long, value_name = "EXPR", num_args = 1)]
    pub filter: Option<String>,

    /// Run settings document to read
    #[arg(long, value_name = "PATH")]
    pub settings: Option<Utf8PathBuf>,

    /// Additional modules to read source information from
    #[arg(long = "source-module", value_name = "PATH")]
    pub source_modules: Vec<Utf8PathBuf>,
}

impl BridgeOpts {
    /// Converts these options into framework options.
    pub fn into_framework_options(self) -> TestFrameworkOptions {
        TestFrameworkOptions {
            filter: self.filter,
            settings: self.settings,
            extra_modules: self.source_modules,
        }
    }
}

/// Options that select the filter the host would send along with a request.
#[derive(Clone, Debug, Default, Args)]
#[group(multiple = false)]
pub struct HostFilterOpts {
    /// Tree node filter, e.g. `/Tests/Ns/Math/*`
    #[arg(long, value_name = "PATTERN")]
    pub tree_filter: Option<String>,

    /// Only include tests with these identifiers
    #[arg(long = "uid", value_name = "UID")]
    pub uids: Vec<String>,
}

impl HostFilterOpts {
    /// Converts these options into a [`FilterSpec`].
    pub fn to_filter_spec(&self) -> FilterSpec {
        if let Some(tree_filter) = &self.tree_filter {
            FilterSpec::TreeNode(tree_filter.clone())
        } else if !self.uids.is_empty() {
            FilterSpec::UidList(self.uids.iter().map(TestNodeUid::new).collect())
        } else {
            FilterSpec::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        bridge: BridgeOpts,

        #[command(flatten)]
        host_filter: HostFilterOpts,
    }

    #[test]
    fn filter_takes_one_value() {
        let cli = TestCli::try_parse_from(["test", "--filter", "Category=Unit"]).unwrap();
        assert_eq!(cli.bridge.filter.as_deref(), Some("Category=Unit"));
        assert_eq!(cli.host_filter.to_filter_spec(), FilterSpec::None);

        TestCli::try_parse_from(["test", "--filter"]).unwrap_err();
        TestCli::try_parse_from(["test", "--filter", "a", "b"]).unwrap_err();
    }

    #[test]
    fn host_filters_conflict() {
        let cli = TestCli::try_parse_from(["test", "--uid", "a", "--uid", "b"]).unwrap();
        assert_eq!(
            cli.host_filter.to_filter_spec(),
            FilterSpec::UidList(vec!["a".into(), "b".into()])
        );

        TestCli::try_parse_from(["test", "--uid", "a", "--tree-filter", "/**"]).unwrap_err();
    }
}
