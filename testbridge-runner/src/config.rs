// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for testbridge.
//!
//! Settings are merged from three layers, with later layers taking precedence:
//!
//! 1. the built-in defaults in `default-config.toml`;
//! 2. an optional `testbridge.toml` next to the test binary;
//! 3. a run settings document, passed in with `--settings` or through the
//!    [`RunSettings::ENV_VAR`] environment variable.

use crate::errors::{ConfigParseError, ConfigurationError, RunSettingsParseError};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use quick_xml::{Reader, events::Event};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Settings for a test binary, read from `testbridge.toml`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssemblyConfig {
    /// Whether diagnostic messages from the engine are shown.
    pub diagnostic_messages: bool,

    /// Whether test collections run in parallel.
    pub parallelize_test_collections: bool,

    /// Whether data-driven tests are enumerated into individual cases during discovery.
    pub pre_enumerate_theories: bool,

    /// Whether skipped tests are reported as failures.
    pub fail_skips: bool,
}

impl AssemblyConfig {
    /// The default configuration.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the configuration file, looked up in the test binary's directory.
    pub const CONFIG_FILE_NAME: &'static str = "testbridge.toml";

    /// Returns the path at which the configuration for `test_binary` is looked up.
    pub fn config_path(test_binary: &Utf8Path) -> Utf8PathBuf {
        test_binary
            .parent()
            .unwrap_or(Utf8Path::new("."))
            .join(Self::CONFIG_FILE_NAME)
    }

    /// Loads the configuration for a test binary.
    ///
    /// A missing configuration file is not an error. Unknown keys are reported as warnings.
    pub fn for_test_binary(test_binary: &Utf8Path) -> Result<Self, ConfigParseError> {
        let config_file = Self::config_path(test_binary);
        let (config, unknown) = Self::from_file(&config_file)?;
        if !unknown.is_empty() {
            let unknown = unknown.into_iter().collect::<Vec<_>>().join(", ");
            warn!(%config_file, %unknown, "ignoring unknown configuration keys");
        }
        Ok(config)
    }

    /// Loads configuration from the given file, falling back to defaults if the file doesn't
    /// exist. Returns the configuration and the set of unknown keys.
    pub fn from_file(
        config_file: &Utf8Path,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseError> {
        let config = Config::builder()
            .add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(false))
            .build()
            .map_err(|error| ConfigParseError::new(config_file, error))?;

        let mut unknown = BTreeSet::new();
        let deserialized: AssemblyConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .map_err(|error| ConfigParseError::new(config_file, error))?;

        debug!(%config_file, ?deserialized, "loaded assembly configuration");
        Ok((deserialized.into(), unknown))
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            diagnostic_messages: false,
            parallelize_test_collections: true,
            pre_enumerate_theories: true,
            fail_skips: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AssemblyConfigDeserialize {
    diagnostic_messages: bool,
    parallelize_test_collections: bool,
    pre_enumerate_theories: bool,
    fail_skips: bool,
}

impl From<AssemblyConfigDeserialize> for AssemblyConfig {
    fn from(value: AssemblyConfigDeserialize) -> Self {
        Self {
            diagnostic_messages: value.diagnostic_messages,
            parallelize_test_collections: value.parallelize_test_collections,
            pre_enumerate_theories: value.pre_enumerate_theories,
            fail_skips: value.fail_skips,
        }
    }
}

/// The elements of a run settings document that testbridge reads.
///
/// Values are only set if the document contains the corresponding element.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSettings {
    /// `/RunSettings/RunConfiguration/CollectSourceInformation`.
    pub collect_source_information: Option<bool>,

    /// `/RunSettings/RunConfiguration/DisableParallelization`.
    pub disable_parallelization: Option<bool>,
}

impl RunSettings {
    /// The environment variable the host uses to pass run settings when no settings file is
    /// given.
    pub const ENV_VAR: &'static str = "TESTINGPLATFORM_EXPERIMENTAL_VSTEST_RUNSETTINGS";

    const COLLECT_SOURCE_INFORMATION: &'static str = "CollectSourceInformation";
    const DISABLE_PARALLELIZATION: &'static str = "DisableParallelization";

    /// Parses a run settings document.
    pub fn parse(xml: &str) -> Result<Self, RunSettingsParseError> {
        let mut reader = Reader::from_str(xml);
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut settings = Self::default();

        loop {
            match reader.read_event()? {
                Event::Start(start) => path.push(start.name().as_ref().to_vec()),
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(text) => {
                    let Some(element) = Self::run_configuration_element(&path) else {
                        continue;
                    };
                    let value = text.unescape()?;
                    let value = value.trim();
                    if value.is_empty() {
                        continue;
                    }
                    let value = Some(parse_bool(element, value)?);
                    match element {
                        Self::COLLECT_SOURCE_INFORMATION => {
                            settings.collect_source_information = value;
                        }
                        _ => settings.disable_parallelization = value,
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(settings)
    }

    /// Reads and parses a run settings file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigurationError> {
        if !path.is_file() {
            return Err(ConfigurationError::MissingSettingsFile {
                path: path.to_owned(),
            });
        }
        let xml = std::fs::read_to_string(path).map_err(|error| {
            ConfigurationError::ReadSettingsFile {
                path: path.to_owned(),
                error,
            }
        })?;
        Self::parse(&xml).map_err(|error| ConfigurationError::InvalidSettingsFile {
            path: path.to_owned(),
            error,
        })
    }

    /// Parses run settings passed through [`Self::ENV_VAR`].
    ///
    /// Only `CollectSourceInformation` is read from the environment. An unparseable document is
    /// ignored.
    pub fn from_env_value(value: Option<&str>) -> Self {
        let Some(xml) = value else {
            return Self::default();
        };
        match Self::parse(xml) {
            Ok(settings) => Self {
                collect_source_information: settings.collect_source_information,
                disable_parallelization: None,
            },
            Err(error) => {
                debug!(%error, "ignoring unparseable run settings from {}", Self::ENV_VAR);
                Self::default()
            }
        }
    }

    fn run_configuration_element(path: &[Vec<u8>]) -> Option<&'static str> {
        match path {
            [root, section, element]
                if root.as_slice() == b"RunSettings" && section.as_slice() == b"RunConfiguration" =>
            {
                [Self::COLLECT_SOURCE_INFORMATION, Self::DISABLE_PARALLELIZATION]
                    .into_iter()
                    .find(|name| name.as_bytes() == element.as_slice())
            }
            _ => None,
        }
    }
}

// Booleans are matched case-insensitively, like `true`, `True` and `TRUE`.
fn parse_bool(element: &'static str, value: &str) -> Result<bool, RunSettingsParseError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(RunSettingsParseError::InvalidBool {
            element,
            value: value.to_owned(),
        })
    }
}

/// The effective settings for a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BridgeSettings {
    /// The assembly configuration, with run settings applied.
    pub assembly: AssemblyConfig,

    /// Whether source information is collected during discovery.
    pub collect_source_information: bool,
}

impl BridgeSettings {
    /// Loads the settings for a test binary.
    ///
    /// If `settings_file` is `None`, run settings are read from [`RunSettings::ENV_VAR`].
    pub fn load(
        test_binary: &Utf8Path,
        settings_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigurationError> {
        let assembly = AssemblyConfig::for_test_binary(test_binary)?;
        let run_settings = match settings_file {
            Some(path) => RunSettings::from_file(path)?,
            None => {
                let env_value = std::env::var(RunSettings::ENV_VAR).ok();
                RunSettings::from_env_value(env_value.as_deref())
            }
        };
        Ok(Self::new(assembly, run_settings))
    }

    /// Applies run settings on top of an assembly configuration.
    pub fn new(mut assembly: AssemblyConfig, run_settings: RunSettings) -> Self {
        if let Some(disable) = run_settings.disable_parallelization {
            assembly.parallelize_test_collections = !disable;
        }
        Self {
            assembly,
            collect_source_information: run_settings.collect_source_information.unwrap_or(false),
        }
    }
}
