// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional configuration file that casktend reads
//! at startup, and the effective run configuration produced after layering
//! file settings, environment overrides, and command-line flags on top of
//! the built-in defaults.
//!
//! # Precedence
//!
//! Built-in defaults < configuration file < environment overrides <
//! command-line flags. The file itself lives at
//! `$XDG_CONFIG_HOME/casktend/config.toml` by default, and its absence is a
//! normal condition, not an error.
//!
//! # Environment Overrides
//!
//! - `CASKTEND_IGNORE_FILE`: path to the ignore file (shell expanded).
//! - `CASKTEND_NO_REMEDIATE`: disable the health scan and remediation
//!   stages when set to anything other than "0".
//! - `CASKTEND_VERBOSE`: enable per-item progress output when set to
//!   anything other than "0".

use crate::path::{default_config_file, default_ignore_file};

use serde::{Deserialize, Serialize};
use std::{
    env,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

/// Configuration file layout.
///
/// All fields are optional in the file itself; anything left out falls back
/// to the built-in default when the effective [`RunConfig`] is assembled.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ConfigLayout {
    /// Settings for a remediation run.
    #[serde(default)]
    pub settings: RunSettings,
}

impl FromStr for ConfigLayout {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut layout: ConfigLayout = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on ignore file field.
        if let Some(ignore_file) = &layout.settings.ignore_file {
            layout.settings.ignore_file = Some(
                shellexpand::full(ignore_file)
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            );
        }

        Ok(layout)
    }
}

impl Display for ConfigLayout {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Settings for a remediation run.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RunSettings {
    /// Path to the static ignore file.
    pub ignore_file: Option<String>,

    /// Whether the health scan and remediation stages run at all.
    #[serde(default = "default_remediate")]
    pub remediate: bool,

    /// Whether per-item progress is printed.
    #[serde(default)]
    pub verbose: bool,

    /// Extra failure phrases appended to the built-in detection table.
    pub extra_failure_phrases: Option<Vec<String>>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            ignore_file: None,
            remediate: true,
            verbose: false,
            extra_failure_phrases: None,
        }
    }
}

fn default_remediate() -> bool {
    true
}

/// Effective configuration for one remediation run.
///
/// Assembled once at startup and immutable afterward. Command-line flags are
/// applied by the caller after [`RunConfig::load`] returns, since clap owns
/// that surface.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RunConfig {
    /// Path to the static ignore file.
    pub ignore_file: PathBuf,

    /// Whether stages 2 and 3 (health scan, remediation) run at all.
    pub remediate: bool,

    /// Whether per-item progress is printed.
    pub verbose: bool,

    /// Extra failure phrases appended to the built-in detection table.
    pub extra_failure_phrases: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ignore_file: default_ignore_file(),
            remediate: true,
            verbose: false,
            extra_failure_phrases: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Load effective configuration from default file location plus
    /// environment overrides.
    ///
    /// A missing configuration file yields the built-in defaults. A present
    /// but malformed file is an error, since silently ignoring a file the
    /// user wrote would hide typos.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Deserialize`] if configuration file parsing
    ///   fails.
    /// - Return [`ConfigError::ShellExpansion`] if shell expansion on a
    ///   configured path fails.
    pub fn load() -> Result<Self> {
        let layout = match default_config_file() {
            Ok(path) => Self::read_layout(&path)?,
            Err(err) => {
                warn!("{err}, skipping configuration file");
                ConfigLayout::default()
            }
        };

        let mut config = Self::from_layout(layout);
        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Construct effective configuration from a parsed file layout.
    pub fn from_layout(layout: ConfigLayout) -> Self {
        let defaults = Self::default();

        Self {
            ignore_file: layout
                .settings
                .ignore_file
                .map(PathBuf::from)
                .unwrap_or(defaults.ignore_file),
            remediate: layout.settings.remediate,
            verbose: layout.settings.verbose,
            extra_failure_phrases: layout.settings.extra_failure_phrases.unwrap_or_default(),
        }
    }

    fn read_layout(path: &Path) -> Result<ConfigLayout> {
        if !path.exists() {
            debug!("no configuration file at {:?}", path.display());
            return Ok(ConfigLayout::default());
        }

        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        data.parse()
    }

    /// Apply environment overrides on top of current configuration.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if shell expansion on
    ///   `CASKTEND_IGNORE_FILE` fails.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = env::var("CASKTEND_IGNORE_FILE") {
            self.ignore_file = PathBuf::from(
                shellexpand::full(&path)
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            );
        }

        if env_flag("CASKTEND_NO_REMEDIATE") {
            self.remediate = false;
        }

        if env_flag("CASKTEND_VERBOSE") {
            self.verbose = true;
        }

        Ok(())
    }
}

/// Interpret an environment variable as a boolean flag.
///
/// Set to anything other than "0" or empty means enabled.
fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => !value.is_empty() && value != "0",
        Err(_) => false,
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read a configuration file that exists.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_config_layout() -> anyhow::Result<()> {
        let result: ConfigLayout = r#"
            [settings]
            ignore_file = "$BLAH/.casktend-ignore"
            remediate = false
            verbose = true
            extra_failure_phrases = ["it broke"]
        "#
        .parse()?;

        let expect = ConfigLayout {
            settings: RunSettings {
                ignore_file: Some("/home/blah/.casktend-ignore".into()),
                remediate: false,
                verbose: true,
                extra_failure_phrases: Some(vec!["it broke".into()]),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_config_layout_defaults_missing_fields() -> anyhow::Result<()> {
        let result: ConfigLayout = "[settings]\n".parse()?;

        assert_eq!(
            result,
            ConfigLayout {
                settings: RunSettings::default()
            }
        );
        assert!(result.settings.remediate);

        Ok(())
    }

    #[test]
    fn serialize_config_layout() {
        let result = ConfigLayout {
            settings: RunSettings {
                ignore_file: Some("/home/blah/.casktend-ignore".into()),
                remediate: false,
                verbose: true,
                extra_failure_phrases: None,
            },
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            ignore_file = "/home/blah/.casktend-ignore"
            remediate = false
            verbose = true
        "#};

        assert_eq!(result, expect);
    }

    #[sealed_test(env = [
        ("CASKTEND_IGNORE_FILE", "/tmp/other-ignore"),
        ("CASKTEND_NO_REMEDIATE", "1"),
        ("CASKTEND_VERBOSE", "true"),
    ])]
    fn env_overrides_take_effect() -> anyhow::Result<()> {
        let mut config = RunConfig::default();
        config.apply_env_overrides()?;

        assert_eq!(config.ignore_file, PathBuf::from("/tmp/other-ignore"));
        assert!(!config.remediate);
        assert!(config.verbose);

        Ok(())
    }

    #[sealed_test(env = [("CASKTEND_NO_REMEDIATE", "0")])]
    fn env_flag_zero_means_disabled() -> anyhow::Result<()> {
        let mut config = RunConfig::default();
        config.apply_env_overrides()?;

        assert!(config.remediate);

        Ok(())
    }
}
