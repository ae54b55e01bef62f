//! Layered run configuration.
//!
//! Values come from, lowest precedence first:
//! 1. built-in defaults
//! 2. `retrace.toml` at the fixture root, section `[retrace]`
//! 3. environment variables (`RETRACE_COMPILER`, `RETRACE_TIMEOUT`,
//!    `RETRACE_UPDATE_GOLDEN`)
//! 4. CLI flags
//!
//! Every resolved value remembers where it came from.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::fixture::FixtureOptions;

/// Name of the per-fixture configuration file.
pub const CONFIG_FILE_NAME: &str = "retrace.toml";

pub const ENV_COMPILER: &str = "RETRACE_COMPILER";
pub const ENV_TIMEOUT: &str = "RETRACE_TIMEOUT";
pub const ENV_UPDATE_GOLDEN: &str = "RETRACE_UPDATE_GOLDEN";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// ============================================================================
// File format
// ============================================================================

/// Contents of `retrace.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrace: RetraceConfig,
}

/// The `[retrace]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetraceConfig {
    /// External compiler command (program and fixed arguments).
    #[serde(default)]
    pub compiler: Vec<String>,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub compiler_timeout_secs: u64,

    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Artifact extensions never attributed to a source
    #[serde(default = "default_metadata_extensions")]
    pub metadata_extensions: Vec<String>,

    /// Extra search path entries, relative to the fixture root
    #[serde(default)]
    pub classpath: Vec<PathBuf>,

    /// Glob patterns skipped during fixture discovery
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default = "default_build_log")]
    pub build_log: String,

    /// Write the golden log instead of comparing against it
    #[serde(default)]
    pub update_golden: bool,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_source_extensions() -> Vec<String> {
    vec!["kt".to_string()]
}

fn default_metadata_extensions() -> Vec<String> {
    vec!["kotlin_module".to_string()]
}

fn default_build_log() -> String {
    "build.log".to_string()
}

impl Default for RetraceConfig {
    fn default() -> Self {
        Self {
            compiler: Vec::new(),
            compiler_timeout_secs: default_timeout_secs(),
            source_extensions: default_source_extensions(),
            metadata_extensions: default_metadata_extensions(),
            classpath: Vec::new(),
            exclude: Vec::new(),
            build_log: default_build_log(),
            update_golden: false,
        }
    }
}

impl Config {
    /// Parse configuration text.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Load `retrace.toml` from a fixture, if present.
    pub fn load_from_fixture(fixture_root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = fixture_root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load(&path).map(Some)
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default = 0,
    /// From `retrace.toml`.
    ProjectConfig = 1,
    EnvVar = 2,
    /// CLI flag (highest precedence).
    CliFlag = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Replace the value if `source` has at least this value's precedence.
    pub fn set(&mut self, value: T, source: ConfigSource) {
        if source >= self.source {
            self.value = value;
            self.source = source;
        }
    }
}

/// CLI configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--compiler` (repeatable: program then arguments).
    pub compiler: Option<Vec<String>>,
    /// `--timeout` in seconds.
    pub timeout_secs: Option<u64>,
    /// `--update-golden`.
    pub update_golden: bool,
}

/// Resolved configuration with precedence information.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub compiler: ConfigValue<Vec<String>>,
    pub timeout: ConfigValue<Duration>,
    pub source_extensions: ConfigValue<Vec<String>>,
    pub metadata_extensions: ConfigValue<Vec<String>>,
    /// Absolute search path entries.
    pub classpath: ConfigValue<Vec<PathBuf>>,
    pub exclude: ConfigValue<Vec<String>>,
    pub build_log: ConfigValue<String>,
    pub update_golden: ConfigValue<bool>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let defaults = RetraceConfig::default();
        let d = ConfigSource::Default;
        ResolvedConfig {
            compiler: ConfigValue::new(defaults.compiler, d),
            timeout: ConfigValue::new(Duration::from_secs(defaults.compiler_timeout_secs), d),
            source_extensions: ConfigValue::new(defaults.source_extensions, d),
            metadata_extensions: ConfigValue::new(defaults.metadata_extensions, d),
            classpath: ConfigValue::new(defaults.classpath, d),
            exclude: ConfigValue::new(defaults.exclude, d),
            build_log: ConfigValue::new(defaults.build_log, d),
            update_golden: ConfigValue::new(defaults.update_golden, d),
        }
    }
}

impl ResolvedConfig {
    /// Resolve configuration for a fixture from all sources.
    pub fn resolve(fixture_root: &Path, cli: &CliOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with_env(fixture_root, cli, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with_env<F>(
        fixture_root: &Path,
        cli: &CliOverrides,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ResolvedConfig::default();

        if let Some(file) = Config::load_from_fixture(fixture_root)? {
            debug!(fixture = %fixture_root.display(), "applying {}", CONFIG_FILE_NAME);
            config.apply_project_config(fixture_root, file.retrace);
        }
        config.apply_env_vars(env)?;
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn apply_project_config(&mut self, fixture_root: &Path, file: RetraceConfig) {
        let p = ConfigSource::ProjectConfig;
        if !file.compiler.is_empty() {
            self.compiler.set(file.compiler, p);
        }
        self.timeout
            .set(Duration::from_secs(file.compiler_timeout_secs), p);
        self.source_extensions.set(file.source_extensions, p);
        self.metadata_extensions.set(file.metadata_extensions, p);
        let classpath = file
            .classpath
            .into_iter()
            .map(|entry| fixture_root.join(entry))
            .collect();
        self.classpath.set(classpath, p);
        self.exclude.set(file.exclude, p);
        self.build_log.set(file.build_log, p);
        self.update_golden.set(file.update_golden, p);
    }

    fn apply_env_vars<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let e = ConfigSource::EnvVar;

        if let Some(command) = env(ENV_COMPILER) {
            let command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if !command.is_empty() {
                self.compiler.set(command, e);
            }
        }

        if let Some(timeout) = env(ENV_TIMEOUT) {
            let secs = timeout
                .trim()
                .parse::<u64>()
                .map_err(|err| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT,
                    value: timeout.clone(),
                    reason: err.to_string(),
                })?;
            self.timeout.set(Duration::from_secs(secs), e);
        }

        if let Some(flag) = env(ENV_UPDATE_GOLDEN) {
            let value = parse_bool(&flag).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_UPDATE_GOLDEN,
                value: flag.clone(),
                reason: "expected 1/0, true/false or yes/no".to_string(),
            })?;
            self.update_golden.set(value, e);
        }

        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        let c = ConfigSource::CliFlag;
        if let Some(ref command) = cli.compiler {
            if !command.is_empty() {
                self.compiler.set(command.clone(), c);
            }
        }
        if let Some(secs) = cli.timeout_secs {
            self.timeout.set(Duration::from_secs(secs), c);
        }
        if cli.update_golden {
            self.update_golden.set(true, c);
        }
    }

    /// Discovery options for [`crate::fixture::Fixture::load`].
    pub fn fixture_options(&self) -> FixtureOptions {
        FixtureOptions {
            source_extensions: self.source_extensions.value.clone(),
            exclude: self.exclude.value.clone(),
            build_log: self.build_log.value.clone(),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
