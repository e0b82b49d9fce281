//! Configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `lunar.toml` in the working directory (optional), or an explicit file
//!    from the builder / `LUNAR_CONFIG_PATH` (required)
//! 3. `LUNAR_*` environment variables, `__` between section and key
//!    (`LUNAR_SANDBOX__TIMEOUT_MS=500`); a `.env` file is loaded first

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::OrchestratorOptions;
use crate::sandbox::SandboxLimits;

const DEFAULT_FILE: &str = "lunar";
const ENV_PREFIX: &str = "LUNAR";
const CONFIG_PATH_VAR: &str = "LUNAR_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub debounce_ms: u64,
    pub compile_on_start: bool,
    /// URI the edited document is registered under
    pub document_uri: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            compile_on_start: true,
            document_uri: "inmemory://model/main.flow".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            debounce: self.debounce(),
            compile_on_start: self.compile_on_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Watchdog budget per run
    pub timeout_ms: u64,
    pub memory_limit_bytes: Option<usize>,
    /// VM instructions between abort checks
    pub instruction_interval: u32,
    pub max_output_lines: usize,
    pub max_output_bytes: usize,
    /// Values copied out of a returned result before truncating
    pub max_marshal_nodes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = SandboxLimits::default();
        Self {
            timeout_ms: 2500,
            memory_limit_bytes: limits.memory_limit_bytes,
            instruction_interval: limits.instruction_interval,
            max_output_lines: limits.max_output_lines,
            max_output_bytes: limits.max_output_bytes,
            max_marshal_nodes: limits.max_marshal_nodes,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            memory_limit_bytes: self.memory_limit_bytes,
            instruction_interval: self.instruction_interval,
            max_output_lines: self.max_output_lines,
            max_output_bytes: self.max_output_bytes,
            max_marshal_nodes: self.max_marshal_nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// The effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.sandbox.instruction_interval == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.instruction_interval must be greater than zero".into(),
            ));
        }
        if self.pipeline.document_uri.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.document_uri must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    env_prefix: String,
    load_dotenv: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_string(),
            load_dotenv: true,
        }
    }
}

impl ConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Prefix for environment overrides (default `LUNAR`)
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load_dotenv(mut self, load: bool) -> Self {
        self.load_dotenv = load;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if self.load_dotenv {
            // A missing .env is fine
            let _ = dotenvy::dotenv();
        }

        let explicit = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));

        let file = match explicit {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_FILE).required(false),
        };

        let config: Config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn builder(prefix: &str) -> ConfigBuilder {
        Config::builder().env_prefix(prefix).load_dotenv(false)
    }

    #[test]
    fn test_defaults() {
        let config = builder("LUNAR_TEST_DEFAULTS").build().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pipeline.debounce(), Duration::from_millis(250));
        assert_eq!(config.sandbox.timeout(), Duration::from_millis(2500));
        assert_eq!(config.sandbox.limits(), SandboxLimits::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
[pipeline]
debounce_ms = 100

[sandbox]
timeout_ms = 500
max_output_lines = 10
max_marshal_nodes = 50
"#,
        );
        let config = builder("LUNAR_TEST_FILE")
            .config_path(Some(file.path().to_path_buf()))
            .build()
            .unwrap();

        assert_eq!(config.pipeline.debounce_ms, 100);
        assert!(config.pipeline.compile_on_start);
        assert_eq!(config.sandbox.timeout_ms, 500);
        assert_eq!(config.logging.level, "info");

        let limits = config.sandbox.limits();
        assert_eq!(limits.max_output_lines, 10);
        assert_eq!(limits.max_marshal_nodes, 50);
        assert_eq!(limits.max_output_bytes, SandboxLimits::default().max_output_bytes);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[sandbox]\ntimeout_ms = 500\n");
        std::env::set_var("LUNAR_TEST_ENV_SANDBOX__TIMEOUT_MS", "750");
        std::env::set_var("LUNAR_TEST_ENV_LOGGING__LEVEL", "debug");

        let config = builder("LUNAR_TEST_ENV")
            .config_path(Some(file.path().to_path_buf()))
            .build()
            .unwrap();

        std::env::remove_var("LUNAR_TEST_ENV_SANDBOX__TIMEOUT_MS");
        std::env::remove_var("LUNAR_TEST_ENV_LOGGING__LEVEL");

        assert_eq!(config.sandbox.timeout_ms, 750);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = builder("LUNAR_TEST_MISSING")
            .config_path(Some(PathBuf::from("/nonexistent/lunar.toml")))
            .build();
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = write_config("[sandbox]\ntimeout_ms = 0\n");
        let result = builder("LUNAR_TEST_INVALID")
            .config_path(Some(file.path().to_path_buf()))
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[pipeline]"));
        assert!(rendered.contains("debounce_ms = 250"));

        let file = write_config(&rendered);
        let loaded = builder("LUNAR_TEST_TOML")
            .config_path(Some(file.path().to_path_buf()))
            .build()
            .unwrap();
        assert_eq!(loaded, config);
    }
}
