//! Application wiring
//!
//! Loads configuration and starts the two workers. The returned
//! [`Application`] hands out the services the orchestrator and the CLI use.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::orchestrator::{Orchestrator, OutputSink, SharedDocument};
use crate::sandbox::{SharedWatchdog, Watchdog};
use crate::transpile::{spawn_transpile_worker, TranspileClient};

/// Running pipeline services
pub struct Application {
    pub config: Config,
    pub transpiler: TranspileClient,
    pub watchdog: SharedWatchdog,
}

impl Application {
    /// Start the transpile worker and the sandbox watchdog for `config`
    pub fn new(config: Config) -> Result<Self> {
        let transpiler = spawn_transpile_worker().context("Failed to start transpile worker")?;
        let watchdog = Watchdog::new(config.sandbox.limits())
            .context("Failed to start sandbox worker")?;
        let watchdog = SharedWatchdog::new(watchdog, config.sandbox.timeout());

        Ok(Self {
            config,
            transpiler,
            watchdog,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A document registered under the configured URI
    pub fn document(&self, text: impl Into<String>) -> SharedDocument {
        SharedDocument::new(self.config.pipeline.document_uri.clone(), text)
    }

    /// Pipeline over `document` reporting to `sink`
    pub fn orchestrator<S: OutputSink>(
        &self,
        document: SharedDocument,
        sink: S,
    ) -> Orchestrator<TranspileClient, SharedWatchdog, S> {
        Orchestrator::new(
            document,
            self.transpiler.clone(),
            self.watchdog.clone(),
            sink,
            self.config.pipeline.orchestrator_options(),
        )
    }
}

/// Options for initializing the pipeline
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<String>,

    /// Watchdog budget (overrides config file and env vars)
    pub timeout_ms: Option<u64>,

    /// Debounce delay (overrides config file and env vars)
    pub debounce_ms: Option<u64>,
}

/// Builder for constructing InitOptions
#[derive(Debug, Default)]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.options.debounce_ms = Some(debounce_ms);
        self
    }

    pub fn init(self) -> Result<Application> {
        initialize(self.options)
    }
}

/// Resolve configuration with `options` applied on top
pub fn load_config(options: &InitOptions) -> Result<Config> {
    let mut config = Config::builder()
        .config_path(options.config_path.as_ref().map(std::path::PathBuf::from))
        .build()
        .context("Failed to load configuration")?;

    if let Some(timeout_ms) = options.timeout_ms {
        anyhow::ensure!(timeout_ms > 0, "timeout must be greater than zero");
        config.sandbox.timeout_ms = timeout_ms;
    }
    if let Some(debounce_ms) = options.debounce_ms {
        config.pipeline.debounce_ms = debounce_ms;
    }
    Ok(config)
}

/// Load configuration and start the workers
pub fn initialize(options: InitOptions) -> Result<Application> {
    let config = load_config(&options)?;
    Application::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionMessage;

    #[test]
    fn test_overrides_applied() {
        let options = InitOptions {
            timeout_ms: Some(900),
            debounce_ms: Some(10),
            ..Default::default()
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.sandbox.timeout_ms, 900);
        assert_eq!(config.pipeline.debounce_ms, 10);
    }

    #[test]
    fn test_zero_timeout_override_rejected() {
        let options = InitOptions {
            timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(load_config(&options).is_err());
    }

    #[tokio::test]
    async fn test_compile_and_run_through_services() {
        let app = InitBuilder::new().timeout_ms(5000).init().unwrap();
        let uri = app.config().pipeline.document_uri.clone();

        app.transpiler
            .sync_document(uri.as_str(), "const n = 6 * 7\nconsole.log(n)")
            .await
            .unwrap();
        let result = app.transpiler.transpile(uri.as_str()).await.unwrap();
        assert!(!result.has_errors());

        let messages = app.watchdog.run(result.script).await.unwrap();
        assert_eq!(messages, vec![ExecutionMessage::printed("42")]);
    }
}
