//! Configuration management for the vsctl CLI.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Defaults
//! - Config file (`.vsctl/config.yaml` in the workspace, or `VSCTL_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The credential is never part of this configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Providers the backend factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["openai", "memory"];

/// Default vendor endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .vsctl/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Vendor binding ("openai" or "memory")
    pub provider: String,

    /// Base URL of the vendor API
    pub endpoint: String,

    /// Assistant used for retrieval-augmented answering
    pub assistant: AssistantConfig,

    /// Polling cadence and caps for remote jobs
    pub polling: PollingConfig,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Assistant configuration from config.yaml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub name: String,
    pub instructions: String,
    pub model: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "RAG Assistant".to_string(),
            instructions: "Use the provided information to respond to user queries.".to_string(),
            model: "gpt-3.5-turbo".to_string(),
        }
    }
}

/// Polling configuration from config.yaml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(rename = "intervalMs")]
    pub interval_ms: u64,

    #[serde(rename = "ingestionTimeoutSecs")]
    pub ingestion_timeout_secs: u64,

    #[serde(rename = "queryTimeoutSecs")]
    pub query_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            ingestion_timeout_secs: 600,
            query_timeout_secs: 300,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ingestion_timeout(&self) -> Duration {
        Duration::from_secs(self.ingestion_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    provider: Option<String>,
    endpoint: Option<String>,
    assistant: Option<AssistantFileConfig>,
    polling: Option<PollingFileConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AssistantFileConfig {
    name: Option<String>,
    instructions: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PollingFileConfig {
    #[serde(rename = "intervalMs")]
    interval_ms: Option<u64>,
    #[serde(rename = "ingestionTimeoutSecs")]
    ingestion_timeout_secs: Option<u64>,
    #[serde(rename = "queryTimeoutSecs")]
    query_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "openai".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            assistant: AssistantConfig::default(),
            polling: PollingConfig::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, the config file and defaults.
    ///
    /// Environment variables:
    /// - `VSCTL_WORKSPACE`: Override workspace path
    /// - `VSCTL_CONFIG`: Path to config file
    /// - `VSCTL_PROVIDER`: Vendor binding
    /// - `VSCTL_ENDPOINT`: Vendor base URL
    /// - `VSCTL_MODEL`: Assistant model
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use vsctl_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Provider: {}", config.provider);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// taking precedence over `VSCTL_WORKSPACE` and `VSCTL_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("VSCTL_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        if let Some(config_file) =
            config_file.or_else(|| std::env::var("VSCTL_CONFIG").ok().map(PathBuf::from))
        {
            config.config_file = Some(config_file);
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config.config_path();
        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file does not exist: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("VSCTL_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(endpoint) = std::env::var("VSCTL_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(model) = std::env::var("VSCTL_MODEL") {
            config.assistant.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Path of the YAML config file that applies to this configuration.
    pub fn config_path(&self) -> PathBuf {
        self.config_file
            .clone()
            .unwrap_or_else(|| self.vsctl_dir().join("config.yaml"))
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(provider) = config_file.provider {
            result.provider = provider;
        }

        if let Some(endpoint) = config_file.endpoint {
            result.endpoint = endpoint;
        }

        if let Some(assistant) = config_file.assistant {
            if let Some(name) = assistant.name {
                result.assistant.name = name;
            }
            if let Some(instructions) = assistant.instructions {
                result.assistant.instructions = instructions;
            }
            if let Some(model) = assistant.model {
                result.assistant.model = model;
            }
        }

        if let Some(polling) = config_file.polling {
            if let Some(interval_ms) = polling.interval_ms {
                result.polling.interval_ms = interval_ms;
            }
            if let Some(secs) = polling.ingestion_timeout_secs {
                result.polling.ingestion_timeout_secs = secs;
            }
            if let Some(secs) = polling.query_timeout_secs {
                result.polling.query_timeout_secs = secs;
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        endpoint: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }

        if let Some(model) = model {
            self.assistant.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .vsctl directory.
    pub fn vsctl_dir(&self) -> PathBuf {
        self.workspace.join(".vsctl")
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.to_lowercase();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if provider == "openai" && !self.endpoint.starts_with("http") {
            return Err(AppError::Config(format!(
                "Endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }

        if self.assistant.model.trim().is_empty() {
            return Err(AppError::Config("Assistant model must not be empty".to_string()));
        }

        if self.polling.interval_ms == 0 {
            return Err(AppError::Config(
                "polling.intervalMs must be greater than zero".to_string(),
            ));
        }

        let interval = self.polling.interval();
        if self.polling.ingestion_timeout() < interval || self.polling.query_timeout() < interval {
            return Err(AppError::Config(
                "polling timeouts must not be shorter than polling.intervalMs".to_string(),
            ));
        }

        Ok(())
    }
}
