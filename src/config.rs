//! Configuration management for the gallery client.
//!
//! Handles loading, saving, and validating configuration from JSON files, and
//! resolving the catalog origin once at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "gallery.json";

/// Catalog origin used during local development
pub const LOCAL_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Catalog origin used everywhere else
pub const PRODUCTION_BASE_URL: &str =
    "https://thirteenkapi-service-227629318480.us-central1.run.app/api/v1";

/// Host names treated as loopback when picking the environment
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]"];

/// Deployment environment the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    #[default]
    Production,
}

impl Environment {
    /// Pick the environment for a reported host name
    ///
    /// Loopback names map to `Local`, anything else to `Production`.
    pub fn from_host(host: &str) -> Self {
        let host = host.trim().to_ascii_lowercase();
        if LOOPBACK_HOSTS.contains(&host.as_str()) {
            Environment::Local
        } else {
            Environment::Production
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Which catalog origin to use
    #[serde(default)]
    pub environment: Environment,

    /// Catalog base URL for the local environment
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,

    /// Catalog base URL for the production environment (must be https)
    #[serde(default = "default_production_base_url")]
    pub production_base_url: String,

    /// Directory downloads are saved into
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Page size used when none is given
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_local_base_url() -> String {
    LOCAL_BASE_URL.to_string()
}

fn default_production_base_url() -> String {
    PRODUCTION_BASE_URL.to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_page_size() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            local_base_url: default_local_base_url(),
            production_base_url: default_production_base_url(),
            download_dir: default_download_dir(),
            page_size: default_page_size(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or return default config if it cannot be read
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
            Self::default()
        })
    }

    /// Save configuration to a JSON file atomically
    ///
    /// Writes to a temporary sibling first and renames it into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;

        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            ConfigError::ReadError(e)
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let local = parse_base_url("local_base_url", &self.local_base_url)?;
        if !matches!(local.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(
                "local_base_url must use http or https".to_string(),
            ));
        }

        let production = parse_base_url("production_base_url", &self.production_base_url)?;
        if production.scheme() != "https" {
            return Err(ConfigError::ValidationError(
                "production_base_url must use https".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "page_size must be greater than 0".to_string(),
            ));
        }

        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "download_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Override the environment, e.g. from the command line
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Base URL of the catalog API for the configured environment
    pub fn base_url(&self) -> &str {
        match self.environment {
            Environment::Local => &self.local_base_url,
            Environment::Production => &self.production_base_url,
        }
    }
}

fn parse_base_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| {
        ConfigError::ValidationError(format!("{} '{}' is not a valid URL: {}", field, value, e))
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::ValidationError(format!(
            "{} '{}' cannot be used as a base URL",
            field, value
        )));
    }

    Ok(url)
}
