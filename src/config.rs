//! Configuration management for the Poseidon backend
//!
//! Settings come from an optional `poseidon.toml` and from environment
//! variables. Missing values fall back to defaults and missing credentials
//! are a startup error.

use crate::PoseidonError;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseidonConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Upstream provider settings
    pub upstream: UpstreamConfig,
    /// Multi-point aggregation settings
    pub aggregation: AggregationConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upstream provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Data-portal key for the weather services
    #[serde(default)]
    pub kma_service_key: String,
    /// Data-portal key for the air-quality services
    #[serde(default)]
    pub airkorea_service_key: String,
    /// Base URL of the forecast grid service
    #[serde(default = "default_kma_base_url")]
    pub kma_base_url: String,
    /// Base URL of the ground-observation service
    #[serde(default = "default_asos_base_url")]
    pub asos_base_url: String,
    /// Base URL of the air-quality services
    #[serde(default = "default_airkorea_base_url")]
    pub airkorea_base_url: String,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}

/// Multi-point aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Minimum spacing between upstream calls in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Points resolved at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Optional JSON point file replacing the built-in points
    #[serde(default)]
    pub points_file: Option<PathBuf>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_port() -> u16 {
    4000
}

fn default_kma_base_url() -> String {
    "http://apis.data.go.kr/1360000/VilageFcstInfoService_2.0".to_string()
}

fn default_asos_base_url() -> String {
    "http://apis.data.go.kr/1360000/AsosHourlyInfoService".to_string()
}

fn default_airkorea_base_url() -> String {
    "http://apis.data.go.kr/B552584".to_string()
}

fn default_timeout() -> u32 {
    10
}

fn default_throttle_ms() -> u64 {
    200
}

fn default_max_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            kma_service_key: String::new(),
            airkorea_service_key: String::new(),
            kma_base_url: default_kma_base_url(),
            asos_base_url: default_asos_base_url(),
            airkorea_base_url: default_airkorea_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            max_concurrency: default_max_concurrency(),
            points_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Settings file read from the working directory when present
const DEFAULT_CONFIG_FILE: &str = "poseidon.toml";

/// Unprefixed variables of the legacy deployment
const ALIASES: [(&str, &str); 3] = [
    ("KMA_SERVICE_KEY", "upstream.kma_service_key"),
    ("AIRKOREA_SERVICE_KEY", "upstream.airkorea_service_key"),
    ("PORT", "server.port"),
];

impl PoseidonConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(None, None)
    }

    /// Load configuration from an optional TOML file and an environment.
    ///
    /// `vars` replaces the process environment when given. Variables use the
    /// `POSEIDON_` prefix with `__` between section and key, for example
    /// `POSEIDON_AGGREGATION__MAX_CONCURRENCY`.
    pub fn load_from(
        config_path: Option<PathBuf>,
        vars: Option<Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("POSEIDON")
                .prefix_separator("_")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .source(vars.clone()),
        );

        for (name, key) in ALIASES {
            let value = match &vars {
                Some(vars) => vars.get(name).cloned(),
                None => std::env::var(name).ok(),
            };
            let value = value.filter(|value| !value.trim().is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: PoseidonConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // Apply defaults for values set to empty
        config.apply_defaults();

        config.validate()?;

        Ok(config)
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.upstream.kma_base_url.is_empty() {
            self.upstream.kma_base_url = default_kma_base_url();
        }
        if self.upstream.asos_base_url.is_empty() {
            self.upstream.asos_base_url = default_asos_base_url();
        }
        if self.upstream.airkorea_base_url.is_empty() {
            self.upstream.airkorea_base_url = default_airkorea_base_url();
        }
        if self.upstream.timeout_seconds == 0 {
            self.upstream.timeout_seconds = default_timeout();
        }
        if self.aggregation.max_concurrency == 0 {
            self.aggregation.max_concurrency = default_max_concurrency();
        }
        self.logging.level = self.logging.level.trim().to_lowercase();
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        self.logging.format = self.logging.format.trim().to_lowercase();
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_api_keys()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Both data-portal keys are required
    pub fn validate_api_keys(&self) -> Result<()> {
        for (name, key) in [
            ("KMA_SERVICE_KEY", &self.upstream.kma_service_key),
            ("AIRKOREA_SERVICE_KEY", &self.upstream.airkorea_service_key),
        ] {
            if key.trim().is_empty() {
                return Err(PoseidonError::config(format!(
                    "{name} is not set. Request a service key from the public data portal."
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.upstream.timeout_seconds > 120 {
            return Err(PoseidonError::config("Upstream timeout cannot exceed 120 seconds").into());
        }

        if self.aggregation.throttle_ms > 10_000 {
            return Err(PoseidonError::config("Throttle interval cannot exceed 10000 ms").into());
        }

        if self.aggregation.max_concurrency > 32 {
            return Err(PoseidonError::config("Max concurrency cannot exceed 32").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(PoseidonError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(PoseidonError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("forecast", &self.upstream.kma_base_url),
            ("ground observation", &self.upstream.asos_base_url),
            ("air quality", &self.upstream.airkorea_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PoseidonError::config(format!(
                    "The {name} base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_seconds.into())
    }

    #[must_use]
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.aggregation.throttle_ms)
    }
}
