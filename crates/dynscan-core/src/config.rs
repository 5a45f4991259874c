//! Configuration structures for dynscan.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of items requested per page (and per throttling batch).
pub const DEFAULT_ITEMS_PER_PAGE: usize = 200;

/// Default pause inserted after each batch.
pub const DEFAULT_PAUSE_BETWEEN_PAGES: Duration = Duration::from_millis(50);

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Store connection configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Scan pacing configuration
    #[serde(default)]
    pub scan: ScanSettings,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// DynamoDB connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Table to scan (may also be given on the command line)
    pub table_name: Option<String>,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Endpoint override (DynamoDB Local, LocalStack)
    pub endpoint_url: Option<String>,

    /// AWS access key ID
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key
    pub aws_secret_access_key: Option<String>,

    /// Attempts per request made by the SDK transport layer
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: None,
            region: default_region(),
            endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            max_attempts: default_max_attempts(),
        }
    }
}

/// Scan pacing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanSettings {
    /// Items requested per page; also the throttling batch size
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,

    /// Pause after each batch in milliseconds
    #[serde(default = "default_pause_between_pages_ms")]
    pub pause_between_pages_ms: u64,

    /// Use strongly consistent reads for each page
    #[serde(default)]
    pub consistent_read: bool,

    /// Backoff applied when the store throttles a page request
    #[serde(default)]
    pub throttle_retry: ThrottleRetryConfig,
}

impl ScanSettings {
    /// Pause between batches as a duration.
    pub fn pause_between_pages(&self) -> Duration {
        Duration::from_millis(self.pause_between_pages_ms)
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            pause_between_pages_ms: default_pause_between_pages_ms(),
            consistent_read: false,
            throttle_retry: ThrottleRetryConfig::default(),
        }
    }
}

/// Exponential backoff for throttled page requests.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ThrottleRetryConfig {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on any single delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Retries before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ThrottleRetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_items_per_page() -> usize {
    DEFAULT_ITEMS_PER_PAGE
}
fn default_pause_between_pages_ms() -> u64 {
    DEFAULT_PAUSE_BETWEEN_PAGES.as_millis() as u64
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    5
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.scan.items_per_page == 0 {
            return Err(crate::Error::Config(
                "items_per_page must be at least 1".into(),
            ));
        }

        if let Some(ref table) = self.store.table_name {
            if table.trim().is_empty() {
                return Err(crate::Error::Config(
                    "Table name should not be empty".into(),
                ));
            }
        }

        if self.store.region.trim().is_empty() {
            return Err(crate::Error::Config("AWS region is required".into()));
        }

        if self.store.max_attempts == 0 {
            return Err(crate::Error::Config("max_attempts must be at least 1".into()));
        }

        if self.store.aws_access_key_id.is_some() != self.store.aws_secret_access_key.is_some() {
            return Err(crate::Error::Config(
                "aws_access_key_id and aws_secret_access_key must be set together".into(),
            ));
        }

        if self.scan.items_per_page > i32::MAX as usize {
            return Err(crate::Error::Config(format!(
                "items_per_page {} exceeds the store's page limit",
                self.scan.items_per_page
            )));
        }

        Ok(())
    }
}
