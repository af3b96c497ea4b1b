//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; missing values fall back to the
//! station defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{LinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live stream (WebSocket) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_url")]
    pub url: String,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Synthetic fallback configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_enabled")]
    pub enabled: bool,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Rolling chart buffer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
}

/// Event log ring configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

/// Backend REST API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// How the session sources its data at startup
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    /// Connect to the backend, fall back to synthetic data while offline
    Live,
    /// Never connect; synthetic data only
    Simulation,
}

/// Station configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StationConfig {
    #[serde(default = "default_mode")]
    pub mode: StartupMode,

    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_stream_url() -> String { "ws://localhost:8000/ws".to_string() }
fn default_reconnect_interval_ms() -> u64 { 5000 }
fn default_connect_timeout_ms() -> u64 { 10000 }

fn default_fallback_enabled() -> bool { true }
fn default_tick_interval_ms() -> u64 { 2000 }

fn default_buffer_capacity() -> usize { 20 }

fn default_log_capacity() -> usize { 50 }

fn default_api_base_url() -> String { "http://localhost:8000".to_string() }
fn default_request_timeout_ms() -> u64 { 5000 }

fn default_mode() -> StartupMode { StartupMode::Live }
fn default_latitude() -> f64 { -7.2575 }
fn default_longitude() -> f64 { 112.7521 }

fn default_log_level() -> String { "info".to_string() }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: default_fallback_enabled(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: default_buffer_capacity() }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { capacity: default_log_capacity() }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl StreamConfig {
    /// Fixed backoff between reconnect attempts
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Upper bound on a single connection attempt
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl FallbackConfig {
    /// Period between synthetic samples
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl ApiConfig {
    /// Timeout applied to each one-shot pull
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> LinkError {
    LinkError::Config(toml::de::Error::custom(message))
}

fn check_range_ms(name: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(invalid(format!("{} must be between 1 and {}", name, max)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wattscope_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Stream endpoint must be a WebSocket URL
        let stream_url = Url::parse(&self.stream.url)
            .map_err(|e| invalid(format!("stream url is invalid: {}", e)))?;
        if !matches!(stream_url.scheme(), "ws" | "wss") {
            return Err(invalid("stream url must use ws:// or wss://"));
        }

        let api_url = Url::parse(&self.api.base_url)
            .map_err(|e| invalid(format!("api base_url is invalid: {}", e)))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(invalid("api base_url must use http:// or https://"));
        }

        // Validate timing fields
        check_range_ms("reconnect_interval_ms", self.stream.reconnect_interval_ms, 60000)?;
        check_range_ms("connect_timeout_ms", self.stream.connect_timeout_ms, 60000)?;
        check_range_ms("tick_interval_ms", self.fallback.tick_interval_ms, 60000)?;
        check_range_ms("request_timeout_ms", self.api.request_timeout_ms, 60000)?;

        if self.buffer.capacity == 0 || self.buffer.capacity > 1000 {
            return Err(invalid("buffer capacity must be between 1 and 1000"));
        }

        if self.log.capacity == 0 || self.log.capacity > 10000 {
            return Err(invalid("log capacity must be between 1 and 10000"));
        }

        // Validate home position
        if !self.station.latitude.is_finite() || self.station.latitude.abs() > 90.0 {
            return Err(invalid("station latitude must be between -90 and 90"));
        }

        if !self.station.longitude.is_finite() || self.station.longitude.abs() > 180.0 {
            return Err(invalid("station longitude must be between -180 and 180"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        if matches!(self.logging.directory.as_deref(), Some("")) {
            return Err(invalid("logging directory cannot be empty when set"));
        }

        Ok(())
    }
}
