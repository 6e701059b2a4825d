//! Configuration management for the log shipper

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3100/loki/api/v1/push";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Loki push endpoint
    pub endpoint: String,

    /// Number of buffered entries that triggers an immediate flush
    pub batch_size: usize,

    /// Period of the background flush timer
    pub flush_interval: Duration,

    /// Value of the `app` stream label
    pub app_label: String,

    /// Mirror every entry to standard output
    pub console_echo: bool,

    /// Value of the `debug` stream label
    pub debug: bool,

    /// Credentials injected as an `Authorization: Basic` header
    pub basic_auth: Option<BasicAuth>,

    /// HTTP timeout for push requests
    pub http_timeout: Duration,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct BasicAuth {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            app_label: "game".to_string(),
            console_echo: false,
            debug: cfg!(debug_assertions),
            basic_auth: None,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Values that fail to parse leave the default in place.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(endpoint) = lookup("LOKI_URL") {
            config.endpoint = endpoint;
        }

        if let Some(batch_size) = lookup("LOKI_BATCH_SIZE") {
            if let Ok(size) = batch_size.trim().parse() {
                config.batch_size = size;
            }
        }

        if let Some(flush_interval) = lookup("LOKI_FLUSH_INTERVAL_SECONDS") {
            if let Some(interval) = parse_seconds(&flush_interval) {
                config.flush_interval = interval;
            }
        }

        if let Some(app_label) = lookup("LOKI_APP_LABEL") {
            config.app_label = app_label;
        }

        if let Some(echo) = lookup("LOKI_CONSOLE_ECHO") {
            config.console_echo = parse_flag(&echo);
        }

        if let Some(debug) = lookup("LOKI_DEBUG") {
            config.debug = parse_flag(&debug);
        }

        if let Some(username) = lookup("LOKI_USERNAME") {
            config.basic_auth = Some(BasicAuth {
                username,
                password: lookup("LOKI_PASSWORD").unwrap_or_default(),
            });
        }

        if let Some(timeout) = lookup("LOKI_HTTP_TIMEOUT_SECONDS") {
            if let Some(timeout) = parse_seconds(&timeout) {
                config.http_timeout = timeout;
            }
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("endpoint cannot be empty".to_string());
        }

        if self.app_label.is_empty() {
            return Err("app_label cannot be empty".to_string());
        }

        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }

        if self.flush_interval.is_zero() {
            return Err("flush_interval must be greater than 0".to_string());
        }

        if let Some(auth) = &self.basic_auth {
            if auth.username.is_empty() {
                return Err("basic auth username cannot be empty".to_string());
            }
            if auth.password.is_empty() {
                return Err("basic auth password must be set with username".to_string());
            }
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
