// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Loaded from a TOML file or built from defaults, then overridden by the
//! `HUB_HOST` / `HUB_PORT` environment variables and finally by CLI flags.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`BridgeConfig::hub_host`].
pub const ENV_HUB_HOST: &str = "HUB_HOST";

/// Environment variable overriding [`BridgeConfig::hub_port`].
pub const ENV_HUB_PORT: &str = "HUB_PORT";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Hub host name or address.
    #[serde(default = "default_hub_host")]
    pub hub_host: String,

    /// Hub UDP port.
    #[serde(default = "default_hub_port")]
    pub hub_port: u16,

    /// Local address for the UDP endpoint (the port is always ephemeral).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// How long a command waits for FEEDBACK (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Status poll period (milliseconds, 0 disables polling).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Modules polled for STATUS; replies are broadcast to every client.
    #[serde(default)]
    pub poll_modules: Vec<String>,

    /// WebSocket server bind address.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// WebSocket server port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Maximum concurrent WebSocket clients.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Per-client outbound queue depth.
    #[serde(default = "default_client_queue_depth")]
    pub client_queue_depth: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_hub_host() -> String {
    "192.168.8.108".to_string()
}

fn default_hub_port() -> u16 {
    12345
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_request_timeout() -> u64 {
    1500
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_max_clients() -> usize {
    100
}

fn default_client_queue_depth() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            hub_host: default_hub_host(),
            hub_port: default_hub_port(),
            bind_address: default_bind_address(),
            request_timeout_ms: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
            poll_modules: Vec::new(),
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            max_clients: default_max_clients(),
            client_queue_depth: default_client_queue_depth(),
            log_level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `HUB_HOST` / `HUB_PORT` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply hub overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HUB_HOST) {
            let host = host.trim();
            if !host.is_empty() {
                self.hub_host = host.to_string();
            }
        }
        if let Some(port) = lookup(ENV_HUB_PORT) {
            self.hub_port = port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a valid port: '{}'", ENV_HUB_PORT, port))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub_host.trim().is_empty() {
            return Err(ConfigError::Invalid("hub_host cannot be empty".into()));
        }
        if self.hub_port == 0 {
            return Err(ConfigError::Invalid("hub_port cannot be 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms cannot be 0".into(),
            ));
        }
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "bind_address '{}' is not an IP address",
                self.bind_address
            )));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients cannot be 0".into()));
        }
        if self.client_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "client_queue_depth cannot be 0".into(),
            ));
        }
        for module in &self.poll_modules {
            if module.is_empty() || module.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "poll module '{}' is not a single token",
                    module
                )));
            }
        }
        Ok(())
    }

    /// Hub endpoint as `host:port`.
    pub fn hub_endpoint(&self) -> String {
        format!("{}:{}", self.hub_host, self.hub_port)
    }

    /// WebSocket listen endpoint as `address:port`.
    pub fn listen_endpoint(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }

    /// FEEDBACK wait as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Poll period, or `None` when polling is disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        if self.poll_interval_ms == 0 || self.poll_modules.is_empty() {
            None
        } else {
            Some(Duration::from_millis(self.poll_interval_ms))
        }
    }
}
