//! obfs3 client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for an obfs3 client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obfs3Config {
    /// Bridge address (hostname or IP)
    pub server_addr: String,

    /// Bridge port
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Deadline for the obfs3 handshake in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Keep bridge addresses out of log output
    #[serde(default = "default_scrub_addrs")]
    pub scrub_addrs: bool,
}

fn default_port() -> u16 {
    443
}

fn default_timeout_ms() -> u64 {
    crate::HANDSHAKE_TIMEOUT_MS
}

fn default_scrub_addrs() -> bool {
    true
}

impl Obfs3Config {
    /// Create a new configuration with default timeouts.
    pub fn new(server_addr: impl Into<String>, server_port: u16) -> Self {
        Self {
            server_addr: server_addr.into(),
            server_port,
            connect_timeout_ms: default_timeout_ms(),
            handshake_timeout_ms: default_timeout_ms(),
            scrub_addrs: default_scrub_addrs(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::config(format!("invalid JSON: {}", e)))?;
        config.validate().map_err(Error::config)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.server_addr.is_empty() {
            return Err("server_addr cannot be empty".to_string());
        }
        if self.server_port == 0 {
            return Err("server_port cannot be 0".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be positive".to_string());
        }
        if self.handshake_timeout_ms == 0 {
            return Err("handshake_timeout_ms must be positive".to_string());
        }
        Ok(())
    }

    /// TCP connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Bridge address as it should appear in logs.
    pub fn display_addr(&self) -> String {
        if self.scrub_addrs {
            "[scrubbed]".to_string()
        } else {
            format!("{}:{}", self.server_addr, self.server_port)
        }
    }
}
