//! Server configuration
//!
//! Loaded from an optional TOML file; every field has a default so an
//! empty file (or no file) yields a working server on 127.0.0.1:30001.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "LINE_CHAT_CONFIG";

/// Chat server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Idle window in milliseconds before a silent session is dropped.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Dropped messages tolerated before a slow client is disconnected.
    #[serde(default = "default_max_dropped_messages")]
    pub max_dropped_messages: u64,
    /// Capacity of the user event queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Longest accepted inbound line in bytes.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    30001
}

fn default_idle_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_max_dropped_messages() -> u64 {
    32
}

fn default_event_buffer() -> usize {
    256
}

fn default_max_line_length() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_ms: default_idle_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
            max_dropped_messages: default_max_dropped_messages(),
            event_buffer: default_event_buffer(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let config: Self =
            toml::from_str(s).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.idle_timeout_ms == 0 {
            return Err(AppError::Config("idle_timeout_ms must be positive".into()));
        }
        if self.outbound_buffer == 0 || self.event_buffer == 0 {
            return Err(AppError::Config("channel buffers must be positive".into()));
        }
        if self.max_line_length == 0 {
            return Err(AppError::Config("max_line_length must be positive".into()));
        }
        Ok(())
    }

    /// Override host and port from a `host:port` string.
    pub fn set_bind_addr(&mut self, addr: &str) -> Result<(), AppError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| AppError::Config(format!("expected host:port, got '{addr}'")))?;
        self.port = port
            .parse()
            .map_err(|_| AppError::Config(format!("invalid port in '{addr}'")))?;
        self.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Ok(())
    }

    /// The `host:port` string passed to the listener.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
