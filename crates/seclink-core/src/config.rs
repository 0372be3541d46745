//! Channel configuration.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. JSON file (optional)
//! 3. Environment variables (`SECLINK_*`)
//!
//! None of these settings change the wire format; both peers only have to
//! agree on the compiled-in frame constants.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::frame::MAX_PLAINTEXT_SIZE;

/// Tunables for endpoints, dialers, and listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Split writes into frames of at most this many bytes. `None` rejects
    /// writes larger than one frame instead.
    pub chunk_size: Option<usize>,
    /// Read timeout applied to TCP sockets while exchanging keys.
    pub handshake_timeout_ms: Option<u64>,
    /// Read and write timeout applied to TCP sockets after the handshake.
    pub io_timeout_ms: Option<u64>,
    /// Disable Nagle's algorithm on TCP sockets.
    pub nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            chunk_size: None,
            handshake_timeout_ms: Some(10_000),
            io_timeout_ms: None,
            nodelay: true,
        }
    }
}

impl ChannelConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.chunk_size {
            if size == 0 || size > MAX_PLAINTEXT_SIZE {
                return Err(Error::Config(format!(
                    "chunk_size must be between 1 and {MAX_PLAINTEXT_SIZE}, got {size}"
                )));
            }
        }
        if self.handshake_timeout_ms == Some(0) {
            return Err(Error::Config("handshake_timeout_ms must be positive".into()));
        }
        if self.io_timeout_ms == Some(0) {
            return Err(Error::Config("io_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a JSON config file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Apply `SECLINK_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// `SECLINK_CHUNK_SIZE=0` disables chunking. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = parse_var::<usize>(&lookup, "SECLINK_CHUNK_SIZE") {
            self.chunk_size = (n != 0).then_some(n);
        }
        if let Some(n) = parse_var(&lookup, "SECLINK_HANDSHAKE_TIMEOUT_MS") {
            self.handshake_timeout_ms = Some(n);
        }
        if let Some(n) = parse_var(&lookup, "SECLINK_IO_TIMEOUT_MS") {
            self.io_timeout_ms = Some(n);
        }
        if let Some(b) = parse_var(&lookup, "SECLINK_NODELAY") {
            self.nodelay = b;
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}

/// Load configuration: defaults, then `path` if given, then the environment.
pub fn load_config(path: Option<&Path>) -> Result<ChannelConfig> {
    let mut config = match path {
        Some(p) => ChannelConfig::from_json_file(p)?,
        None => ChannelConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
