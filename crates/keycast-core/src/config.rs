use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{KeycastError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024; // inbound frames are discarded, keep them small
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000; // write deadline for one send or close attempt

/// Top-level config (keycast.toml + KEYCAST_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeycastConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Per-connection limits and registry housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    /// Largest inbound frame accepted before the transport fails the read.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Upper bound on a single outbound send or close handshake.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Close connections that stay silent this long. Absent disables it.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// Drop a key's group as soon as its last member leaves.
    #[serde(default = "bool_true")]
    pub evict_empty_groups: bool,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            idle_timeout_secs: None,
            evict_empty_groups: true,
        }
    }
}

impl ConnectionsConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Reject values that would make every connection fail immediately.
    pub fn validate(&self) -> Result<()> {
        if self.max_message_bytes == 0 {
            return Err(KeycastError::InvalidSetting {
                field: "connections.max_message_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.send_timeout_ms == 0 {
            return Err(KeycastError::InvalidSetting {
                field: "connections.send_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(KeycastError::InvalidSetting {
                field: "connections.idle_timeout_secs",
                reason: "omit the setting to disable the idle timeout".to_string(),
            });
        }
        Ok(())
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}
fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}

impl KeycastConfig {
    /// Load config from a TOML file with KEYCAST_* env var overrides.
    ///
    /// Without an explicit path, `~/.keycast/keycast.toml` is used. A missing
    /// file is not an error; every field has a default.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `KEYCAST_CONNECTIONS__SEND_TIMEOUT_MS=2000`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: KeycastConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("KEYCAST_").split("__"))
            .extract()
            .map_err(|e| KeycastError::Config(e.to_string()))?;

        config.connections.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.keycast/keycast.toml", home)
}
