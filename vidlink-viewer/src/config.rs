//! Viewer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vidlink_core::{SecurityConfig, SignalingConfig, TransportConfig};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Peer selection.
    pub network: NetworkConfig,
    /// Rendezvous service.
    pub signaling: SignalingConfig,
    /// Transport tuning.
    pub transport: TransportConfig,
    /// Key material.
    pub security: SecurityConfig,
    /// Where the received stream is written.
    pub output: OutputConfig,
    /// Input forwarding.
    pub input: InputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Peer selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host address (`ip:port`). Empty means ask the signaling service.
    pub peer: String,
    /// Start a new session after a timeout instead of exiting.
    pub reconnect: bool,
}

/// Recording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File the ordered byte stream is appended to.
    pub path: String,
    /// Log progress every this many chunks (0 disables).
    pub progress_every: u64,
}

/// Input forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Forward pointer motion and buttons.
    pub forward_pointer: bool,
    /// Forward key presses.
    pub forward_keyboard: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            signaling: SignalingConfig::default(),
            transport: TransportConfig::default(),
            security: SecurityConfig::default(),
            output: OutputConfig::default(),
            input: InputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer: String::new(),
            reconnect: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "stream.bin".into(),
            progress_every: 500,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            forward_pointer: true,
            forward_keyboard: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The configured peer, if one is set.
    pub fn direct_peer(&self) -> Result<Option<std::net::SocketAddr>, std::net::AddrParseError> {
        let peer = self.network.peer.trim();
        if peer.is_empty() {
            return Ok(None);
        }
        peer.parse().map(Some)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("[signaling]"));
        assert!(text.contains("retransmit_timeout_ms"));
        assert!(text.contains("stream.bin"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.signaling.address, "127.0.0.1:3478");
        assert_eq!(parsed.transport.keepalive_interval_ms, 200);
        assert!(parsed.network.reconnect);
    }

    #[test]
    fn direct_peer_parsing() {
        let mut cfg = ViewerConfig::default();
        assert_eq!(cfg.direct_peer().unwrap(), None);
        cfg.network.peer = "10.1.2.3:9000".into();
        assert_eq!(cfg.direct_peer().unwrap(), Some("10.1.2.3:9000".parse().unwrap()));
        cfg.network.peer = "not an address".into();
        assert!(cfg.direct_peer().is_err());
    }
}
