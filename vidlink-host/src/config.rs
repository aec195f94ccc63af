//! Configuration for the streaming host.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vidlink_core::{SecurityConfig, SignalingConfig, TransportConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Peer selection.
    pub network: NetworkConfig,
    /// Rendezvous service.
    pub signaling: SignalingConfig,
    /// Transport tuning.
    pub transport: TransportConfig,
    /// Key material.
    pub security: SecurityConfig,
    /// What is streamed and how fast.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Viewer address (`ip:port`). Empty means ask the signaling service.
    pub peer: String,
    /// Wait for the next viewer after a session ends.
    pub reconnect: bool,
}

/// Stream source and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Encoded media file to stream.
    pub source: String,
    /// Bytes handed to the transport per frame.
    pub frame_bytes: usize,
    /// Target frames per second.
    pub fps: u32,
    /// Start over at end of file.
    pub loop_source: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            signaling: SignalingConfig::default(),
            transport: TransportConfig::default(),
            security: SecurityConfig::default(),
            stream: StreamConfig::default(),
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

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source: "stream.h264".into(),
            frame_bytes: 16 * 1024,
            fps: 30,
            loop_source: false,
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

impl HostConfig {
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

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, text)
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

impl StreamConfig {
    /// Time budget for one frame.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

// ── Tests ────────────────────────────────────────────────────────
