//! Transport, signaling and security settings.
//!
//! These are the sections a binary embeds in its own TOML file. Every
//! struct uses `#[serde(default)]` so a partial file is always valid; all
//! timings are in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the transport engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local UDP address to bind.
    pub bind_address: String,
    /// Largest plaintext chunk `send_stream` puts in one datagram.
    pub chunk_size: usize,
    /// Largest datagram this side will send, headers included.
    pub max_datagram: usize,
    /// Time before an unacknowledged send or request is repeated.
    pub retransmit_timeout_ms: u64,
    /// Scheduler sleep when nothing is pending.
    pub idle_interval_ms: u64,
    /// Heartbeat period.
    pub keepalive_interval_ms: u64,
    /// How long to wait for the first datagram of a session.
    pub first_receive_timeout_ms: u64,
    /// How long the peer may stay silent once connected.
    pub receive_timeout_ms: u64,
    /// Longest run of missing numbers that is waited out instead of requested.
    pub max_reorder_gap: u16,
    /// Size at which the set of tolerated holes is escalated.
    pub max_unordered: usize,
    /// Distance from the oldest tolerated hole at which the set is escalated.
    pub max_unordered_span: u16,
    /// Most sequence numbers carried by one batch request.
    pub max_batch: usize,
    /// Resends of one entry before the session gives up. Unbounded if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Consecutive unrecoverable resends before the session gives up.
    pub max_unrecoverable: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".into(),
            chunk_size: 1200,
            max_datagram: 2048,
            retransmit_timeout_ms: 300,
            idle_interval_ms: 300,
            keepalive_interval_ms: 200,
            first_receive_timeout_ms: 30_000,
            receive_timeout_ms: 5_000,
            max_reorder_gap: 3,
            max_unordered: 5,
            max_unordered_span: 5,
            max_batch: 512,
            max_retries: None,
            max_unrecoverable: 64,
        }
    }
}

impl TransportConfig {
    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn first_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.first_receive_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Rendezvous service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// `host:port` of the signaling service.
    pub address: String,
    /// Number of probes before giving up.
    pub attempts: u32,
    /// Wait for a reply after each probe.
    pub attempt_timeout_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3478".into(),
            attempts: 5,
            attempt_timeout_ms: 500,
        }
    }
}

impl SignalingConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Pre-shared key material.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret both peers derive the session key from.
    pub secret: String,
    /// Key derivation salt, as two 32-bit words stored little-endian.
    pub salt: [u32; 2],
    /// Hash iterations of the key derivation.
    pub key_rounds: u32,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret", &"<redacted>")
            .field("salt", &self.salt)
            .field("key_rounds", &self.key_rounds)
            .finish()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret: "2B28AB097EAEF7CF15D2154F16A6883C".into(),
            salt: [12345, 54321],
            key_rounds: 5,
        }
    }
}

impl SecurityConfig {
    /// The 8-byte salt fed to the key derivation.
    pub fn salt_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.salt[0].to_le_bytes());
        out[4..].copy_from_slice(&self.salt[1].to_le_bytes());
        out
    }
}

// ── Tests ────────────────────────────────────────────────────────
