//! Connection lifecycle.
//!
//! ```text
//!  Disconnected ──connect──► AwaitingPeer ──first datagram──► Connected
//!       ▲                          │                              │
//!       └──────── timeout / close / unrecoverable loss ───────────┘
//! ```
//!
//! The state is shared by all session loops, so it lives in an atomic
//! [`StateCell`] rather than behind a lock.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::VidlinkError;

// ── ConnectionState ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No peer. Initial and terminal state.
    #[default]
    Disconnected = 0,
    /// Peer address known; nothing received from it yet.
    AwaitingPeer = 1,
    /// Traffic has arrived from the peer.
    Connected = 2,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::AwaitingPeer => write!(f, "AwaitingPeer"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::AwaitingPeer,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    /// A peer address is known and heartbeats should flow.
    pub fn has_peer(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

// ── StateCell ────────────────────────────────────────────────────

/// Atomic holder for a [`ConnectionState`] with validated transitions.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Unconditional store.
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// `Disconnected → AwaitingPeer`.
    pub fn begin_connect(&self) -> Result<(), VidlinkError> {
        self.transition(
            ConnectionState::Disconnected,
            ConnectionState::AwaitingPeer,
            "cannot connect: session already has a peer",
        )
    }

    /// `AwaitingPeer → Connected`. Returns `true` if this call made the
    /// transition.
    pub fn mark_connected(&self) -> bool {
        self.transition(
            ConnectionState::AwaitingPeer,
            ConnectionState::Connected,
            "not awaiting a peer",
        )
        .is_ok()
    }

    /// Force `Disconnected`, returning the state it replaced.
    pub fn force_disconnect(&self) -> ConnectionState {
        ConnectionState::from_u8(
            self.0
                .swap(ConnectionState::Disconnected as u8, Ordering::SeqCst),
        )
    }

    fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
        msg: &'static str,
    ) -> Result<(), VidlinkError> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| VidlinkError::InvalidState(msg))
    }
}

// ── Tests ────────────────────────────────────────────────────────
