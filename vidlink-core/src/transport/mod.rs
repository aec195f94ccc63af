//! The transport engine.
//!
//! | Module       | Purpose                                              |
//! |------------- |------------------------------------------------------|
//! | `backup`     | History of sent reliable chunks                      |
//! | `framer`     | Sequence allocation, framing, encryption, sending    |
//! | `retransmit` | Deadline map of unconfirmed traffic and its loop     |
//! | `reassembly` | Receive ring with ordered drain                      |
//! | `gap`        | Reorder tolerance and retransmit request building    |
//! | `control`    | ACK, retransmit requests and heartbeats from the peer|
//!
//! [`Link`] is the state every session loop shares: the socket, the peer
//! address, the cipher, the send history and the retransmit queue. Each
//! structure sits behind its own lock and no lock is held across I/O.

pub mod backup;
pub mod control;
pub mod framer;
pub mod gap;
pub mod reassembly;
pub mod retransmit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::cipher::Cipher;
use crate::config::{SecurityConfig, TransportConfig};
use crate::error::{Result, VidlinkError};
use crate::session::state::{ConnectionState, StateCell};
use crate::session::stats::SessionStats;
use crate::wire::Packet;

pub use backup::BackupStore;
pub use framer::Delivery;
pub use gap::{GapDetector, GapPolicy};
pub use reassembly::{Reaction, ReassemblyRing, SlotKind};
pub use retransmit::{PendingKey, PendingKind, RetransmitQueue};

// ── SendState ────────────────────────────────────────────────────

/// Sequence allocation and history, updated together under one lock.
#[derive(Debug, Default)]
pub(crate) struct SendState {
    /// Reliable chunks sent this session; the next absolute index.
    pub(crate) sent: u64,
    pub(crate) backup: BackupStore,
}

// ── Link ─────────────────────────────────────────────────────────

/// Shared per-session transport state.
pub struct Link {
    socket: Arc<UdpSocket>,
    config: TransportConfig,
    security: SecurityConfig,
    peer: Mutex<Option<SocketAddr>>,
    cipher: RwLock<Cipher>,
    pub(crate) send: Mutex<SendState>,
    pub(crate) pending: Mutex<RetransmitQueue>,
    pub(crate) state: StateCell,
    pub(crate) stats: SessionStats,
    running: AtomicBool,
    unrecoverable_streak: AtomicU32,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("peer", &*self.peer.lock())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl Link {
    pub fn new(socket: Arc<UdpSocket>, config: TransportConfig, security: SecurityConfig) -> Self {
        let cipher = Cipher::from_config(&security);
        let pending = RetransmitQueue::new(config.retransmit_timeout(), config.max_retries);
        Self {
            socket,
            config,
            security,
            peer: Mutex::new(None),
            cipher: RwLock::new(cipher),
            send: Mutex::new(SendState::default()),
            pending: Mutex::new(pending),
            state: StateCell::new(),
            stats: SessionStats::default(),
            running: AtomicBool::new(false),
            unrecoverable_streak: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock()
    }

    pub(crate) fn set_peer(&self, peer: Option<SocketAddr>) {
        *self.peer.lock() = peer;
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    // ── Lifecycle flags ──────────────────────────────────────────

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Running and attached to a peer.
    pub fn is_active(&self) -> bool {
        self.is_running() && self.state.get().has_peer()
    }

    /// Resolve once the session stops or loses its peer.
    pub(crate) async fn wait_for_stop(&self) {
        while self.is_active() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Clear per-session structures and re-derive the cipher.
    pub(crate) fn reset_session(&self) {
        {
            let mut send = self.send.lock();
            send.sent = 0;
            send.backup.clear();
        }
        self.pending.lock().clear();
        *self.cipher.write() = Cipher::from_config(&self.security);
        self.unrecoverable_streak.store(0, Ordering::SeqCst);
    }

    // ── Crypto ───────────────────────────────────────────────────

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.cipher.read().encrypt(plaintext)
    }

    pub(crate) fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher.read().decrypt(ciphertext)
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Encode and send one packet to the peer.
    pub async fn send_packet(&self, packet: Packet) -> Result<()> {
        let peer = self
            .peer()
            .ok_or(VidlinkError::InvalidState("no peer address"))?;
        let bytes = packet.to_bytes();
        trace!(op = packet.name(), len = bytes.len(), %peer, "send");
        self.socket.send_to(&bytes, peer).await?;
        Ok(())
    }

    /// Note a resend that could not be served from history.
    ///
    /// Too many in a row means the peer is asking for data we no longer
    /// have, and the session is dropped.
    pub(crate) fn note_unrecoverable(&self) {
        self.stats.record_unrecoverable();
        let streak = self.unrecoverable_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= self.config.max_unrecoverable {
            tracing::warn!(streak, "too many unrecoverable resends; dropping session");
            self.state.set(ConnectionState::Disconnected);
        }
    }

    pub(crate) fn note_recovered(&self) {
        self.unrecoverable_streak.store(0, Ordering::SeqCst);
    }
}
