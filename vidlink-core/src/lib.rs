//! # vidlink-core
//!
//! Reliable, encrypted transport for streaming encoded video and input
//! events between two endpoints over UDP.
//!
//! This crate contains:
//! - **Sequence space**: `SeqNum`, circular arithmetic and wraparound ordering
//! - **Cipher**: `Cipher`, per-payload AES-128-CBC with an OpenSSL-derived key
//! - **Wire**: `Packet` and `WireCodec` for `UdpFramed` I/O via `tokio_util`
//! - **Transport**: backup store, send framer, retransmission scheduler,
//!   reassembly ring, gap detector and control handler
//! - **Session**: `Session` / `SessionHandle`, connection state, signaling
//!   and statistics
//! - **Media**: `Decoder` / `Display` seams plus `InputEvent`
//! - **Error**: `VidlinkError`, typed and `thiserror`-based

pub mod cipher;
pub mod config;
pub mod error;
pub mod input;
pub mod media;
pub mod seq;
pub mod session;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use cipher::Cipher;
pub use config::{SecurityConfig, SignalingConfig, TransportConfig};
pub use error::{DecodeError, Result, VidlinkError};
pub use input::{InputEvent, PointerButton};
pub use media::{Collector, Decoder, Display, InputDecoder, PassthroughDecoder};
pub use seq::{SEQ_SPACE, SeqNum};
pub use session::{ConnectionState, Session, SessionEnd, SessionHandle, StatsSnapshot};
pub use transport::{BackupStore, Delivery, GapPolicy, ReassemblyRing, RetransmitQueue};
pub use wire::{Packet, WireCodec};
