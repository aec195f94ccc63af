//! Error types for the vidlink transport.
//!
//! Fallible operations return `Result<T, VidlinkError>`. Nothing in the
//! transport panics on hostile input: malformed datagrams become typed
//! errors that the receive loop logs and drops.

use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VidlinkError>;

/// The canonical error type for the vidlink transport.
#[derive(Debug, Error)]
pub enum VidlinkError {
    // ── Wire Errors ──────────────────────────────────────────────
    /// The first byte of a datagram is not a known opcode.
    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    /// A datagram is shorter than its opcode requires.
    #[error("truncated datagram: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A sequence number's high byte is outside the sequence space.
    #[error("sequence number out of range: {high}:{low}")]
    SequenceOutOfRange { high: u8, low: u8 },

    /// A payload exceeds the configured datagram size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Crypto Errors ────────────────────────────────────────────
    /// Ciphertext length is not a multiple of the block size.
    #[error("ciphertext length {0} is not a multiple of the block size")]
    MisalignedCiphertext(usize),

    /// Padding check failed after decryption.
    #[error("ciphertext failed the padding check")]
    BadPadding,

    // ── Session Errors ───────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The signaling service replied with something unusable.
    #[error("signaling failed: {0}")]
    Signaling(String),

    /// An operation was attempted in the wrong connection state.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    /// Encoding or decoding of a structured payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A collaborator failed to decode the ordered stream.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

// ── DecodeError ───────────────────────────────────────────────────

/// Failure reported by a [`Decoder`](crate::media::Decoder).
///
/// The transport logs these and keeps draining; a broken chunk never
/// stalls delivery of the chunks behind it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte stream is not valid for this decoder.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// The decoder needs more data than it was given.
    #[error("unexpected end of data")]
    UnexpectedEof,
}

impl From<Box<bincode::ErrorKind>> for VidlinkError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        VidlinkError::Encoding(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for DecodeError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}
