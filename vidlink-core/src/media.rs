//! Collaborator seams.
//!
//! The session hands every in-order chunk to a [`Decoder`] and every
//! decoded unit to a [`Display`]. Video codecs and renderers plug in here;
//! the crate ships a byte passthrough and an input-event decoder.

use bytes::Bytes;

use crate::error::DecodeError;
use crate::input::InputEvent;

/// Turns the ordered chunk stream into presentable units.
pub trait Decoder {
    type Frame;

    /// Feed one chunk. May yield zero or more frames.
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Self::Frame>, DecodeError>;
}

/// Consumes decoded units.
pub trait Display<F> {
    fn present(&mut self, frame: F);

    /// An unsequenced chunk arrived. Ignored unless overridden.
    fn on_datagram(&mut self, _payload: &[u8]) {}
}

// ── PassthroughDecoder ───────────────────────────────────────────

/// Yields each chunk unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDecoder;

impl Decoder for PassthroughDecoder {
    type Frame = Bytes;

    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, DecodeError> {
        Ok(vec![Bytes::copy_from_slice(chunk)])
    }
}

// ── InputDecoder ─────────────────────────────────────────────────

/// Decodes each chunk as one [`InputEvent`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InputDecoder;

impl Decoder for InputDecoder {
    type Frame = InputEvent;

    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<InputEvent>, DecodeError> {
        if chunk.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(vec![InputEvent::from_bytes(chunk)?])
    }
}

/// Collects everything it is shown. Handy in tests and tools.
#[derive(Debug)]
pub struct Collector<F> {
    pub frames: Vec<F>,
    pub datagrams: Vec<Bytes>,
}

impl<F> Default for Collector<F> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            datagrams: Vec::new(),
        }
    }
}

impl<F> Display<F> for Collector<F> {
    fn present(&mut self, frame: F) {
        self.frames.push(frame);
    }

    fn on_datagram(&mut self, payload: &[u8]) {
        self.datagrams.push(Bytes::copy_from_slice(payload));
    }
}
