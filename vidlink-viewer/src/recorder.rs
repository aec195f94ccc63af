//! Writes the received stream to a file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info, warn};
use vidlink_core::Display;

/// A [`Display`] that appends every delivered chunk to a file.
#[derive(Debug)]
pub struct Recorder {
    out: BufWriter<File>,
    chunks: u64,
    bytes: u64,
    datagrams: u64,
    progress_every: u64,
    failed: bool,
}

impl Recorder {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path, progress_every: u64) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        info!(path = %path.display(), "recording stream");
        Ok(Self {
            out: BufWriter::new(file),
            chunks: 0,
            bytes: 0,
            datagrams: 0,
            progress_every,
            failed: false,
        })
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn datagrams(&self) -> u64 {
        self.datagrams
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

impl Display<Bytes> for Recorder {
    fn present(&mut self, chunk: Bytes) {
        if self.failed {
            return;
        }
        if let Err(e) = self.out.write_all(&chunk) {
            warn!("recording failed, dropping further output: {e}");
            self.failed = true;
            return;
        }
        self.chunks += 1;
        self.bytes += chunk.len() as u64;
        if self.progress_every > 0 && self.chunks % self.progress_every == 0 {
            info!(chunks = self.chunks, bytes = self.bytes, "recording progress");
        }
    }

    fn on_datagram(&mut self, payload: &[u8]) {
        self.datagrams += 1;
        debug!(len = payload.len(), "unsequenced payload");
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

// ── Tests ────────────────────────────────────────────────────────
