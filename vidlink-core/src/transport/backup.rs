//! Backup store: the last `capacity` reliable payloads, for retransmission.
//!
//! Chunks are indexed by an absolute send counter that never wraps within a
//! session. Slot `abs % capacity` holds the payload together with the
//! counter value that wrote it, so a lookup can tell a live entry from one
//! that has since been overwritten.

use bytes::Bytes;

use crate::seq::{SEQ_SPACE, SeqNum};

/// Fixed-capacity history of sent reliable payloads.
#[derive(Debug)]
pub struct BackupStore {
    slots: Vec<Option<(u64, Bytes)>>,
}

impl BackupStore {
    /// A store whose depth equals the sequence space.
    pub fn new() -> Self {
        Self::with_capacity(SEQ_SPACE as usize)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, abs: u64) -> usize {
        (abs % self.slots.len() as u64) as usize
    }

    /// Remember the payload sent as absolute chunk `abs`.
    pub fn record(&mut self, abs: u64, payload: Bytes) {
        let slot = self.slot(abs);
        self.slots[slot] = Some((abs, payload));
    }

    /// The payload of chunk `abs`, unless its slot has been reused.
    pub fn get(&self, abs: u64) -> Option<Bytes> {
        match &self.slots[self.slot(abs)] {
            Some((stored, payload)) if *stored == abs => Some(payload.clone()),
            _ => None,
        }
    }

    /// Map a wire sequence number to the newest chunk sent under it.
    ///
    /// `sent` is the number of chunks sent so far. Returns `None` when no
    /// chunk with that number has been sent yet.
    pub fn resolve(&self, seq: SeqNum, sent: u64) -> Option<u64> {
        let space = SEQ_SPACE as u64;
        let residue = seq.value() as u64;
        if sent == 0 {
            return None;
        }
        let newest = sent - 1;
        let back = (newest % space + space - residue) % space;
        let abs = newest.checked_sub(back)?;
        self.get(abs).map(|_| abs)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
