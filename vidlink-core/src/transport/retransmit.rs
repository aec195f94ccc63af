//! Retransmission scheduling.
//!
//! [`RetransmitQueue`] is the bookkeeping: one entry per outstanding
//! reliable send or retransmit request, each with a deadline. It does no
//! I/O and takes the current time as an argument.
//!
//! [`run_scheduler`] is the loop that drives it: sleep until the nearest
//! deadline, collect what expired under the lock, then resend after the
//! lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::seq::SeqNum;
use crate::session::state::ConnectionState;
use crate::transport::Link;
use crate::transport::gap::build_requests;

// ── Keys ─────────────────────────────────────────────────────────

/// What an outstanding entry is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PendingKind {
    /// We sent chunk `seq` and wait for the peer's ACK.
    Fill,
    /// We asked the peer for chunk `seq` and wait for it to arrive.
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub kind: PendingKind,
    pub seq: SeqNum,
}

impl PendingKey {
    pub fn fill(seq: SeqNum) -> Self {
        Self {
            kind: PendingKind::Fill,
            seq,
        }
    }

    pub fn request(seq: SeqNum) -> Self {
        Self {
            kind: PendingKind::Request,
            seq,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingEntry {
    deadline: Instant,
    attempts: u32,
    /// Absolute send index backing a `Fill` entry.
    origin: Option<u64>,
}

/// An entry whose deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Due {
    pub key: PendingKey,
    pub origin: Option<u64>,
    pub attempts: u32,
}

/// Result of one [`RetransmitQueue::expire`] pass.
#[derive(Debug, Default)]
pub struct Expiry {
    /// Entries to act on now; each already carries a fresh deadline.
    pub due: Vec<Due>,
    /// Entries dropped because they hit the retry ceiling.
    pub exhausted: Vec<PendingKey>,
}

// ── RetransmitQueue ──────────────────────────────────────────────

/// Deadline map of everything awaiting confirmation.
#[derive(Debug)]
pub struct RetransmitQueue {
    entries: HashMap<PendingKey, PendingEntry>,
    timeout: Duration,
    max_retries: Option<u32>,
}

impl RetransmitQueue {
    pub fn new(timeout: Duration, max_retries: Option<u32>) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            max_retries,
        }
    }

    /// Register (or re-arm) an entry due one timeout from `now`.
    ///
    /// Re-arming keeps the attempt count so a retry ceiling still applies
    /// to entries the peer keeps asking for.
    pub fn insert(&mut self, key: PendingKey, origin: Option<u64>, now: Instant) {
        let deadline = now + self.timeout;
        self.entries
            .entry(key)
            .and_modify(|e| {
                e.deadline = deadline;
                e.origin = origin.or(e.origin);
            })
            .or_insert(PendingEntry {
                deadline,
                attempts: 0,
                origin,
            });
    }

    /// Remove an entry. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &PendingKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &PendingKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Earliest deadline, if anything is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    /// Collect every entry due at `now` and give each a fresh deadline.
    pub fn expire(&mut self, now: Instant) -> Expiry {
        let mut out = Expiry::default();
        let fresh = now + self.timeout;

        for (key, entry) in self.entries.iter_mut() {
            if entry.deadline > now {
                continue;
            }
            entry.attempts += 1;
            if self.max_retries.is_some_and(|max| entry.attempts > max) {
                out.exhausted.push(*key);
                continue;
            }
            entry.deadline = fresh;
            out.due.push(Due {
                key: *key,
                origin: entry.origin,
                attempts: entry.attempts,
            });
        }
        for key in &out.exhausted {
            self.entries.remove(key);
        }
        out
    }
}

// ── Scheduler loop ───────────────────────────────────────────────

/// Drive the link's retransmit queue until the session stops.
pub async fn run_scheduler(link: Arc<Link>) {
    let idle = link.config().idle_interval();

    while link.is_active() {
        let sleep_for = {
            let pending = link.pending.lock();
            match pending.next_deadline() {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => idle,
            }
        };
        // Bounded so a stop request is noticed promptly.
        tokio::time::sleep(sleep_for.min(idle).max(Duration::from_millis(1))).await;

        let expiry = link.pending.lock().expire(Instant::now());

        if !expiry.exhausted.is_empty() {
            warn!(
                count = expiry.exhausted.len(),
                "retry ceiling reached; dropping session"
            );
            link.state.set(ConnectionState::Disconnected);
            break;
        }
        if expiry.due.is_empty() {
            continue;
        }

        let mut requests = Vec::new();
        for due in expiry.due {
            match due.key.kind {
                PendingKind::Fill => {
                    trace!(seq = %due.key.seq, attempts = due.attempts, "ack timeout; resending");
                    let result = match due.origin {
                        Some(abs) => link.resend_abs(abs).await,
                        None => link.resend_seq(due.key.seq).await,
                    };
                    match result {
                        Ok(true) => {}
                        Ok(false) => {
                            link.pending.lock().remove(&due.key);
                        }
                        Err(e) => debug!("resend of {} failed: {e}", due.key.seq),
                    }
                }
                PendingKind::Request => requests.push(due.key.seq),
            }
        }

        if !requests.is_empty() {
            debug!(count = requests.len(), "re-issuing retransmit requests");
            for packet in build_requests(&requests, link.config().max_batch) {
                link.stats.record_request();
                if let Err(e) = link.send_packet(packet).await {
                    debug!("re-issuing request failed: {e}");
                }
            }
        }
    }
    trace!("retransmit scheduler exited");
}

// ── Tests ────────────────────────────────────────────────────────
