//! Per-session traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by every session loop.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_sent: AtomicU64,
    fills_sent: AtomicU64,
    datagrams_sent: AtomicU64,
    requests_sent: AtomicU64,
    acks_sent: AtomicU64,
    acks_received: AtomicU64,
    packets_received: AtomicU64,
    packets_dropped: AtomicU64,
    chunks_delivered: AtomicU64,
    unrecoverable: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub fills_sent: u64,
    pub datagrams_sent: u64,
    pub requests_sent: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub chunks_delivered: u64,
    pub unrecoverable: u64,
}

macro_rules! counter {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $method(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl SessionStats {
    counter! {
        record_frame => frames_sent,
        record_fill => fills_sent,
        record_datagram => datagrams_sent,
        record_request => requests_sent,
        record_ack_sent => acks_sent,
        record_ack_received => acks_received,
        record_received => packets_received,
        record_dropped => packets_dropped,
        record_unrecoverable => unrecoverable,
    }

    pub fn record_delivered(&self, n: usize) {
        self.chunks_delivered.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_sent: load(&self.frames_sent),
            fills_sent: load(&self.fills_sent),
            datagrams_sent: load(&self.datagrams_sent),
            requests_sent: load(&self.requests_sent),
            acks_sent: load(&self.acks_sent),
            acks_received: load(&self.acks_received),
            packets_received: load(&self.packets_received),
            packets_dropped: load(&self.packets_dropped),
            chunks_delivered: load(&self.chunks_delivered),
            unrecoverable: load(&self.unrecoverable),
        }
    }

    /// Zero every counter; called when a new session begins.
    pub fn reset(&self) {
        for c in [
            &self.frames_sent,
            &self.fills_sent,
            &self.datagrams_sent,
            &self.requests_sent,
            &self.acks_sent,
            &self.acks_received,
            &self.packets_received,
            &self.packets_dropped,
            &self.chunks_delivered,
            &self.unrecoverable,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_resets() {
        let stats = SessionStats::default();
        stats.record_frame();
        stats.record_frame();
        stats.record_fill();
        stats.record_delivered(3);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.fills_sent, 1);
        assert_eq!(snap.chunks_delivered, 3);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
