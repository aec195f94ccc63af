//! Receive-side reassembly ring.
//!
//! Decrypted chunks land in slot `seq` of a ring the size of the sequence
//! space. A read cursor hands contiguous runs to the decoder and resets
//! each slot it consumes. The ring is owned by the receive loop; every call
//! returns a [`Reaction`] describing the I/O the caller must perform.

use bytes::Bytes;
use tracing::trace;

use crate::seq::{SEQ_SPACE, SeqNum};
use crate::transport::gap::{GapDetector, GapPolicy, build_requests};
use crate::wire::Packet;

/// How a chunk reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// First transmission.
    Frame,
    /// Retransmission.
    Fill,
}

#[derive(Debug, Clone)]
struct InboundSlot {
    payload: Bytes,
    kind: SlotKind,
}

/// Work produced by one arrival.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Sequence numbers to acknowledge.
    pub acks: Vec<SeqNum>,
    /// Retransmit requests to send.
    pub requests: Vec<Packet>,
    /// Numbers just requested; each needs a pending entry.
    pub requested: Vec<SeqNum>,
    /// Previously requested numbers that have now arrived.
    pub satisfied: Vec<SeqNum>,
    /// Payloads ready for the decoder, in order.
    pub delivered: Vec<Bytes>,
    /// The arrival was already received or already consumed.
    pub duplicate: bool,
}

/// Ordered delivery buffer with gap tracking.
#[derive(Debug)]
pub struct ReassemblyRing {
    slots: Vec<Option<InboundSlot>>,
    requested: Vec<bool>,
    cursor: SeqNum,
    gaps: GapDetector,
    max_batch: usize,
}

impl ReassemblyRing {
    pub fn new(policy: GapPolicy, max_batch: usize) -> Self {
        Self {
            slots: vec![None; SEQ_SPACE as usize],
            requested: vec![false; SEQ_SPACE as usize],
            cursor: SeqNum::ZERO,
            gaps: GapDetector::new(policy),
            max_batch,
        }
    }

    /// Next sequence number to be delivered.
    pub fn cursor(&self) -> SeqNum {
        self.cursor
    }

    /// Holes currently being waited out.
    pub fn unordered(&self) -> &[SeqNum] {
        self.gaps.unordered()
    }

    #[cfg(test)]
    pub(crate) fn is_requested(&self, seq: SeqNum) -> bool {
        self.requested[seq.index()]
    }

    /// Number of received chunks waiting behind a hole.
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Back to a fresh session.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.requested.iter_mut().for_each(|r| *r = false);
        self.cursor = SeqNum::ZERO;
        self.gaps.reset();
    }

    /// Accept one decrypted chunk.
    pub fn on_data(&mut self, kind: SlotKind, seq: SeqNum, payload: Bytes) -> Reaction {
        let mut reaction = Reaction::default();
        let idx = seq.index();

        if kind == SlotKind::Fill || self.requested[idx] {
            if self.requested[idx] {
                self.requested[idx] = false;
                reaction.satisfied.push(seq);
            }
            reaction.acks.push(seq);
        }

        if seq.compare(self.cursor).is_lt() || self.slots[idx].is_some() {
            reaction.duplicate = true;
            return reaction;
        }

        self.slots[idx] = Some(InboundSlot { payload, kind });

        let slots = &self.slots;
        let requested = &self.requested;
        let missing = |s: SeqNum| slots[s.index()].is_none() && !requested[s.index()];
        let escalate = self.gaps.observe(kind, seq, self.cursor, missing);

        if !escalate.is_empty() {
            for s in &escalate {
                self.requested[s.index()] = true;
            }
            reaction.requests = build_requests(&escalate, self.max_batch);
            reaction.requested = escalate;
        }

        self.drain(&mut reaction.delivered);
        reaction
    }

    fn drain(&mut self, out: &mut Vec<Bytes>) {
        while let Some(slot) = self.slots[self.cursor.index()].take() {
            self.requested[self.cursor.index()] = false;
            trace!(seq = %self.cursor, kind = ?slot.kind, "delivering chunk");
            out.push(slot.payload);
            self.cursor = self.cursor.next();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: u32) -> SeqNum {
        SeqNum::new(v)
    }

    fn p(v: u32) -> Bytes {
        Bytes::from(v.to_be_bytes().to_vec())
    }

    fn ring() -> ReassemblyRing {
        ReassemblyRing::new(GapPolicy::default(), 512)
    }

    #[test]
    fn in_order_delivers_immediately() {
        let mut r = ring();
        for v in 0..4 {
            let out = r.on_data(SlotKind::Frame, s(v), p(v));
            assert_eq!(out.delivered, vec![p(v)]);
            assert!(out.acks.is_empty());
        }
        assert_eq!(r.cursor(), s(4));
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn late_arrival_drains_run_in_one_pass() {
        let mut r = ring();
        assert_eq!(r.on_data(SlotKind::Frame, s(0), p(0)).delivered, vec![p(0)]);
        assert_eq!(r.on_data(SlotKind::Frame, s(1), p(1)).delivered, vec![p(1)]);

        let out = r.on_data(SlotKind::Frame, s(3), p(3));
        assert!(out.delivered.is_empty());
        assert!(out.requests.is_empty());
        let out = r.on_data(SlotKind::Frame, s(4), p(4));
        assert!(out.delivered.is_empty());
        assert!(out.requests.is_empty());

        let out = r.on_data(SlotKind::Frame, s(2), p(2));
        assert_eq!(out.delivered, vec![p(2), p(3), p(4)]);
        assert!(r.unordered().is_empty());
    }

    #[test]
    fn any_interleaving_drains_in_order() {
        let orders: [&[u32]; 4] = [
            &[3, 1, 0, 2, 4, 5],
            &[5, 4, 3, 2, 1, 0],
            &[1, 0, 3, 2, 5, 4],
            &[0, 2, 1, 5, 3, 4],
        ];
        for order in orders {
            let mut r = ring();
            let mut got = Vec::new();
            for &v in order {
                got.extend(r.on_data(SlotKind::Fill, s(v), p(v)).delivered);
            }
            let want: Vec<Bytes> = (0..6).map(p).collect();
            assert_eq!(got, want, "order {order:?}");
        }
    }

    #[test]
    fn large_gap_requests_range() {
        let mut r = ring();
        r.on_data(SlotKind::Frame, s(0), p(0));
        let out = r.on_data(SlotKind::Frame, s(21), p(21));
        assert_eq!(
            out.requests,
            vec![Packet::RangeRequest { start: s(1), end: s(21) }]
        );
        assert_eq!(out.requested.len(), 20);
        assert!(r.is_requested(s(1)));
        assert!(r.is_requested(s(20)));
    }

    #[test]
    fn small_gap_waits() {
        let mut r = ring();
        r.on_data(SlotKind::Frame, s(0), p(0));
        let out = r.on_data(SlotKind::Frame, s(3), p(3));
        assert!(out.requests.is_empty());
        assert_eq!(r.unordered(), &[s(1), s(2)]);
    }

    #[test]
    fn requested_arrival_is_acked_and_satisfied() {
        let mut r = ring();
        r.on_data(SlotKind::Frame, s(0), p(0));
        r.on_data(SlotKind::Frame, s(10), p(10));
        assert!(r.is_requested(s(5)));

        let out = r.on_data(SlotKind::Frame, s(5), p(5));
        assert_eq!(out.acks, vec![s(5)]);
        assert_eq!(out.satisfied, vec![s(5)]);
        assert!(!r.is_requested(s(5)));
    }

    #[test]
    fn fills_are_always_acked_even_when_duplicate() {
        let mut r = ring();
        r.on_data(SlotKind::Frame, s(0), p(0));
        let out = r.on_data(SlotKind::Fill, s(0), p(0));
        assert!(out.duplicate);
        assert_eq!(out.acks, vec![s(0)]);
        assert!(out.delivered.is_empty());
    }

    #[test]
    fn duplicates_ahead_of_cursor_are_ignored() {
        let mut r = ring();
        r.on_data(SlotKind::Frame, s(2), p(2));
        let out = r.on_data(SlotKind::Frame, s(2), p(99));
        assert!(out.duplicate);
        let out = r.on_data(SlotKind::Frame, s(0), p(0));
        assert_eq!(out.delivered, vec![p(0)]);
        let out = r.on_data(SlotKind::Frame, s(1), p(1));
        assert_eq!(out.delivered, vec![p(1), p(2)]);
    }

    #[test]
    fn wraps_around_the_space() {
        let mut r = ring();
        let n = SEQ_SPACE as u32;
        let mut count = 0;
        for v in 0..n + 10 {
            count += r.on_data(SlotKind::Frame, s(v), p(v)).delivered.len();
        }
        assert_eq!(count, (n + 10) as usize);
        assert_eq!(r.cursor(), s(10));
    }

    #[test]
    fn reset_clears_everything() {
        let mut r = ring();
        r.on_data(SlotKind::Frame, s(0), p(0));
        r.on_data(SlotKind::Frame, s(30), p(30));
        r.reset();
        assert_eq!(r.cursor(), SeqNum::ZERO);
        assert_eq!(r.buffered(), 0);
        assert!(!r.is_requested(s(5)));
        assert_eq!(r.on_data(SlotKind::Frame, s(0), p(0)).delivered, vec![p(0)]);
    }
}
