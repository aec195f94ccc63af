//! Gap detection.
//!
//! Small holes in the arrival order are usually reordering and fill
//! themselves; large ones are loss. [`GapDetector`] tracks the small holes
//! in an unordered set and tells the caller which sequence numbers to
//! request from the peer.

use crate::seq::SeqNum;
use crate::transport::reassembly::SlotKind;
use crate::wire::Packet;

/// Thresholds for tolerating out-of-order arrival.
#[derive(Debug, Clone, Copy)]
pub struct GapPolicy {
    /// Longest run of missing numbers tolerated without a request.
    pub max_reorder_gap: u16,
    /// Tolerated holes that trigger escalation of the whole set.
    pub max_unordered: usize,
    /// Distance from the oldest tolerated hole that triggers escalation.
    pub max_unordered_span: u16,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            max_reorder_gap: 3,
            max_unordered: 5,
            max_unordered_span: 5,
        }
    }
}

/// Tracks the highest sequence seen and the holes behind it.
#[derive(Debug)]
pub struct GapDetector {
    policy: GapPolicy,
    /// Highest sequence number received so far.
    prev: Option<SeqNum>,
    /// Holes being waited out, in discovery order.
    unordered: Vec<SeqNum>,
}

impl GapDetector {
    pub fn new(policy: GapPolicy) -> Self {
        Self {
            policy,
            prev: None,
            unordered: Vec::new(),
        }
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.prev = None;
        self.unordered.clear();
    }

    #[cfg(test)]
    pub(crate) fn highest(&self) -> Option<SeqNum> {
        self.prev
    }

    pub fn unordered(&self) -> &[SeqNum] {
        &self.unordered
    }

    /// Stop waiting for `seq`. Returns whether it was being waited for.
    pub fn forget(&mut self, seq: SeqNum) -> bool {
        match self.unordered.iter().position(|&s| s == seq) {
            Some(pos) => {
                self.unordered.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Account for the arrival of `seq` and return the numbers to request.
    ///
    /// `cursor` is the next number the reader will deliver. `missing` says
    /// whether a number is neither received nor already requested.
    pub fn observe(
        &mut self,
        kind: SlotKind,
        seq: SeqNum,
        cursor: SeqNum,
        missing: impl Fn(SeqNum) -> bool,
    ) -> Vec<SeqNum> {
        let was_tracked = self.forget(seq);
        let mut escalate = Vec::new();

        if kind == SlotKind::Frame && !was_tracked {
            let expected = self.prev.map_or(cursor, SeqNum::next);
            if seq.is_after(expected) {
                let holes: Vec<SeqNum> = expected.range_to(seq).filter(|&s| missing(s)).collect();
                if holes.len() <= self.policy.max_reorder_gap as usize {
                    self.unordered.extend(holes);
                } else {
                    escalate.extend(holes);
                }
            }
        }

        if let Some(oldest) = self.oldest() {
            let span = oldest.distance_to(seq);
            let too_many = self.unordered.len() >= self.policy.max_unordered;
            let too_far = seq.is_after(oldest) && span > self.policy.max_unordered_span;
            if too_many || too_far {
                escalate.extend(self.unordered.drain(..).filter(|&s| missing(s)));
            }
        }

        if self.prev.is_none_or(|p| seq.is_after(p)) {
            self.prev = Some(seq);
        }

        escalate.sort_by(|a, b| a.compare(*b));
        escalate.dedup();
        escalate
    }

    fn oldest(&self) -> Option<SeqNum> {
        self.unordered
            .iter()
            .copied()
            .min_by(|a, b| a.compare(*b))
    }
}

/// Build retransmit requests for `seqs` (sorted, circular order).
///
/// A contiguous run becomes one range request; anything else becomes batch
/// requests of at most `max_batch` numbers each.
pub fn build_requests(seqs: &[SeqNum], max_batch: usize) -> Vec<Packet> {
    let Some((&first, rest)) = seqs.split_first() else {
        return Vec::new();
    };
    let contiguous = rest
        .iter()
        .try_fold(first, |prev, &s| (prev.next() == s).then_some(s))
        .is_some();

    if contiguous {
        let end = first.add(seqs.len() as u16);
        return vec![Packet::RangeRequest { start: first, end }];
    }

    seqs.chunks(max_batch.max(1))
        .map(|chunk| Packet::BatchRequest {
            seqs: chunk.to_vec(),
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn s(v: u32) -> SeqNum {
        SeqNum::new(v)
    }

    /// Feed frames in order, treating everything not yet seen as missing.
    fn feed(det: &mut GapDetector, seen: &mut HashSet<SeqNum>, v: u32) -> Vec<SeqNum> {
        let seq = s(v);
        seen.insert(seq);
        let snapshot = seen.clone();
        det.observe(SlotKind::Frame, seq, SeqNum::ZERO, move |x| !snapshot.contains(&x))
    }

    #[test]
    fn small_gap_waits() {
        let mut det = GapDetector::new(GapPolicy::default());
        let mut seen = HashSet::new();
        assert!(feed(&mut det, &mut seen, 0).is_empty());
        assert!(feed(&mut det, &mut seen, 3).is_empty());
        assert_eq!(det.unordered(), &[s(1), s(2)]);
    }

    #[test]
    fn large_gap_escalates() {
        let mut det = GapDetector::new(GapPolicy::default());
        let mut seen = HashSet::new();
        feed(&mut det, &mut seen, 0);
        let req = feed(&mut det, &mut seen, 21);
        assert_eq!(req.len(), 20);
        assert_eq!(req[0], s(1));
        assert_eq!(req[19], s(20));
        assert!(det.unordered().is_empty());
    }

    #[test]
    fn late_arrival_is_forgotten() {
        let mut det = GapDetector::new(GapPolicy::default());
        let mut seen = HashSet::new();
        feed(&mut det, &mut seen, 0);
        feed(&mut det, &mut seen, 2);
        assert_eq!(det.unordered(), &[s(1)]);
        assert!(feed(&mut det, &mut seen, 1).is_empty());
        assert!(det.unordered().is_empty());
        assert_eq!(det.highest(), Some(s(2)));
    }

    #[test]
    fn span_threshold_escalates_set() {
        let mut det = GapDetector::new(GapPolicy::default());
        let mut seen = HashSet::new();
        feed(&mut det, &mut seen, 0);
        feed(&mut det, &mut seen, 2);
        for v in 3..=6 {
            assert!(feed(&mut det, &mut seen, v).is_empty(), "at {v}");
        }
        // 1 → 7 spans 6 > 5.
        assert_eq!(feed(&mut det, &mut seen, 7), vec![s(1)]);
        assert!(det.unordered().is_empty());
    }

    #[test]
    fn size_threshold_escalates_set() {
        let policy = GapPolicy {
            max_unordered_span: 100,
            ..GapPolicy::default()
        };
        let mut det = GapDetector::new(policy);
        let mut seen = HashSet::new();
        feed(&mut det, &mut seen, 0);
        feed(&mut det, &mut seen, 2);
        feed(&mut det, &mut seen, 4);
        feed(&mut det, &mut seen, 6);
        feed(&mut det, &mut seen, 8);
        assert_eq!(det.unordered().len(), 4);
        let req = feed(&mut det, &mut seen, 10);
        assert_eq!(req, vec![s(1), s(3), s(5), s(7), s(9)]);
    }

    #[test]
    fn fills_do_not_open_gaps() {
        let mut det = GapDetector::new(GapPolicy::default());
        let out = det.observe(SlotKind::Fill, s(40), SeqNum::ZERO, |_| true);
        assert!(out.is_empty());
        assert!(det.unordered().is_empty());
    }

    #[test]
    fn gap_across_wrap() {
        let mut det = GapDetector::new(GapPolicy::default());
        let last = SeqNum::ZERO.prev();
        det.observe(SlotKind::Frame, last, last, |_| false);
        let out = det.observe(SlotKind::Frame, s(1), last, |x| x == SeqNum::ZERO);
        assert!(out.is_empty());
        assert_eq!(det.unordered(), &[SeqNum::ZERO]);
    }

    #[test]
    fn requests_range_when_contiguous() {
        let seqs: Vec<SeqNum> = (5..9).map(s).collect();
        assert_eq!(
            build_requests(&seqs, 512),
            vec![Packet::RangeRequest { start: s(5), end: s(9) }]
        );
    }

    #[test]
    fn requests_batch_when_scattered() {
        let seqs = vec![s(1), s(3), s(4), s(8)];
        assert_eq!(
            build_requests(&seqs, 3),
            vec![
                Packet::BatchRequest { seqs: vec![s(1), s(3), s(4)] },
                Packet::BatchRequest { seqs: vec![s(8)] },
            ]
        );
        assert!(build_requests(&[], 3).is_empty());
    }
}
