//! Circular sequence space.
//!
//! Reliable chunks are numbered in `[0, SEQ_SPACE)` and the counter wraps.
//! On the wire a number travels as two bytes, `high = n / 256` and
//! `low = n % 256`, with `high < HIGH_SPAN`.
//!
//! Ordering between two numbers is only meaningful while they are at most
//! half the space apart; [`SeqNum::compare`] relies on that to decide which
//! side of a wraparound each value sits on.

use std::cmp::Ordering;
use std::fmt;

use crate::error::VidlinkError;

/// Number of distinct values the high byte may take.
pub const HIGH_SPAN: u16 = 60;

/// Size of the sequence space.
pub const SEQ_SPACE: u16 = HIGH_SPAN * 256;

/// Half the sequence space; the ordering horizon.
pub const HALF_SPACE: u16 = SEQ_SPACE / 2;

/// A position in the circular sequence space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqNum(u16);

impl SeqNum {
    /// The first sequence number of a session.
    pub const ZERO: SeqNum = SeqNum(0);

    /// Wrap an arbitrary integer into the space.
    pub fn new(value: u32) -> Self {
        Self((value % SEQ_SPACE as u32) as u16)
    }

    /// Decode the two-byte wire form.
    pub fn from_wire(high: u8, low: u8) -> Result<Self, VidlinkError> {
        if u16::from(high) >= HIGH_SPAN {
            return Err(VidlinkError::SequenceOutOfRange { high, low });
        }
        Ok(Self(u16::from(high) * 256 + u16::from(low)))
    }

    /// Encode as `[high, low]`.
    pub fn to_wire(self) -> [u8; 2] {
        [(self.0 / 256) as u8, (self.0 % 256) as u8]
    }

    /// Raw value in `[0, SEQ_SPACE)`.
    pub fn value(self) -> u16 {
        self.0
    }

    /// Slot index for rings sized to the sequence space.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The following sequence number, wrapping at the end of the space.
    pub fn next(self) -> Self {
        self.add(1)
    }

    /// The preceding sequence number, wrapping at zero.
    pub fn prev(self) -> Self {
        Self((self.0 + SEQ_SPACE - 1) % SEQ_SPACE)
    }

    /// Advance by `n` positions.
    pub fn add(self, n: u16) -> Self {
        Self(((self.0 as u32 + n as u32) % SEQ_SPACE as u32) as u16)
    }

    /// Forward distance from `self` to `other`, in `[0, SEQ_SPACE)`.
    pub fn distance_to(self, other: SeqNum) -> u16 {
        (other.0 + SEQ_SPACE - self.0) % SEQ_SPACE
    }

    /// Shortest circular distance between the two numbers.
    pub fn circular_distance(self, other: SeqNum) -> u16 {
        let forward = self.distance_to(other);
        forward.min(SEQ_SPACE - forward)
    }

    /// Wraparound-aware ordering.
    ///
    /// The numerically smaller value is earlier unless the gap between the
    /// two exceeds half the space, in which case the larger one is earlier.
    /// A gap of exactly half the space keeps the numeric order.
    pub fn compare(self, other: SeqNum) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        let earlier = (self.0 < other.0 && other.0 - self.0 <= HALF_SPACE)
            || (self.0 > other.0 && self.0 - other.0 > HALF_SPACE);
        if earlier {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }

    /// `true` when `self` comes strictly after `other`.
    pub fn is_after(self, other: SeqNum) -> bool {
        self.compare(other) == Ordering::Greater
    }

    /// Iterate `[self, end)` in circular order.
    pub fn range_to(self, end: SeqNum) -> impl Iterator<Item = SeqNum> {
        let start = self;
        (0..self.distance_to(end)).map(move |i| start.add(i))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
