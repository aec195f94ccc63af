//! Wire format and datagram codec.
//!
//! Every datagram starts with a one-byte opcode:
//!
//! ```text
//! 0  FRAME                     [hi][lo] ciphertext
//! 1  RETRANSMIT_FILL           [hi][lo] ciphertext
//! 2  DATAGRAM                  ciphertext
//! 3  RANGE_RETRANSMIT_REQUEST  [startHi][startLo][endHi][endLo]
//! 4  ACK                       [hi][lo]
//! 5  BATCH_RETRANSMIT_REQUEST  ([hi][lo])*
//! 6  HEARTBEAT
//! ```
//!
//! Sequence numbers are validated here; ciphertext is carried opaque and
//! decrypted by the session.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::VidlinkError;
use crate::seq::SeqNum;

// ── Opcodes ──────────────────────────────────────────────────────

pub const OP_FRAME: u8 = 0;
pub const OP_FILL: u8 = 1;
pub const OP_DATAGRAM: u8 = 2;
pub const OP_RANGE_REQUEST: u8 = 3;
pub const OP_ACK: u8 = 4;
pub const OP_BATCH_REQUEST: u8 = 5;
pub const OP_HEARTBEAT: u8 = 6;

/// Opcode plus two sequence bytes.
pub const SEQ_HEADER_LEN: usize = 3;

// ── Packet ───────────────────────────────────────────────────────

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A reliable chunk sent for the first time.
    Frame { seq: SeqNum, ciphertext: Bytes },
    /// A reliable chunk resent on request or timeout.
    Fill { seq: SeqNum, ciphertext: Bytes },
    /// An unsequenced chunk.
    Datagram { ciphertext: Bytes },
    /// Ask for every chunk in `[start, end)`.
    RangeRequest { start: SeqNum, end: SeqNum },
    /// Confirm receipt of one chunk.
    Ack { seq: SeqNum },
    /// Ask for each listed chunk.
    BatchRequest { seqs: Vec<SeqNum> },
    /// Liveness only.
    Heartbeat,
}

impl Packet {
    pub fn opcode(&self) -> u8 {
        match self {
            Packet::Frame { .. } => OP_FRAME,
            Packet::Fill { .. } => OP_FILL,
            Packet::Datagram { .. } => OP_DATAGRAM,
            Packet::RangeRequest { .. } => OP_RANGE_REQUEST,
            Packet::Ack { .. } => OP_ACK,
            Packet::BatchRequest { .. } => OP_BATCH_REQUEST,
            Packet::Heartbeat => OP_HEARTBEAT,
        }
    }

    /// Human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Frame { .. } => "FRAME",
            Packet::Fill { .. } => "RETRANSMIT_FILL",
            Packet::Datagram { .. } => "DATAGRAM",
            Packet::RangeRequest { .. } => "RANGE_RETRANSMIT_REQUEST",
            Packet::Ack { .. } => "ACK",
            Packet::BatchRequest { .. } => "BATCH_RETRANSMIT_REQUEST",
            Packet::Heartbeat => "HEARTBEAT",
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    fn encoded_len(&self) -> usize {
        match self {
            Packet::Frame { ciphertext, .. } | Packet::Fill { ciphertext, .. } => {
                SEQ_HEADER_LEN + ciphertext.len()
            }
            Packet::Datagram { ciphertext } => 1 + ciphertext.len(),
            Packet::RangeRequest { .. } => 5,
            Packet::Ack { .. } => SEQ_HEADER_LEN,
            Packet::BatchRequest { seqs } => 1 + 2 * seqs.len(),
            Packet::Heartbeat => 1,
        }
    }

    fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.opcode());
        match self {
            Packet::Frame { seq, ciphertext } | Packet::Fill { seq, ciphertext } => {
                dst.put_slice(&seq.to_wire());
                dst.put_slice(ciphertext);
            }
            Packet::Datagram { ciphertext } => dst.put_slice(ciphertext),
            Packet::RangeRequest { start, end } => {
                dst.put_slice(&start.to_wire());
                dst.put_slice(&end.to_wire());
            }
            Packet::Ack { seq } => dst.put_slice(&seq.to_wire()),
            Packet::BatchRequest { seqs } => {
                for seq in seqs {
                    dst.put_slice(&seq.to_wire());
                }
            }
            Packet::Heartbeat => {}
        }
    }

    /// Parse one complete datagram.
    pub fn parse(mut datagram: Bytes) -> Result<Packet, VidlinkError> {
        let total = datagram.len();
        if total == 0 {
            return Err(VidlinkError::Truncated {
                expected: 1,
                actual: 0,
            });
        }
        let opcode = datagram.get_u8();

        let need = |n: usize| -> Result<(), VidlinkError> {
            if total < n {
                Err(VidlinkError::Truncated {
                    expected: n,
                    actual: total,
                })
            } else {
                Ok(())
            }
        };

        match opcode {
            OP_FRAME | OP_FILL => {
                need(SEQ_HEADER_LEN)?;
                let seq = read_seq(&mut datagram)?;
                let ciphertext = datagram;
                Ok(if opcode == OP_FRAME {
                    Packet::Frame { seq, ciphertext }
                } else {
                    Packet::Fill { seq, ciphertext }
                })
            }
            OP_DATAGRAM => Ok(Packet::Datagram {
                ciphertext: datagram,
            }),
            OP_RANGE_REQUEST => {
                need(5)?;
                let start = read_seq(&mut datagram)?;
                let end = read_seq(&mut datagram)?;
                Ok(Packet::RangeRequest { start, end })
            }
            OP_ACK => {
                need(SEQ_HEADER_LEN)?;
                Ok(Packet::Ack {
                    seq: read_seq(&mut datagram)?,
                })
            }
            OP_BATCH_REQUEST => {
                if datagram.len() % 2 != 0 {
                    return Err(VidlinkError::Truncated {
                        expected: total + 1,
                        actual: total,
                    });
                }
                let mut seqs = Vec::with_capacity(datagram.len() / 2);
                while datagram.has_remaining() {
                    seqs.push(read_seq(&mut datagram)?);
                }
                Ok(Packet::BatchRequest { seqs })
            }
            OP_HEARTBEAT => Ok(Packet::Heartbeat),
            other => Err(VidlinkError::UnknownOpcode(other)),
        }
    }
}

fn read_seq(buf: &mut Bytes) -> Result<SeqNum, VidlinkError> {
    let high = buf.get_u8();
    let low = buf.get_u8();
    SeqNum::from_wire(high, low)
}

// ── WireCodec ────────────────────────────────────────────────────

/// Datagram codec for use with `UdpFramed`.
///
/// Each call to `decode` consumes the whole buffer, which always holds
/// exactly one datagram, so a malformed datagram never poisons the next.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireCodec;

impl tokio_util::codec::Decoder for WireCodec {
    type Item = Packet;
    type Error = VidlinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let datagram = src.split_to(src.len()).freeze();
        Packet::parse(datagram).map(Some)
    }
}

impl tokio_util::codec::Encoder<Packet> for WireCodec {
    type Error = VidlinkError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
