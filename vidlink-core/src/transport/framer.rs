//! Send framer.
//!
//! Reliable chunks get the next sequence number, a copy in the backup
//! store, and go out as `[FRAME][hi][lo] ciphertext`. Resends of stored
//! chunks go out as `[RETRANSMIT_FILL][hi][lo] ciphertext`. Unreliable
//! chunks go out as `[DATAGRAM] ciphertext` and are forgotten.

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::cipher::ciphertext_len;
use crate::error::{Result, VidlinkError};
use crate::seq::{SEQ_SPACE, SeqNum};
use crate::transport::Link;
use crate::transport::retransmit::PendingKey;
use crate::wire::{Packet, SEQ_HEADER_LEN};

/// How a reliable chunk is protected against loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resend on a timer until the peer acknowledges it.
    Confirmed,
    /// Rely on the receiver noticing the gap and asking for it.
    GapRecovered,
}

impl Link {
    /// Largest plaintext that fits one datagram.
    pub fn max_payload(&self) -> usize {
        let room = self.config().max_datagram.saturating_sub(SEQ_HEADER_LEN);
        (room / crate::cipher::BLOCK_SIZE * crate::cipher::BLOCK_SIZE).saturating_sub(1)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if SEQ_HEADER_LEN + ciphertext_len(len) > self.config().max_datagram {
            return Err(VidlinkError::PayloadTooLarge {
                size: len,
                max: self.max_payload(),
            });
        }
        Ok(())
    }

    /// Send one reliable chunk and return its sequence number.
    pub async fn send_reliable(&self, payload: Bytes, delivery: Delivery) -> Result<SeqNum> {
        self.check_size(payload.len())?;

        let (seq, abs) = {
            let mut send = self.send.lock();
            let abs = send.sent;
            send.sent += 1;
            send.backup.record(abs, payload.clone());
            (SeqNum::new((abs % SEQ_SPACE as u64) as u32), abs)
        };

        if delivery == Delivery::Confirmed {
            self.pending
                .lock()
                .insert(PendingKey::fill(seq), Some(abs), Instant::now());
        }

        let ciphertext = Bytes::from(self.encrypt(&payload));
        self.send_packet(Packet::Frame { seq, ciphertext }).await?;
        self.stats.record_frame();
        trace!(%seq, len = payload.len(), ?delivery, "frame sent");
        Ok(seq)
    }

    /// Send one chunk with no sequence number, history or retry.
    pub async fn send_unreliable(&self, payload: &[u8]) -> Result<()> {
        self.check_size(payload.len())?;
        let ciphertext = Bytes::from(self.encrypt(payload));
        self.send_packet(Packet::Datagram { ciphertext }).await?;
        self.stats.record_datagram();
        Ok(())
    }

    /// Resend absolute chunk `abs` as a fill.
    ///
    /// Returns `Ok(false)` when the chunk has left the backup store.
    pub async fn resend_abs(&self, abs: u64) -> Result<bool> {
        let payload = self.send.lock().backup.get(abs);
        let Some(payload) = payload else {
            debug!(abs, "chunk no longer in history");
            self.note_unrecoverable();
            return Ok(false);
        };

        let seq = SeqNum::new((abs % SEQ_SPACE as u64) as u32);
        let ciphertext = Bytes::from(self.encrypt(&payload));
        self.send_packet(Packet::Fill { seq, ciphertext }).await?;
        self.stats.record_fill();
        self.note_recovered();
        Ok(true)
    }

    /// Resend the newest chunk sent under `seq`.
    pub async fn resend_seq(&self, seq: SeqNum) -> Result<bool> {
        match self.resolve(seq) {
            Some(abs) => self.resend_abs(abs).await,
            None => {
                debug!(%seq, "requested chunk was never sent");
                self.note_unrecoverable();
                Ok(false)
            }
        }
    }

    pub(crate) fn resolve(&self, seq: SeqNum) -> Option<u64> {
        let send = self.send.lock();
        send.backup.resolve(seq, send.sent)
    }

    /// Number of reliable chunks sent this session.
    pub fn sent_count(&self) -> u64 {
        self.send.lock().sent
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SecurityConfig, TransportConfig};
    use crate::session::state::ConnectionState;
    use std::sync::Arc;
    use tokio::net::UdpSocket;

    async fn link_pair(config: TransportConfig) -> (Link, UdpSocket) {
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let link = Link::new(sock, config, SecurityConfig::default());
        link.set_peer(Some(peer.local_addr().unwrap()));
        link.state.set(ConnectionState::Connected);
        (link, peer)
    }

    async fn recv(sock: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; 4096];
        let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(2), sock.recv_from(&mut buf))
            .await
            .expect("timeout")
            .unwrap();
        Packet::parse(Bytes::copy_from_slice(&buf[..n])).unwrap()
    }

    #[tokio::test]
    async fn reliable_frames_are_numbered_and_encrypted() {
        let (link, peer) = link_pair(TransportConfig::default()).await;

        assert_eq!(
            link.send_reliable(Bytes::from_static(b"a"), Delivery::GapRecovered).await.unwrap(),
            SeqNum::ZERO
        );
        assert_eq!(
            link.send_reliable(Bytes::from_static(b"b"), Delivery::GapRecovered).await.unwrap(),
            SeqNum::new(1)
        );

        match recv(&peer).await {
            Packet::Frame { seq, ciphertext } => {
                assert_eq!(seq, SeqNum::ZERO);
                assert_eq!(link.decrypt(&ciphertext).unwrap(), b"a");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(link.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn confirmed_delivery_registers_pending() {
        let (link, _peer) = link_pair(TransportConfig::default()).await;
        let seq = link
            .send_reliable(Bytes::from_static(b"key"), Delivery::Confirmed)
            .await
            .unwrap();
        assert!(link.pending.lock().contains(&PendingKey::fill(seq)));
    }

    #[tokio::test]
    async fn resend_uses_fill_opcode() {
        let (link, peer) = link_pair(TransportConfig::default()).await;
        link.send_reliable(Bytes::from_static(b"x"), Delivery::GapRecovered)
            .await
            .unwrap();
        let _ = recv(&peer).await;

        assert!(link.resend_seq(SeqNum::ZERO).await.unwrap());
        match recv(&peer).await {
            Packet::Fill { seq, ciphertext } => {
                assert_eq!(seq, SeqNum::ZERO);
                assert_eq!(link.decrypt(&ciphertext).unwrap(), b"x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsent_resend_is_unrecoverable() {
        let config = TransportConfig {
            max_unrecoverable: 2,
            ..TransportConfig::default()
        };
        let (link, _peer) = link_pair(config).await;

        assert!(!link.resend_seq(SeqNum::new(7)).await.unwrap());
        assert_eq!(link.stats.snapshot().unrecoverable, 1);
        assert_eq!(link.state(), ConnectionState::Connected);

        assert!(!link.resend_seq(SeqNum::new(8)).await.unwrap());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn oversized_payload_rejected() {
        let (link, _peer) = link_pair(TransportConfig::default()).await;
        let big = Bytes::from(vec![0u8; link.max_payload() + 1]);
        assert!(matches!(
            link.send_reliable(big, Delivery::GapRecovered).await,
            Err(VidlinkError::PayloadTooLarge { .. })
        ));
        let fits = Bytes::from(vec![0u8; link.max_payload()]);
        assert!(link.send_reliable(fits, Delivery::GapRecovered).await.is_ok());
    }

    #[tokio::test]
    async fn unreliable_uses_datagram_opcode() {
        let (link, peer) = link_pair(TransportConfig::default()).await;
        link.send_unreliable(b"move").await.unwrap();
        match recv(&peer).await {
            Packet::Datagram { ciphertext } => {
                assert_eq!(link.decrypt(&ciphertext).unwrap(), b"move");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.sent_count(), 0);
    }
}
