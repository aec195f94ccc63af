//! Control protocol handler: ACKs, retransmit requests and heartbeats
//! arriving from the peer.

use std::time::Instant;

use tracing::{debug, trace};

use crate::error::Result;
use crate::seq::{HALF_SPACE, SeqNum};
use crate::transport::Link;
use crate::transport::retransmit::PendingKey;
use crate::wire::Packet;

impl Link {
    /// Act on one control packet. Data packets are ignored here.
    pub async fn handle_control(&self, packet: &Packet) -> Result<()> {
        match packet {
            Packet::Ack { seq } => {
                let removed = self.pending.lock().remove(&PendingKey::fill(*seq));
                self.stats.record_ack_received();
                trace!(%seq, removed, "ack");
            }
            Packet::RangeRequest { start, end } => {
                let span = start.distance_to(*end);
                if span > HALF_SPACE {
                    debug!(%start, %end, "ignoring range request wider than the ordering horizon");
                    return Ok(());
                }
                debug!(%start, %end, "range retransmit requested");
                for seq in start.range_to(*end) {
                    self.serve_request(seq).await?;
                }
            }
            Packet::BatchRequest { seqs } => {
                debug!(count = seqs.len(), "batch retransmit requested");
                for &seq in seqs {
                    self.serve_request(seq).await?;
                }
            }
            Packet::Heartbeat => trace!("heartbeat"),
            Packet::Frame { .. } | Packet::Fill { .. } | Packet::Datagram { .. } => {}
        }
        Ok(())
    }

    /// Resend `seq` as a fill and wait for the peer to confirm it.
    async fn serve_request(&self, seq: SeqNum) -> Result<()> {
        let Some(abs) = self.resolve(seq) else {
            debug!(%seq, "requested chunk was never sent");
            self.note_unrecoverable();
            return Ok(());
        };
        if self.resend_abs(abs).await? {
            self.pending
                .lock()
                .insert(PendingKey::fill(seq), Some(abs), Instant::now());
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SecurityConfig, TransportConfig};
    use crate::session::state::ConnectionState;
    use crate::transport::Delivery;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn link_with_history(n: u32) -> (Link, UdpSocket) {
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let link = Link::new(sock, TransportConfig::default(), SecurityConfig::default());
        link.set_peer(Some(peer.local_addr().unwrap()));
        link.state.set(ConnectionState::Connected);
        for i in 0..n {
            link.send_reliable(Bytes::from(vec![i as u8; 4]), Delivery::GapRecovered)
                .await
                .unwrap();
        }
        (link, peer)
    }

    async fn drain_fills(sock: &UdpSocket) -> Vec<SeqNum> {
        let mut buf = vec![0u8; 4096];
        let mut out = Vec::new();
        while let Ok(Ok((n, _))) =
            tokio::time::timeout(Duration::from_millis(200), sock.recv_from(&mut buf)).await
        {
            if let Ok(Packet::Fill { seq, .. }) = Packet::parse(Bytes::copy_from_slice(&buf[..n])) {
                out.push(seq);
            }
        }
        out
    }

    #[tokio::test]
    async fn ack_removes_pending_and_is_idempotent() {
        let (link, _peer) = link_with_history(0).await;
        let seq = link
            .send_reliable(Bytes::from_static(b"k"), Delivery::Confirmed)
            .await
            .unwrap();
        assert_eq!(link.pending.lock().len(), 1);

        let ack = Packet::Ack { seq };
        link.handle_control(&ack).await.unwrap();
        assert!(link.pending.lock().is_empty());
        link.handle_control(&ack).await.unwrap();
        link.handle_control(&ack).await.unwrap();
        assert!(link.pending.lock().is_empty());
        assert_eq!(link.stats.snapshot().acks_received, 3);
    }

    #[tokio::test]
    async fn range_request_resends_each_and_registers_pending() {
        let (link, peer) = link_with_history(6).await;
        let _ = drain_fills(&peer).await;

        let req = Packet::RangeRequest {
            start: SeqNum::new(2),
            end: SeqNum::new(5),
        };
        link.handle_control(&req).await.unwrap();

        let fills = drain_fills(&peer).await;
        assert_eq!(fills, vec![SeqNum::new(2), SeqNum::new(3), SeqNum::new(4)]);
        for v in 2..5 {
            assert!(link.pending.lock().contains(&PendingKey::fill(SeqNum::new(v))));
        }
    }

    #[tokio::test]
    async fn batch_request_skips_unknown() {
        let (link, peer) = link_with_history(3).await;
        let _ = drain_fills(&peer).await;

        let req = Packet::BatchRequest {
            seqs: vec![SeqNum::new(0), SeqNum::new(2), SeqNum::new(40)],
        };
        link.handle_control(&req).await.unwrap();

        let fills = drain_fills(&peer).await;
        assert_eq!(fills, vec![SeqNum::new(0), SeqNum::new(2)]);
        assert_eq!(link.stats.snapshot().unrecoverable, 1);
        assert_eq!(link.pending.lock().len(), 2);
    }

    #[tokio::test]
    async fn heartbeat_is_inert() {
        let (link, _peer) = link_with_history(1).await;
        link.handle_control(&Packet::Heartbeat).await.unwrap();
        assert!(link.pending.lock().is_empty());
    }
}
