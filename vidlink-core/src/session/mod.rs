//! Session orchestration.
//!
//! A [`Session`] owns one UDP socket and runs three loops while connected:
//!
//! 1. **receive**: decrypt, reassemble, answer control traffic, feed the
//!    decoder and display (runs on the caller's task);
//! 2. **retransmit scheduler**: resends what the peer has not confirmed;
//! 3. **keepalive**: a heartbeat every `keepalive_interval_ms`.
//!
//! Shutdown is cooperative: [`SessionHandle::stop`] clears the running
//! flag, every loop notices within one iteration, and `run` joins the
//! helpers before returning.

pub mod signaling;
pub mod state;
pub mod stats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::UdpSocket;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, trace, warn};

use crate::config::{SecurityConfig, SignalingConfig, TransportConfig};
use crate::error::{Result, VidlinkError};
use crate::input::InputEvent;
use crate::media::{Decoder, Display};
use crate::seq::SeqNum;
use crate::transport::retransmit::{PendingKey, run_scheduler};
use crate::transport::{Delivery, GapPolicy, Link, Reaction, ReassemblyRing, SlotKind};
use crate::wire::{Packet, WireCodec};

pub use state::ConnectionState;
pub use stats::{SessionStats, StatsSnapshot};

// ── SessionEnd ───────────────────────────────────────────────────

/// Why [`Session::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A stop was requested.
    Stopped,
    /// The peer stayed silent past the receive timeout.
    TimedOut,
    /// Retransmission gave up on the peer.
    PeerLost,
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::TimedOut => write!(f, "receive timeout"),
            Self::PeerLost => write!(f, "peer lost"),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One endpoint of a vidlink stream.
#[derive(Debug)]
pub struct Session {
    link: Arc<Link>,
}

impl Session {
    /// Bind the configured local address.
    pub async fn bind(transport: TransportConfig, security: SecurityConfig) -> Result<Self> {
        let socket = UdpSocket::bind(&transport.bind_address).await?;
        info!(local = %socket.local_addr()?, "session socket bound");
        Ok(Self::with_socket(socket, transport, security))
    }

    /// Wrap an already-bound socket.
    pub fn with_socket(
        socket: UdpSocket,
        transport: TransportConfig,
        security: SecurityConfig,
    ) -> Self {
        Self {
            link: Arc::new(Link::new(Arc::new(socket), transport, security)),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.link.local_addr()
    }

    /// A cloneable handle for sending and stopping from other tasks.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            link: Arc::clone(&self.link),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Learn the peer through the signaling service and await it.
    ///
    /// Must be called while no receive loop is running on this session.
    pub async fn connect(&self, signaling: &SignalingConfig) -> Result<SocketAddr> {
        if self.link.state().has_peer() {
            return Err(VidlinkError::InvalidState(
                "cannot connect: session already has a peer",
            ));
        }
        let peer = signaling::resolve_peer(self.link.socket(), signaling).await?;
        self.connect_direct(peer)?;
        Ok(peer)
    }

    /// Await a peer at a known address.
    pub fn connect_direct(&self, peer: SocketAddr) -> Result<()> {
        self.link.state.begin_connect()?;
        self.link.reset_session();
        self.link.stats.reset();
        self.link.set_peer(Some(peer));
        info!(%peer, "awaiting peer");
        Ok(())
    }

    /// Run the session until it stops, times out or loses the peer.
    ///
    /// Per-session state is cleared before returning and the session is
    /// back in `Disconnected`, ready for another `connect`.
    pub async fn run<D, P>(&self, decoder: &mut D, display: &mut P) -> Result<SessionEnd>
    where
        D: Decoder,
        P: Display<D::Frame>,
    {
        if !self.link.state().has_peer() {
            return Err(VidlinkError::InvalidState("run requires a peer; call connect first"));
        }
        let link = &self.link;
        link.set_running(true);

        let scheduler = tokio::spawn(run_scheduler(Arc::clone(link)));
        let keepalive = tokio::spawn(run_keepalive(Arc::clone(link)));

        let config = link.config().clone();
        let policy = GapPolicy {
            max_reorder_gap: config.max_reorder_gap,
            max_unordered: config.max_unordered,
            max_unordered_span: config.max_unordered_span,
        };
        let mut ring = ReassemblyRing::new(policy, config.max_batch);
        let mut framed = UdpFramed::new(Arc::clone(link.socket()), WireCodec);
        let mut deadline = Instant::now() + config.first_receive_timeout();

        let end = loop {
            if !link.is_running() {
                break SessionEnd::Stopped;
            }
            if !link.state().has_peer() {
                break SessionEnd::PeerLost;
            }

            tokio::select! {
                next = tokio::time::timeout_at(deadline.into(), framed.next()) => {
                    let (packet, from) = match next {
                        Err(_) => break SessionEnd::TimedOut,
                        Ok(None) => break SessionEnd::PeerLost,
                        Ok(Some(Err(e))) => {
                            link.stats.record_dropped();
                            debug!("dropping datagram: {e}");
                            continue;
                        }
                        Ok(Some(Ok(received))) => received,
                    };

                    if Some(from) != link.peer() {
                        trace!(%from, "ignoring datagram from unknown address");
                        continue;
                    }
                    link.stats.record_received();
                    deadline = Instant::now() + config.receive_timeout();
                    if link.state.mark_connected() {
                        info!(peer = %from, "peer connected");
                    }

                    if let Err(e) = self.dispatch(packet, &mut ring, decoder, display).await {
                        debug!("handling datagram failed: {e}");
                    }
                }
                _ = link.wait_for_stop() => {}
            }
        };

        match end {
            SessionEnd::Stopped => info!("session stopped"),
            other => warn!("session ended: {other}"),
        }
        link.state.force_disconnect();
        let _ = scheduler.await;
        let _ = keepalive.await;

        let stats = link.stats.snapshot();
        info!(
            sent = link.sent_count(),
            stranded = ring.buffered(),
            frames = stats.frames_sent,
            fills = stats.fills_sent,
            requests = stats.requests_sent,
            acks = stats.acks_received,
            delivered = stats.chunks_delivered,
            dropped = stats.packets_dropped,
            unrecoverable = stats.unrecoverable,
            "session summary"
        );

        link.reset_session();
        link.set_peer(None);
        link.set_running(false);
        Ok(end)
    }

    async fn dispatch<D, P>(
        &self,
        packet: Packet,
        ring: &mut ReassemblyRing,
        decoder: &mut D,
        display: &mut P,
    ) -> Result<()>
    where
        D: Decoder,
        P: Display<D::Frame>,
    {
        let link = &self.link;
        let (kind, seq, ciphertext) = match packet {
            Packet::Frame { seq, ciphertext } => (SlotKind::Frame, seq, ciphertext),
            Packet::Fill { seq, ciphertext } => (SlotKind::Fill, seq, ciphertext),
            Packet::Datagram { ciphertext } => {
                match link.decrypt(&ciphertext) {
                    Ok(plain) => display.on_datagram(&plain),
                    Err(e) => {
                        link.stats.record_dropped();
                        debug!("undecryptable datagram: {e}");
                    }
                }
                return Ok(());
            }
            control => return link.handle_control(&control).await,
        };

        let plain = match link.decrypt(&ciphertext) {
            Ok(plain) => Bytes::from(plain),
            Err(e) => {
                link.stats.record_dropped();
                debug!(%seq, "undecryptable chunk: {e}");
                return Ok(());
            }
        };

        let reaction = ring.on_data(kind, seq, plain);
        if reaction.duplicate {
            trace!(%seq, "duplicate chunk");
        }
        self.apply(reaction, decoder, display).await
    }

    async fn apply<D, P>(&self, reaction: Reaction, decoder: &mut D, display: &mut P) -> Result<()>
    where
        D: Decoder,
        P: Display<D::Frame>,
    {
        let link = &self.link;

        // The ring has already released these slots; they must reach the
        // decoder whatever happens to the control traffic below.
        link.stats.record_delivered(reaction.delivered.len());
        for chunk in &reaction.delivered {
            match decoder.feed(chunk) {
                Ok(frames) => frames.into_iter().for_each(|f| display.present(f)),
                Err(e) => warn!("decoder rejected chunk: {e}"),
            }
        }

        if !reaction.satisfied.is_empty() || !reaction.requested.is_empty() {
            let now = Instant::now();
            let mut pending = link.pending.lock();
            for seq in &reaction.satisfied {
                pending.remove(&PendingKey::request(*seq));
            }
            for seq in &reaction.requested {
                pending.insert(PendingKey::request(*seq), None, now);
            }
        }

        for seq in reaction.acks {
            match link.send_packet(Packet::Ack { seq }).await {
                Ok(()) => link.stats.record_ack_sent(),
                Err(e) => debug!(%seq, "ack send failed: {e}"),
            }
        }
        if !reaction.requested.is_empty() {
            debug!(count = reaction.requested.len(), "requesting retransmission");
        }
        for request in reaction.requests {
            // A lost request is re-issued by the scheduler.
            match link.send_packet(request).await {
                Ok(()) => link.stats.record_request(),
                Err(e) => debug!("retransmit request failed: {e}"),
            }
        }
        Ok(())
    }
}

// ── SessionHandle ────────────────────────────────────────────────

/// Cloneable sending and control surface of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    link: Arc<Link>,
}

impl SessionHandle {
    /// Send one reliable chunk.
    pub async fn send_reliable(&self, payload: Bytes, delivery: Delivery) -> Result<SeqNum> {
        self.link.send_reliable(payload, delivery).await
    }

    /// Send one unsequenced chunk.
    pub async fn send_unreliable(&self, payload: &[u8]) -> Result<()> {
        self.link.send_unreliable(payload).await
    }

    /// Split an encoded buffer into chunks and send them reliably.
    ///
    /// Returns the number of chunks sent.
    pub async fn send_stream(&self, data: Bytes) -> Result<usize> {
        let chunk = self.link.config().chunk_size.min(self.link.max_payload()).max(1);
        let mut sent = 0;
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + chunk).min(data.len());
            self.link
                .send_reliable(data.slice(offset..end), Delivery::GapRecovered)
                .await?;
            offset = end;
            sent += 1;
        }
        Ok(sent)
    }

    /// Forward an input event. Pointer motion goes unreliable, the rest
    /// reliable with confirmation.
    pub async fn send_input(&self, event: InputEvent) -> Result<()> {
        let bytes = event.to_bytes()?;
        if event.is_lossy() {
            self.link.send_unreliable(&bytes).await
        } else {
            self.link
                .send_reliable(Bytes::from(bytes), Delivery::Confirmed)
                .await
                .map(|_| ())
        }
    }

    /// Signal the session to stop.
    pub fn stop(&self) {
        self.link.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.link.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.link.peer()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.link.stats().snapshot()
    }
}

// ── Keepalive ────────────────────────────────────────────────────

async fn run_keepalive(link: Arc<Link>) {
    let interval = link.config().keepalive_interval();
    while link.is_active() {
        if let Err(e) = link.send_packet(Packet::Heartbeat).await {
            debug!("heartbeat failed: {e}");
        }
        tokio::time::sleep(interval).await;
    }
    trace!("keepalive exited");
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Collector, PassthroughDecoder};

    /// A session whose every send fails: an IPv4 socket aimed at an IPv6 peer.
    async fn unsendable_session() -> Session {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let session =
            Session::with_socket(socket, TransportConfig::default(), SecurityConfig::default());
        session.link.set_peer(Some("[::1]:9".parse().unwrap()));
        assert!(session.link.send_packet(Packet::Heartbeat).await.is_err());
        session
    }

    #[tokio::test]
    async fn drained_chunks_survive_failed_ack() {
        let session = unsendable_session().await;
        let mut ring = ReassemblyRing::new(GapPolicy::default(), 512);
        let mut collector = Collector::default();

        let reaction = ring.on_data(SlotKind::Fill, SeqNum::ZERO, Bytes::from_static(b"first"));
        assert_eq!(reaction.acks, vec![SeqNum::ZERO]);
        session
            .apply(reaction, &mut PassthroughDecoder, &mut collector)
            .await
            .unwrap();

        assert_eq!(collector.frames, vec![Bytes::from_static(b"first")]);
        assert_eq!(ring.cursor(), SeqNum::new(1));
        let stats = session.link.stats.snapshot();
        assert_eq!(stats.chunks_delivered, 1);
        assert_eq!(stats.acks_sent, 0);
    }

    #[tokio::test]
    async fn failed_request_stays_pending() {
        let session = unsendable_session().await;
        let mut ring = ReassemblyRing::new(GapPolicy::default(), 512);
        let mut collector = Collector::default();

        let first = ring.on_data(SlotKind::Frame, SeqNum::ZERO, Bytes::from_static(b"a"));
        session
            .apply(first, &mut PassthroughDecoder, &mut collector)
            .await
            .unwrap();
        let ahead = ring.on_data(SlotKind::Frame, SeqNum::new(20), Bytes::from_static(b"z"));
        assert!(!ahead.requests.is_empty());
        session
            .apply(ahead, &mut PassthroughDecoder, &mut collector)
            .await
            .unwrap();

        assert_eq!(collector.frames, vec![Bytes::from_static(b"a")]);
        let pending = session.link.pending.lock();
        assert!(pending.contains(&PendingKey::request(SeqNum::new(1))));
        assert!(pending.contains(&PendingKey::request(SeqNum::new(19))));
        drop(pending);
        assert_eq!(session.link.stats.snapshot().requests_sent, 0);
    }
}
