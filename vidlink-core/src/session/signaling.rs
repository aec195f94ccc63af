//! Peer discovery through the signaling service.
//!
//! The client sends a short probe from the session socket, so the service
//! observes the same public mapping the peer will use, and waits for a
//! reply of the form `"<ip>:<port>"`, optionally NUL-terminated.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::SignalingConfig;
use crate::error::{Result, VidlinkError};

/// Probe sent to the signaling service.
pub const PROBE: &[u8] = b"0\0";

/// Ask the signaling service for the peer's address.
pub async fn resolve_peer(socket: &UdpSocket, config: &SignalingConfig) -> Result<SocketAddr> {
    let server = tokio::net::lookup_host(&config.address)
        .await?
        .next()
        .ok_or_else(|| VidlinkError::Signaling(format!("cannot resolve {}", config.address)))?;

    let attempts = config.attempts.max(1);
    for attempt in 1..=attempts {
        socket.send_to(PROBE, server).await?;
        debug!(%server, attempt, "signaling probe sent");

        match tokio::time::timeout(config.attempt_timeout(), recv_reply(socket, server)).await {
            Ok(reply) => {
                let peer = reply?;
                info!(%peer, "peer address received");
                return Ok(peer);
            }
            Err(_) => debug!(attempt, "no signaling reply"),
        }
    }

    Err(VidlinkError::Timeout(config.attempt_timeout() * attempts))
}

async fn recv_reply(socket: &UdpSocket, server: SocketAddr) -> Result<SocketAddr> {
    let mut buf = [0u8; 128];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        if from != server {
            debug!(%from, "ignoring datagram from non-signaling address");
            continue;
        }
        return parse_reply(&buf[..n]);
    }
}

/// Parse a `"<ip>:<port>"` reply.
pub fn parse_reply(reply: &[u8]) -> Result<SocketAddr> {
    let text = std::str::from_utf8(reply)
        .map_err(|_| VidlinkError::Signaling("reply is not UTF-8".into()))?;
    let text = text.trim_end_matches('\0').trim();
    text.parse()
        .map_err(|_| VidlinkError::Signaling(format!("bad peer address: {text:?}")))
}
