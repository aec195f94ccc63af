//! Host-side media pump and input sink.
//!
//! [`Streamer`] reads an encoded file and hands it to the session one
//! frame at a time, pacing to the configured rate. [`InputLog`] is the
//! display for the viewer's input events.

use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};
use vidlink_core::{ConnectionState, Display, InputEvent, SessionHandle};

use crate::config::StreamConfig;

/// What one streaming run sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: u64,
    pub chunks: u64,
    pub bytes: u64,
}

// ── Streamer ─────────────────────────────────────────────────────

/// Paces an encoded buffer into a session.
pub struct Streamer {
    config: StreamConfig,
    handle: SessionHandle,
    data: Bytes,
}

impl Streamer {
    /// Load the configured source file.
    pub async fn open(config: StreamConfig, handle: SessionHandle) -> std::io::Result<Self> {
        let data = tokio::fs::read(Path::new(&config.source)).await?;
        info!(source = %config.source, bytes = data.len(), "stream source loaded");
        Ok(Self::from_bytes(config, handle, Bytes::from(data)))
    }

    /// Stream an in-memory buffer.
    pub fn from_bytes(config: StreamConfig, handle: SessionHandle, data: Bytes) -> Self {
        Self {
            config,
            handle,
            data,
        }
    }

    /// Wait for the viewer, then stream until the source is exhausted or
    /// the session ends.
    pub async fn run(&self) -> StreamSummary {
        let mut summary = StreamSummary::default();
        if !self.wait_for_viewer().await {
            debug!("session ended before the viewer showed up");
            return summary;
        }
        if self.data.is_empty() {
            warn!("stream source is empty");
            return summary;
        }

        let frame = self.config.frame_bytes.max(1);
        let interval = self.config.frame_interval();
        let mut offset = 0;

        while self.handle.state() == ConnectionState::Connected {
            if offset >= self.data.len() {
                if !self.config.loop_source {
                    break;
                }
                debug!("source exhausted, looping");
                offset = 0;
            }

            let loop_start = Instant::now();
            let end = (offset + frame).min(self.data.len());
            match self.handle.send_stream(self.data.slice(offset..end)).await {
                Ok(chunks) => {
                    summary.frames += 1;
                    summary.chunks += chunks as u64;
                    summary.bytes += (end - offset) as u64;
                }
                Err(e) => {
                    warn!("send failed: {e}");
                    break;
                }
            }
            offset = end;

            Self::pace(loop_start, interval).await;
        }

        info!(
            frames = summary.frames,
            chunks = summary.chunks,
            bytes = summary.bytes,
            "streaming finished"
        );
        summary
    }

    /// Block until the peer is connected. Returns `false` if the session
    /// left the awaiting state any other way.
    async fn wait_for_viewer(&self) -> bool {
        loop {
            match self.handle.state() {
                ConnectionState::Connected => return true,
                ConnectionState::Disconnected => return false,
                ConnectionState::AwaitingPeer => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Sleep for whatever remains of the frame budget.
    async fn pace(loop_start: Instant, interval: Duration) {
        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }
}

// ── InputLog ─────────────────────────────────────────────────────

/// Logs the viewer's input and remembers the pointer position.
#[derive(Debug, Default)]
pub struct InputLog {
    pub events: u64,
    pub rejected: u64,
    pub pointer: Option<(f32, f32)>,
}

impl InputLog {
    fn apply(&mut self, event: InputEvent) {
        self.events += 1;
        match event {
            InputEvent::PointerMove { x, y } => {
                self.pointer = Some((x, y));
                debug!(x, y, "pointer");
            }
            other => info!(event = ?other, "input"),
        }
    }
}

impl Display<InputEvent> for InputLog {
    fn present(&mut self, event: InputEvent) {
        self.apply(event);
    }

    fn on_datagram(&mut self, payload: &[u8]) {
        match InputEvent::from_bytes(payload) {
            Ok(event) => self.apply(event),
            Err(e) => {
                self.rejected += 1;
                warn!("bad input datagram: {e}");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use vidlink_core::{
        Collector, InputDecoder, PassthroughDecoder, PointerButton, SecurityConfig, Session,
        SessionEnd, TransportConfig,
    };

    fn transport() -> TransportConfig {
        TransportConfig {
            bind_address: "127.0.0.1:0".into(),
            chunk_size: 100,
            first_receive_timeout_ms: 5_000,
            receive_timeout_ms: 2_000,
            ..TransportConfig::default()
        }
    }

    async fn pair() -> (Session, Session) {
        let host = Session::bind(transport(), SecurityConfig::default()).await.unwrap();
        let viewer = Session::bind(transport(), SecurityConfig::default()).await.unwrap();
        host.connect_direct(viewer.local_addr().unwrap()).unwrap();
        viewer.connect_direct(host.local_addr().unwrap()).unwrap();
        (host, viewer)
    }

    #[test]
    fn input_log_tracks_pointer_and_rejects_garbage() {
        let mut log = InputLog::default();
        log.present(InputEvent::KeyDown(65));
        log.on_datagram(&InputEvent::pointer(0.25, 0.75).to_bytes().unwrap());
        log.on_datagram(&[0xff]);
        assert_eq!(log.events, 2);
        assert_eq!(log.rejected, 1);
        assert_eq!(log.pointer, Some((0.25, 0.75)));
    }

    #[tokio::test]
    async fn streams_whole_file_in_order() {
        let (host, viewer) = pair().await;
        let data: Vec<u8> = (0..2_500u32).map(|i| (i % 251) as u8).collect();
        let config = StreamConfig {
            source: String::new(),
            frame_bytes: 1_000,
            fps: 100,
            loop_source: false,
        };

        let host_handle = host.handle();
        let viewer_handle = viewer.handle();
        let host_task = tokio::spawn(async move {
            let mut log = InputLog::default();
            host.run(&mut InputDecoder, &mut log).await
        });
        let viewer_task = tokio::spawn(async move {
            let mut collector = Collector::default();
            let end = viewer.run(&mut PassthroughDecoder, &mut collector).await;
            (end, collector)
        });

        let streamer = Streamer::from_bytes(config, host_handle.clone(), Bytes::from(data.clone()));
        let summary = tokio::time::timeout(Duration::from_secs(5), streamer.run())
            .await
            .expect("timeout");
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.chunks, 25);
        assert_eq!(summary.bytes, 2_500);

        tokio::time::sleep(Duration::from_millis(300)).await;
        viewer_handle.stop();
        host_handle.stop();
        let (end, collector) = tokio::time::timeout(Duration::from_secs(5), viewer_task)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(end.unwrap(), SessionEnd::Stopped);
        let received: Vec<u8> = collector.frames.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(received, data);

        let _ = tokio::time::timeout(Duration::from_secs(5), host_task)
            .await
            .expect("timeout");
    }

    #[tokio::test]
    async fn returns_empty_when_viewer_never_appears() {
        let config = TransportConfig {
            first_receive_timeout_ms: 200,
            ..transport()
        };
        let host = Session::bind(config, SecurityConfig::default()).await.unwrap();
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        host.connect_direct(silent.local_addr().unwrap()).unwrap();

        let streamer =
            Streamer::from_bytes(StreamConfig::default(), host.handle(), Bytes::from_static(b"x"));
        let host_task = tokio::spawn(async move {
            let mut log = InputLog::default();
            host.run(&mut InputDecoder, &mut log).await
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), streamer.run())
            .await
            .expect("timeout");
        assert_eq!(summary, StreamSummary::default());
        let end = tokio::time::timeout(Duration::from_secs(5), host_task)
            .await
            .expect("timeout")
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::TimedOut);
    }

    #[test]
    fn buttons_are_logged_as_events() {
        let mut log = InputLog::default();
        log.present(InputEvent::ButtonDown(PointerButton::Left));
        log.present(InputEvent::ButtonUp(PointerButton::Left));
        assert_eq!(log.events, 2);
        assert_eq!(log.pointer, None);
    }
}
