//! vidlink host: entry point.
//!
//! ```text
//! vidlink-host                      Stream with defaults
//! vidlink-host --config <path>      Load a custom config TOML
//! vidlink-host --source <file>      Stream this file (overrides config)
//! vidlink-host --init               Write default config to --config and exit
//! vidlink-host --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vidlink_core::{InputDecoder, Session, SessionEnd};

use vidlink_host::config::HostConfig;
use vidlink_host::streamer::{InputLog, Streamer};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vidlink-host", about = "vidlink streaming host")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vidlink-host.toml")]
    config: PathBuf,

    /// Media file to stream (overrides config).
    #[arg(short, long)]
    source: Option<String>,

    /// Viewer address (overrides config). Skips signaling.
    #[arg(short, long)]
    peer: Option<String>,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    init: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.init {
        HostConfig::write_default(&cli.config)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = HostConfig::load(&cli.config);
    if let Some(source) = cli.source {
        config.stream.source = source;
    }
    if let Some(peer) = cli.peer {
        config.network.peer = peer;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vidlink-host v{}", env!("CARGO_PKG_VERSION"));
    info!("source: {}", config.stream.source);
    info!("target FPS: {}", config.stream.fps);
    info!("frame size: {} bytes", config.stream.frame_bytes);

    let direct_peer = config.direct_peer()?;
    let session = Session::bind(config.transport.clone(), config.security.clone()).await?;
    let handle = session.handle();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
            stop.store(true, Ordering::SeqCst);
            handle.stop();
        });
    }

    while !stop.load(Ordering::SeqCst) {
        let connected = match direct_peer {
            Some(peer) => session.connect_direct(peer).map(|()| peer),
            None => session.connect(&config.signaling).await,
        };
        let peer = match connected {
            Ok(peer) => peer,
            Err(e) if config.network.reconnect => {
                warn!("connect failed: {e}; retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        info!(%peer, "viewer assigned");

        // The source is re-read per session so an updated file is picked up.
        let streamer = match Streamer::open(config.stream.clone(), handle.clone()).await {
            Ok(s) => s,
            Err(e) => {
                error!("cannot open {}: {e}", config.stream.source);
                return Err(e.into());
            }
        };
        let pump = tokio::spawn(async move { streamer.run().await });

        let mut input = InputLog::default();
        let end = session.run(&mut InputDecoder, &mut input).await?;
        let summary = pump.await?;
        info!(
            frames = summary.frames,
            bytes = summary.bytes,
            input_events = input.events,
            "session with {peer} ended: {end}"
        );

        if end == SessionEnd::Stopped || !config.network.reconnect {
            break;
        }
    }

    info!("vidlink-host stopped");
    Ok(())
}
