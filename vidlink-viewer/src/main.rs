//! vidlink viewer: entry point.
//!
//! ```text
//! vidlink-viewer                     Connect with defaults
//! vidlink-viewer --config <path>     Use custom config TOML
//! vidlink-viewer --peer <ip:port>    Skip signaling and await this host
//! vidlink-viewer --gen-config        Dump default config and exit
//! ```
//!
//! Input commands are read from stdin, one per line (see `input`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use vidlink_core::{PassthroughDecoder, Session, SessionEnd, SessionHandle};

use vidlink_viewer::config::{InputConfig, ViewerConfig};
use vidlink_viewer::input::{is_forwarded, parse_command};
use vidlink_viewer::recorder::Recorder;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vidlink-viewer", about = "vidlink stream viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vidlink-viewer.toml")]
    config: PathBuf,

    /// Host address (overrides config). Example: 192.168.1.100:7332
    #[arg(short, long)]
    peer: Option<String>,

    /// Output file (overrides config).
    #[arg(short, long)]
    output: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(peer) = cli.peer {
        config.network.peer = peer;
    }
    if let Some(output) = cli.output {
        config.output.path = output;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vidlink-viewer v{}", env!("CARGO_PKG_VERSION"));

    let direct_peer = config.direct_peer()?;
    let session = Session::bind(config.transport.clone(), config.security.clone()).await?;
    let handle = session.handle();
    let mut recorder = Recorder::create(Path::new(&config.output.path), config.output.progress_every)?;

    // Ctrl-C ends the current session and suppresses reconnects.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, stopping...");
            shutdown.store(true, Ordering::SeqCst);
            handle.stop();
        });
    }

    tokio::spawn(forward_input(handle.clone(), config.input.clone()));

    while !shutdown.load(Ordering::SeqCst) {
        // ── 1. Find the host ───────────────────────────────────

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
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        info!(%peer, "streaming from host");

        // ── 2. Receive until the session ends ──────────────────

        let end = session.run(&mut PassthroughDecoder, &mut recorder).await?;
        if let Err(e) = recorder.flush() {
            error!("flushing output failed: {e}");
        }
        info!(
            chunks = recorder.chunks(),
            bytes = recorder.bytes(),
            "session finished: {end}"
        );

        if end == SessionEnd::Stopped || !config.network.reconnect {
            break;
        }
    }

    info!("vidlink-viewer stopped");
    Ok(())
}

// ── Input forwarding ─────────────────────────────────────────────

async fn forward_input(handle: SessionHandle, config: InputConfig) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event = match parse_command(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        if !is_forwarded(&event, &config) {
            debug!(?event, "input filtered");
            continue;
        }
        if !handle.state().has_peer() {
            warn!("not connected; input dropped");
            continue;
        }
        if let Err(e) = handle.send_input(event).await {
            warn!("sending input failed: {e}");
        }
    }
    debug!("input reader exited");
}
