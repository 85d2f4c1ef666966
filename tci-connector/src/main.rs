//! tci-connector - bridge a TCI radio to an OpenWebRX-style consumer
//!
//! Connects to the radio's control/streaming socket and exposes two plain
//! TCP endpoints: a `key:value` line control socket and a raw binary IQ
//! socket. The upstream stream runs only while an IQ consumer is attached.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tci_bridge::context::{BridgeConfig, SessionContext};
use tci_bridge::control::run_control_server;
use tci_bridge::session::SessionController;
use tci_bridge::shutdown::{coordinate, wait_for_signal, BridgeTasks};
use tci_bridge::streaming::run_streaming_server;
use tci_bridge::upstream::{self, UpstreamHandle};

const SUPPORTED_RATES: [u32; 4] = [48_000, 96_000, 192_000, 384_000];

#[derive(Parser)]
#[command(
    name = "tci-connector",
    about = "Connector to feed a TCI radio's IQ stream to an OpenWebRX instance"
)]
struct Cli {
    /// Radio control/streaming address
    #[arg(short, long, default_value = "localhost:50001")]
    device: String,

    /// Which receiver to drive
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=1))]
    receiver: u32,

    /// IQ data port
    #[arg(short, long, default_value_t = 44880)]
    port: u16,

    /// Control port
    #[arg(short, long, default_value_t = 44881)]
    control: u16,

    /// Initial center frequency in Hz
    #[arg(short, long, default_value_t = 14_200_000)]
    frequency: u64,

    /// IQ sample rate
    #[arg(short, long, default_value_t = 96_000, value_parser = parse_rate)]
    samplerate: u32,

    /// Issue device start/stop commands around each streaming session
    #[arg(long)]
    device_start: bool,

    /// Show debug info
    #[arg(short, long)]
    verbose: bool,
}

fn parse_rate(s: &str) -> Result<u32, String> {
    let rate: u32 = s.parse().map_err(|_| format!("invalid sample rate '{s}'"))?;
    if SUPPORTED_RATES.contains(&rate) {
        Ok(rate)
    } else {
        Err(format!(
            "unsupported sample rate {}. Valid: {}",
            rate,
            SUPPORTED_RATES.map(|r| r.to_string()).join(", ")
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "tci_connector=debug,tci_bridge=debug,tci_protocol=debug"
    } else {
        "tci_connector=info,tci_bridge=info,tci_protocol=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        device = %cli.device,
        receiver = cli.receiver,
        frequency = cli.frequency,
        samplerate = cli.samplerate,
        "starting tci-connector"
    );

    let ctx = Arc::new(SessionContext::new(BridgeConfig {
        receiver: cli.receiver,
        device_start: cli.device_start,
        initial_freq: cli.frequency,
        initial_rate: cli.samplerate,
        ..BridgeConfig::default()
    }));

    let stream = upstream::connect(&cli.device)
        .await
        .context("connecting to upstream radio")?;

    let control_listener = TcpListener::bind(("0.0.0.0", cli.control))
        .await
        .context("binding control port")?;
    let iq_listener = TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .context("binding IQ port")?;

    let (handle, req_rx) = UpstreamHandle::channel(64);
    let (event_tx, event_rx) = mpsc::channel(256);

    let tasks = BridgeTasks {
        upstream: tokio::spawn(upstream::run_upstream_client(
            stream,
            ctx.clone(),
            req_rx,
            event_tx,
        )),
        session: tokio::spawn(SessionController::new(ctx.clone(), handle.clone(), event_rx).run()),
        control: tokio::spawn(run_control_server(control_listener, ctx.clone(), handle)),
        streaming: tokio::spawn(run_streaming_server(iq_listener, ctx.clone())),
    };

    coordinate(ctx, tasks, wait_for_signal())
        .await
        .context("bridge terminated abnormally")?;

    tracing::info!("clean shutdown");
    Ok(())
}
