//! Simulated radio
//!
//! [`SimRadio`] models the device end of the control protocol: it tracks
//! per-receiver state, and echoes accepted writes the way the real radio
//! acknowledges them. [`run_sim_radio`] serves the wire protocol over any
//! `AsyncRead + AsyncWrite` stream, so a bridge connected through
//! `tokio::io::duplex()` exercises its real client code path.

use std::io;
use std::sync::{Arc, Mutex};

use tci_protocol::{
    encode_data_frame, encode_text_frame, DataFrameHeader, LinkCodec, LinkFrame, TciCommand,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Number of receivers the simulated device exposes
pub const SIM_RECEIVERS: usize = 2;

/// Device-end protocol state machine
#[derive(Debug)]
pub struct SimRadio {
    rate: u32,
    freqs: [u64; SIM_RECEIVERS],
    enabled: [bool; SIM_RECEIVERS],
    streaming: [bool; SIM_RECEIVERS],
    started: bool,
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRadio {
    /// Create with the device's power-on defaults
    pub fn new() -> Self {
        Self {
            rate: 96_000,
            freqs: [14_200_000; SIM_RECEIVERS],
            enabled: [false; SIM_RECEIVERS],
            streaming: [false; SIM_RECEIVERS],
            started: false,
        }
    }

    /// Apply a command; returns the echo messages the device would send.
    pub fn apply(&mut self, cmd: &TciCommand) -> Vec<String> {
        match *cmd {
            TciCommand::Start => {
                self.started = true;
                Vec::new()
            }
            TciCommand::Stop => {
                self.started = false;
                Vec::new()
            }
            TciCommand::RxEnable { rx, enable } => {
                if let Some(slot) = self.enabled.get_mut(rx as usize) {
                    *slot = enable;
                }
                Vec::new()
            }
            TciCommand::IqSampleRate { rate } => {
                self.rate = rate;
                vec![TciCommand::IqSampleRate { rate }.encode()]
            }
            TciCommand::Dds { rx, freq } => {
                if let Some(slot) = self.freqs.get_mut(rx as usize) {
                    *slot = freq;
                }
                vec![TciCommand::Dds { rx, freq }.encode()]
            }
            TciCommand::IqStart { rx } => {
                if let Some(slot) = self.streaming.get_mut(rx as usize) {
                    *slot = true;
                }
                Vec::new()
            }
            TciCommand::IqStop { rx } => {
                if let Some(slot) = self.streaming.get_mut(rx as usize) {
                    *slot = false;
                }
                Vec::new()
            }
        }
    }

    /// Whether a receiver's IQ stream is running
    pub fn is_streaming(&self, rx: u32) -> bool {
        self.streaming.get(rx as usize).copied().unwrap_or(false)
    }

    /// The receiver to stamp on injected data frames: the first streaming
    /// one, or 0 before any stream starts
    fn data_receiver(&self) -> u32 {
        self.streaming
            .iter()
            .position(|s| *s)
            .map(|i| i as u32)
            .unwrap_or(0)
    }
}

/// Test-side handle to a running simulated radio
#[derive(Clone)]
pub struct SimRadioHandle {
    sent: Arc<Mutex<Vec<TciCommand>>>,
    data_tx: mpsc::Sender<Vec<u8>>,
}

impl SimRadioHandle {
    /// Commands received from the bridge so far, in arrival order
    pub fn sent(&self) -> Vec<TciCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Queue an IQ sample block for delivery to the bridge
    pub async fn inject_iq(&self, block: Vec<u8>) {
        let _ = self.data_tx.send(block).await;
    }
}

/// I/O half handed to [`run_sim_radio`]
pub struct SimRadioIo {
    sent: Arc<Mutex<Vec<TciCommand>>>,
    data_rx: mpsc::Receiver<Vec<u8>>,
}

/// Create the handle/io pair for one simulated radio
pub fn sim_radio_channel() -> (SimRadioHandle, SimRadioIo) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let (data_tx, data_rx) = mpsc::channel(64);
    (
        SimRadioHandle {
            sent: sent.clone(),
            data_tx,
        },
        SimRadioIo { sent, data_rx },
    )
}

/// Serve the wire protocol for one connection.
///
/// Sends the `ready;` greeting, then processes commands and injected IQ
/// blocks until the peer disconnects.
pub async fn run_sim_radio<S>(mut stream: S, io_half: SimRadioIo) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let SimRadioIo { sent, mut data_rx } = io_half;
    let mut radio = SimRadio::new();
    let mut codec = LinkCodec::new();
    let mut buf = [0u8; 4096];

    info!("simulated radio ready");
    stream.write_all(&encode_text_frame("ready;")).await?;
    stream.flush().await?;

    loop {
        tokio::select! {
            n = stream.read(&mut buf) => {
                let n = n?;
                if n == 0 {
                    debug!("bridge disconnected from simulated radio");
                    return Ok(());
                }
                codec.push_bytes(&buf[..n]);
                loop {
                    let frame = match codec.next_frame() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "framing error from bridge");
                            return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
                        }
                    };
                    let LinkFrame::Text(text) = frame else {
                        // the bridge never sends data frames
                        continue;
                    };
                    match TciCommand::parse(&text) {
                        Ok(cmd) => {
                            debug!(command = %text, "simulated radio received command");
                            let echoes = radio.apply(&cmd);
                            sent.lock().unwrap().push(cmd);
                            for echo in echoes {
                                stream.write_all(&encode_text_frame(&echo)).await?;
                            }
                            stream.flush().await?;
                        }
                        Err(e) => warn!(message = %text, error = %e, "unparseable command"),
                    }
                }
            }

            block = data_rx.recv() => {
                let Some(block) = block else {
                    debug!("all sim radio handles dropped");
                    return Ok(());
                };
                let header = DataFrameHeader::iq(radio.data_receiver(), radio.rate, block.len());
                stream.write_all(&encode_data_frame(&header, &block)).await?;
                stream.flush().await?;
            }
        }
    }
}
