//! Upstream client boundary
//!
//! The session controller and the control endpoint talk to the radio
//! through an [`UpstreamHandle`]; the radio talks back through a stream of
//! [`UpstreamEvent`]s. The wire client in this module pumps both across a
//! single connection using the `tci-protocol` link codec.
//!
//! The client is generic over the I/O type so tests can run it over
//! `tokio::io::duplex()` against a simulated radio, exercising the exact
//! code path production uses.
//!
//! Inbound IQ data frames are appended straight to the session's sample
//! buffer, which never blocks, so a slow downstream consumer cannot stall
//! the upstream read path.

use std::sync::Arc;

use tci_protocol::{encode_text_frame, LinkCodec, LinkFrame, TciCommand, TciNotification, TciStreamKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::BridgeError;

/// A command plus a completion signal fired once it has been written and
/// flushed to the socket
#[derive(Debug)]
pub struct UpstreamRequest {
    /// The command to send
    pub command: TciCommand,
    /// Completed after send-and-flush
    pub done: oneshot::Sender<()>,
}

/// Notifications delivered by the upstream client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A parameter notification (echo or unsolicited report)
    Param(TciNotification),
    /// The upstream connection is gone
    Closed,
}

/// Clonable sender half of the upstream command channel
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    tx: mpsc::Sender<UpstreamRequest>,
}

impl UpstreamHandle {
    /// Create a handle and the receiver the client task consumes
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UpstreamRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Send a command and wait until it has been written and flushed
    pub async fn send(&self, command: TciCommand) -> Result<(), BridgeError> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(UpstreamRequest { command, done })
            .await
            .map_err(|e| BridgeError::UpstreamSend(e.to_string()))?;
        ack.await.map_err(|_| BridgeError::UpstreamClosed)
    }
}

/// Connect the upstream TCP socket
pub async fn connect(device: &str) -> Result<TcpStream, BridgeError> {
    info!(device, "connecting to upstream radio");
    let stream = TcpStream::connect(device).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Run the upstream client over an established connection.
///
/// Waits for the device's `ready;` greeting, then pumps commands out and
/// notifications/data in until the connection drops or every
/// [`UpstreamHandle`] is gone. Any failure emits [`UpstreamEvent::Closed`]
/// before returning; there is no reconnect.
pub async fn run_upstream_client<S>(
    io: S,
    ctx: Arc<SessionContext>,
    req_rx: mpsc::Receiver<UpstreamRequest>,
    event_tx: mpsc::Sender<UpstreamEvent>,
) -> Result<(), BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let result = client_loop(io, &ctx, req_rx, &event_tx).await;
    if result.is_err() {
        let _ = event_tx.try_send(UpstreamEvent::Closed);
    }
    result
}

/// Forward a parameter notification without awaiting. The client loop must
/// never block on the event channel: the controller stops draining it while
/// it awaits a command ack, and a device dumping state at connect would
/// otherwise wedge both sides. Echo verification tolerates missed echoes,
/// so overflow drops the notification.
fn forward_param(event_tx: &mpsc::Sender<UpstreamEvent>, note: TciNotification) {
    if event_tx.try_send(UpstreamEvent::Param(note)).is_err() {
        warn!("event channel full, dropping parameter notification");
    }
}

async fn client_loop<S>(
    io: S,
    ctx: &SessionContext,
    mut req_rx: mpsc::Receiver<UpstreamRequest>,
    event_tx: &mpsc::Sender<UpstreamEvent>,
) -> Result<(), BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut codec = LinkCodec::new();
    let mut buf = vec![0u8; 8192];

    // Handshake: nothing may be sent until the device reports ready
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(BridgeError::Handshake(
                "connection closed before ready".into(),
            ));
        }
        codec.push_bytes(&buf[..n]);

        let mut ready = false;
        while let Some(frame) = codec.next_frame()? {
            if let LinkFrame::Text(text) = frame {
                match TciNotification::parse(&text) {
                    Ok(TciNotification::Ready) => ready = true,
                    Ok(note) => forward_param(event_tx, note),
                    Err(e) => debug!(message = %text, error = %e, "ignoring unparseable upstream message"),
                }
            }
        }
        if ready {
            break;
        }
    }
    info!("upstream radio ready");

    loop {
        tokio::select! {
            req = req_rx.recv() => {
                // All handles dropped means the bridge is done with us
                let Some(UpstreamRequest { command, done }) = req else {
                    return Ok(());
                };
                debug!(command = %command.encode(), "sending upstream command");
                writer.write_all(&encode_text_frame(&command.encode())).await?;
                writer.flush().await?;
                let _ = done.send(());
            }

            n = reader.read(&mut buf) => {
                let n = n?;
                if n == 0 {
                    return Err(BridgeError::UpstreamClosed);
                }
                codec.push_bytes(&buf[..n]);
                while let Some(frame) = codec.next_frame()? {
                    dispatch_frame(frame, ctx, event_tx);
                }
            }
        }
    }
}

fn dispatch_frame(frame: LinkFrame, ctx: &SessionContext, event_tx: &mpsc::Sender<UpstreamEvent>) {
    match frame {
        LinkFrame::Text(text) => match TciNotification::parse(&text) {
            Ok(note) => forward_param(event_tx, note),
            Err(e) => {
                debug!(message = %text, error = %e, "ignoring unparseable upstream message");
            }
        },
        LinkFrame::Data { header, payload } => match header.kind {
            TciStreamKind::IqStream => ctx.buffer.push(payload),
            TciStreamKind::RxAudio => {}
            TciStreamKind::Unknown(kind) => {
                warn!(kind, "ignoring data frame with unknown stream kind");
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BridgeConfig;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn notification_burst_does_not_stall_command_sends() {
        let (io, mut device) = tokio::io::duplex(1 << 16);
        let ctx = Arc::new(SessionContext::new(BridgeConfig::default()));
        let (handle, req_rx) = UpstreamHandle::channel(16);
        let (event_tx, _event_rx) = mpsc::channel(8);
        tokio::spawn(run_upstream_client(io, ctx, req_rx, event_tx));

        // Greeting followed by a full state dump, far more than the event
        // channel holds, with the receiver never drained
        let mut bytes = encode_text_frame("ready;");
        for _ in 0..300 {
            bytes.extend_from_slice(&encode_text_frame("vfo:0,1;"));
        }
        device.write_all(&bytes).await.unwrap();

        timeout(
            Duration::from_secs(2),
            handle.send(TciCommand::IqStart { rx: 0 }),
        )
        .await
        .expect("command send stalled behind undrained notifications")
        .unwrap();

        // The command reached the wire
        let mut codec = LinkCodec::new();
        let mut buf = [0u8; 1024];
        let text = loop {
            let n = device.read(&mut buf).await.unwrap();
            codec.push_bytes(&buf[..n]);
            if let Some(LinkFrame::Text(text)) = codec.next_frame().unwrap() {
                break text;
            }
        };
        assert_eq!(text, "iq_start:0;");
    }

    #[tokio::test]
    async fn iq_frames_land_in_buffer_not_event_channel() {
        let (io, mut device) = tokio::io::duplex(1 << 16);
        let ctx = Arc::new(SessionContext::new(BridgeConfig::default()));
        let (_handle, req_rx) = UpstreamHandle::channel(16);
        let (event_tx, _event_rx) = mpsc::channel(8);
        tokio::spawn(run_upstream_client(io, ctx.clone(), req_rx, event_tx));

        let mut bytes = encode_text_frame("ready;");
        let payload = vec![1u8, 2, 3, 4];
        let header = tci_protocol::DataFrameHeader::iq(0, 96_000, payload.len());
        bytes.extend_from_slice(&tci_protocol::encode_data_frame(&header, &payload));
        device.write_all(&bytes).await.unwrap();

        let block = timeout(Duration::from_secs(2), ctx.buffer.pop())
            .await
            .expect("IQ payload never reached the sample buffer");
        assert_eq!(block, payload);
    }
}
