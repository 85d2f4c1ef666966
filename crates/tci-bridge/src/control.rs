//! Control endpoint
//!
//! Accepts any number of concurrent text connections. Each connection sends
//! newline-terminated `key:value` messages; a recognized key with an integer
//! value updates the shared tuning state and pushes the new value upstream
//! before the next message is read. Anything else is silently ignored and
//! the connection stays open. No acknowledgements are ever sent back.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::context::{SessionContext, TuningParam};
use crate::error::BridgeError;
use crate::session::propagate_param;
use crate::upstream::UpstreamHandle;

/// Accept control connections until the task is cancelled.
pub async fn run_control_server(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    upstream: UpstreamHandle,
) -> Result<(), BridgeError> {
    info!(addr = %listener.local_addr()?, "control endpoint listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "new control connection");
        let ctx = ctx.clone();
        let upstream = upstream.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, &ctx, &upstream).await {
                info!(%peer, error = %e, "control connection closed");
            } else {
                info!(%peer, "control connection closed");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    ctx: &SessionContext,
    upstream: &UpstreamHandle,
) -> Result<(), BridgeError> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(param) = apply_control_line(ctx, line.trim()) else {
            continue;
        };
        // Propagation failures surface via logs only; the connection and
        // the stored value stand
        if let Err(e) = propagate_param(ctx, upstream, param).await {
            warn!(error = %e, "parameter propagation failed");
        }
    }
    Ok(())
}

/// Parse one control line and apply it to the tuning state.
///
/// Returns the updated parameter, or `None` when the line is malformed, the
/// key unknown, or the value not a non-negative integer in range.
pub fn apply_control_line(ctx: &SessionContext, line: &str) -> Option<TuningParam> {
    let (key, value) = line.split_once(':')?;
    let param = TuningParam::from_key(key)?;
    let value = value.trim();

    match param {
        TuningParam::CenterFreq => {
            let freq = value.parse::<u64>().ok()?;
            ctx.tuning.set_center_freq(freq);
        }
        TuningParam::SampRate => {
            let rate = value.parse::<u32>().ok()?;
            ctx.tuning.set_samp_rate(rate);
        }
    }
    debug!(key, value, "control message applied");
    Some(param)
}
