//! Streaming endpoint
//!
//! Accepts IQ consumer connections. A connection raises the demand flag,
//! then relays buffered sample blocks to the socket until the consumer
//! drops, an I/O fault occurs, or shutdown is requested. The demand flag is
//! cleared through a guard on every exit path, including task cancellation.
//!
//! One consumer at a time is the supported mode. A second concurrent
//! consumer is accepted at the transport level and shares the same buffer
//! and flag; the first disconnect clears demand for both (see
//! [`crate::context::DemandFlag`]).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::context::{DemandFlag, SessionContext};
use crate::error::BridgeError;

/// Clears the demand flag when dropped, so relay exit, I/O faults, and
/// cancellation all take the same cleanup path.
struct DemandGuard<'a>(&'a DemandFlag);

impl<'a> DemandGuard<'a> {
    fn raise(flag: &'a DemandFlag) -> Self {
        flag.raise();
        Self(flag)
    }
}

impl Drop for DemandGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Accept IQ consumers until the task is cancelled.
pub async fn run_streaming_server(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
) -> Result<(), BridgeError> {
    info!(addr = %listener.local_addr()?, "IQ streaming endpoint listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "new IQ consumer");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            relay_consumer(stream, &ctx, peer).await;
        });
    }
}

/// Relay buffered sample blocks to one consumer.
async fn relay_consumer(mut stream: TcpStream, ctx: &SessionContext, peer: SocketAddr) {
    let _demand = DemandGuard::raise(&ctx.demand);

    loop {
        let block = tokio::select! {
            _ = ctx.shutdown.wait() => {
                info!(%peer, "dropping IQ consumer for shutdown");
                break;
            }
            block = ctx.buffer.pop() => block,
        };

        if let Err(e) = write_block(&mut stream, &block).await {
            info!(%peer, error = %e, "IQ consumer disconnected");
            break;
        }
    }
    // DemandGuard clears demand here
}

async fn write_block(stream: &mut TcpStream, block: &[u8]) -> std::io::Result<()> {
    stream.write_all(block).await?;
    stream.flush().await
}
