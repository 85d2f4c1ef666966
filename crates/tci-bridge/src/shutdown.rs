//! Shutdown coordinator
//!
//! On a termination signal the coordinator sets the shutdown flag and
//! cancels the two endpoint accept loops. The session controller is never
//! cancelled; it observes the flag at its next idle re-entry, so a stop
//! sequence already underway always completes. The coordinator then waits
//! for all long-running tasks, discarding the cancellations it caused.

use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::context::SessionContext;
use crate::error::BridgeError;

/// The bridge's long-running tasks
pub struct BridgeTasks {
    /// Session controller (never aborted)
    pub session: JoinHandle<Result<(), BridgeError>>,
    /// Control endpoint accept loop
    pub control: JoinHandle<Result<(), BridgeError>>,
    /// Streaming endpoint accept loop
    pub streaming: JoinHandle<Result<(), BridgeError>>,
    /// Upstream client
    pub upstream: JoinHandle<Result<(), BridgeError>>,
}

/// Wait for a termination signal (SIGINT or SIGTERM).
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler, handling SIGINT only");
            let _ = ctrl_c.await;
        }
    }
}

/// Wait for a termination signal (ctrl-c).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Run the bridge to completion.
///
/// Returns the session controller's result: `Ok` after a signal-triggered
/// clean shutdown, `Err` if the session task failed first (e.g. the
/// upstream connection dropped).
pub async fn coordinate(
    ctx: Arc<SessionContext>,
    mut tasks: BridgeTasks,
    signal: impl Future<Output = ()>,
) -> Result<(), BridgeError> {
    tokio::pin!(signal);

    let session_result = tokio::select! {
        _ = &mut signal => {
            info!("termination signal received, shutting down");
            ctx.shutdown.trigger();
            tasks.control.abort();
            tasks.streaming.abort();
            // The session finishes any in-flight stop sequence and exits at
            // its next idle re-entry
            flatten((&mut tasks.session).await)
        }
        res = &mut tasks.session => {
            ctx.shutdown.trigger();
            tasks.control.abort();
            tasks.streaming.abort();
            flatten(res)
        }
    };

    // Nothing sends upstream commands once the session is done
    tasks.upstream.abort();

    reap("control endpoint", tasks.control).await;
    reap("streaming endpoint", tasks.streaming).await;
    reap("upstream client", tasks.upstream).await;

    session_result
}

fn flatten(res: Result<Result<(), BridgeError>, JoinError>) -> Result<(), BridgeError> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(BridgeError::Task(e.to_string())),
    }
}

async fn reap(name: &str, handle: JoinHandle<Result<(), BridgeError>>) {
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task = name, error = %e, "task ended with error"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(task = name, error = %e, "task panicked"),
    }
}
