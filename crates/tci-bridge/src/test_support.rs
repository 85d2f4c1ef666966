//! Test doubles for the upstream boundary
//!
//! `RecorderUpstream` stands in for the wire client: it records every
//! command in arrival order, acknowledges each send immediately, and lets
//! tests inject notifications or simulate connection loss.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tci_protocol::{TciCommand, TciNotification};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::upstream::{UpstreamEvent, UpstreamHandle, UpstreamRequest};

pub struct RecorderUpstream {
    sent: Arc<Mutex<Vec<TciCommand>>>,
    event_tx: mpsc::Sender<UpstreamEvent>,
    close_tx: mpsc::Sender<()>,
}

impl RecorderUpstream {
    /// Spawn the recorder task; returns the recorder plus the handle and
    /// event receiver a `SessionController` expects.
    pub fn spawn() -> (Self, UpstreamHandle, mpsc::Receiver<UpstreamEvent>) {
        let (handle, mut req_rx) = UpstreamHandle::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (close_tx, mut close_rx) = mpsc::channel::<()>(1);

        let sent = Arc::new(Mutex::new(Vec::new()));
        let task_sent = sent.clone();
        let task_event_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    req = req_rx.recv() => {
                        let Some(UpstreamRequest { command, done }) = req else { break };
                        task_sent.lock().unwrap().push(command);
                        let _ = done.send(());
                    }
                    _ = close_rx.recv() => {
                        let _ = task_event_tx.send(UpstreamEvent::Closed).await;
                        break;
                    }
                }
            }
        });

        (
            Self {
                sent,
                event_tx,
                close_tx,
            },
            handle,
            event_rx,
        )
    }

    /// Snapshot of the commands sent so far, in order
    pub fn sent(&self) -> Vec<TciCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Deliver a parameter notification to the controller
    pub async fn notify(&self, note: TciNotification) {
        let _ = self.event_tx.send(UpstreamEvent::Param(note)).await;
    }

    /// Simulate the upstream connection dropping
    pub async fn close(&self) {
        let _ = self.close_tx.send(()).await;
    }

    /// Poll until the sent-command log satisfies `pred`, panicking after 2s
    pub async fn wait_for(&self, pred: impl Fn(&[TciCommand]) -> bool) {
        timeout(Duration::from_secs(2), async {
            loop {
                if pred(&self.sent()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition on sent commands not reached in time");
    }
}
