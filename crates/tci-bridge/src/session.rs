//! Demand-driven streaming session controller
//!
//! The controller reacts to the consumer demand flag by walking a four-phase
//! state machine:
//!
//! ```text
//!   Idle ──demand raised──▶ Starting ──▶ Streaming ──demand cleared──▶ Stopping ──▶ Idle
//! ```
//!
//! - `Idle`: wait for demand. The shutdown flag is checked only here, so an
//!   in-flight stop sequence always completes before the controller exits.
//! - `Starting`: issue, in order and each awaited: optional device start,
//!   receiver enable, current sample rate, current center frequency, stream
//!   start.
//! - `Streaming`: poll the demand flag every 50 ms; parameter echoes are
//!   verified between ticks.
//! - `Stopping`: issue stream stop (and optional device stop), then drain
//!   the sample buffer so no stale blocks reach a future consumer.
//!
//! Parameter echoes that do not match the desired tuning state are logged
//! and otherwise ignored; the desired value may still be in flight.

use std::sync::Arc;
use std::time::Duration;

use tci_protocol::{TciCommand, TciNotification};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::context::{SessionContext, TuningParam};
use crate::error::BridgeError;
use crate::upstream::{UpstreamEvent, UpstreamHandle};

/// How often the demand flag is re-checked while streaming. Bounds the
/// latency between the last consumer detaching and the stream stop command.
pub const DEMAND_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Phase of the streaming session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No consumer; upstream stream stopped
    Idle,
    /// Issuing the start command sequence
    Starting,
    /// Upstream stream active, samples flowing
    Streaming,
    /// Issuing the stop command sequence
    Stopping,
}

/// Serialize the current value of `param` into an upstream write command and
/// await its send-and-flush. Acknowledgement arrives asynchronously as an
/// echo notification.
pub async fn propagate_param(
    ctx: &SessionContext,
    upstream: &UpstreamHandle,
    param: TuningParam,
) -> Result<(), BridgeError> {
    let command = match param {
        TuningParam::SampRate => TciCommand::IqSampleRate {
            rate: ctx.tuning.samp_rate(),
        },
        TuningParam::CenterFreq => TciCommand::Dds {
            rx: ctx.config.receiver,
            freq: ctx.tuning.center_freq(),
        },
    };
    upstream.send(command).await
}

/// The session state machine task
pub struct SessionController {
    ctx: Arc<SessionContext>,
    upstream: UpstreamHandle,
    events: mpsc::Receiver<UpstreamEvent>,
    phase: SessionPhase,
}

impl SessionController {
    /// Create a controller over the upstream boundary
    pub fn new(
        ctx: Arc<SessionContext>,
        upstream: UpstreamHandle,
        events: mpsc::Receiver<UpstreamEvent>,
    ) -> Self {
        Self {
            ctx,
            upstream,
            events,
            phase: SessionPhase::Idle,
        }
    }

    /// Run until shutdown is observed at idle, or the upstream client fails.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        // Push the configured rate once so the device agrees before the
        // first session
        propagate_param(&self.ctx, &self.upstream, TuningParam::SampRate).await?;

        loop {
            self.set_phase(SessionPhase::Idle);
            if self.ctx.shutdown.is_triggered() {
                break;
            }
            if !self.wait_for_demand().await? {
                continue;
            }
            self.start_session().await?;
            self.stream_until_demand_clears().await?;
            self.stop_session().await?;
        }

        info!("session controller exiting");
        Ok(())
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "session phase change");
            self.phase = phase;
        }
    }

    /// Wait at idle. Returns true when demand was raised, false when
    /// shutdown was requested instead.
    async fn wait_for_demand(&mut self) -> Result<bool, BridgeError> {
        loop {
            tokio::select! {
                _ = self.ctx.demand.wait_raised() => return Ok(true),
                _ = self.ctx.shutdown.wait() => return Ok(false),
                ev = self.events.recv() => self.handle_event(ev)?,
            }
        }
    }

    async fn start_session(&mut self) -> Result<(), BridgeError> {
        self.set_phase(SessionPhase::Starting);
        info!("consumer demand raised, starting IQ session");

        let rx = self.ctx.config.receiver;
        if self.ctx.config.device_start {
            self.upstream.send(TciCommand::Start).await?;
        }
        self.upstream
            .send(TciCommand::RxEnable { rx, enable: true })
            .await?;
        propagate_param(&self.ctx, &self.upstream, TuningParam::SampRate).await?;
        propagate_param(&self.ctx, &self.upstream, TuningParam::CenterFreq).await?;
        self.upstream.send(TciCommand::IqStart { rx }).await?;
        Ok(())
    }

    async fn stream_until_demand_clears(&mut self) -> Result<(), BridgeError> {
        self.set_phase(SessionPhase::Streaming);
        let mut poll = interval(DEMAND_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if !self.ctx.demand.is_raised() {
                        return Ok(());
                    }
                }
                ev = self.events.recv() => self.handle_event(ev)?,
            }
        }
    }

    async fn stop_session(&mut self) -> Result<(), BridgeError> {
        self.set_phase(SessionPhase::Stopping);
        info!("consumer demand cleared, stopping IQ session");

        let rx = self.ctx.config.receiver;
        self.upstream.send(TciCommand::IqStop { rx }).await?;
        if self.ctx.config.device_start {
            self.upstream.send(TciCommand::Stop).await?;
        }
        self.ctx.buffer.drain();
        Ok(())
    }

    fn handle_event(&self, event: Option<UpstreamEvent>) -> Result<(), BridgeError> {
        match event {
            Some(UpstreamEvent::Param(note)) => {
                self.verify_echo(&note);
                Ok(())
            }
            Some(UpstreamEvent::Closed) | None => Err(BridgeError::UpstreamClosed),
        }
    }

    /// Compare a parameter echo against the desired tuning state.
    /// Frequency echoes for other receivers are ignored. A mismatch is
    /// logged only; the desired value may still be in flight.
    fn verify_echo(&self, note: &TciNotification) {
        match note {
            TciNotification::SampleRate { rate } => {
                let want = self.ctx.tuning.samp_rate();
                if *rate != want {
                    warn!(reported = rate, desired = want, "sample rate echo mismatch");
                }
            }
            TciNotification::CenterFreq { rx, freq } if *rx == self.ctx.config.receiver => {
                let want = self.ctx.tuning.center_freq();
                if *freq != want {
                    warn!(reported = freq, desired = want, "center frequency echo mismatch");
                }
            }
            TciNotification::CenterFreq { .. } => {}
            TciNotification::Ready => {}
            TciNotification::Other { name, .. } => {
                debug!(name, "ignoring unrelated upstream notification");
            }
        }
    }
}
