//! Demand-driven IQ streaming bridge
//!
//! This crate bridges a radio's native control/streaming protocol to two
//! plain TCP sockets: a line-based `key:value` control socket and a raw
//! binary IQ socket. A single downstream client can request IQ data and
//! tune the radio without speaking the radio's protocol.
//!
//! # Architecture
//!
//! Four components share one [`SessionContext`] and run as tokio tasks:
//!
//! - [`session::SessionController`] is the state machine that starts and
//!   stops the upstream stream as consumer demand comes and goes, and
//!   verifies the radio's parameter echoes
//! - [`control::run_control_server`] applies `key:value` tuning messages
//!   and pushes them upstream
//! - [`streaming::run_streaming_server`] relays buffered sample blocks to
//!   the attached consumer
//! - [`shutdown::coordinate`] runs signal-driven teardown that cancels the
//!   endpoints but lets the session controller finish its stop sequence
//!
//! The upstream radio sits behind [`upstream::UpstreamHandle`] and an event
//! channel; the wire client in [`upstream`] is generic over its transport so
//! tests can drive the whole bridge against a simulated radio.

pub mod context;
pub mod control;
pub mod error;
pub mod session;
pub mod shutdown;
pub mod streaming;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub use context::{
    BridgeConfig, DemandFlag, SampleBuffer, SessionContext, ShutdownFlag, TuningParam, TuningState,
};
pub use error::BridgeError;
pub use session::{SessionController, SessionPhase, DEMAND_POLL_INTERVAL};
pub use shutdown::{coordinate, wait_for_signal, BridgeTasks};
pub use upstream::{UpstreamEvent, UpstreamHandle, UpstreamRequest};
