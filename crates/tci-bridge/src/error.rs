//! Error types for the bridge

use thiserror::Error;

/// Errors that can occur in the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The upstream connection closed or the client task went away
    #[error("upstream connection closed")]
    UpstreamClosed,

    /// The upstream client rejected or dropped a command
    #[error("upstream send failed: {0}")]
    UpstreamSend(String),

    /// Upstream handshake never completed
    #[error("upstream handshake failed: {0}")]
    Handshake(String),

    /// Wire protocol error on the upstream link
    #[error("protocol error: {0}")]
    Protocol(#[from] tci_protocol::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A long-running task panicked
    #[error("task failed: {0}")]
    Task(String),
}
