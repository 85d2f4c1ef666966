//! Error types for wire parsing

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame payload exceeds the allowed maximum
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Control message is not valid UTF-8
    #[error("control message is not valid UTF-8")]
    InvalidText,

    /// Unknown or unsupported control message
    #[error("unknown message: {0}")]
    UnknownMessage(String),

    /// A numeric argument failed to parse
    #[error("invalid integer argument: {0}")]
    InvalidInteger(String),

    /// Wrong number of arguments for a message
    #[error("wrong argument count for {name}: expected {expected}, got {actual}")]
    WrongArgCount {
        name: String,
        expected: usize,
        actual: usize,
    },
}
