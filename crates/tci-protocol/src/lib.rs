//! TCI-style radio protocol codec
//!
//! This crate provides encoding and decoding for the upstream radio's
//! control and streaming protocol:
//!
//! - **Control messages**: ASCII `name:arg,arg;` commands and notifications
//! - **Data frames**: binary IQ sample blocks with a 64-byte stream header
//! - **Link framing**: a kind byte plus length prefix multiplexing both over
//!   one TCP connection
//!
//! # Architecture
//!
//! The bridge core never touches wire bytes directly. It encodes
//! [`TciCommand`] values, and receives typed [`TciNotification`]s and raw
//! sample payloads decoded here. The same codec serves both the real client
//! and the simulated radio in `tci-sim`, so tests exercise the exact frame
//! path production uses.
//!
//! # Example
//!
//! ```rust
//! use tci_protocol::{LinkCodec, LinkFrame, TciCommand, TciNotification};
//!
//! let frame = tci_protocol::encode_text_frame(&TciCommand::IqStart { rx: 0 }.encode());
//!
//! let mut codec = LinkCodec::new();
//! codec.push_bytes(&frame);
//! if let Some(LinkFrame::Text(text)) = codec.next_frame().unwrap() {
//!     assert_eq!(TciCommand::parse(&text).unwrap(), TciCommand::IqStart { rx: 0 });
//! }
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod notification;

pub use command::TciCommand;
pub use error::ParseError;
pub use frame::{
    encode_data_frame, encode_text_frame, DataFrameHeader, LinkCodec, LinkFrame, TciStreamKind,
    DATA_HEADER_LEN, MAX_FRAME_LEN,
};
pub use notification::TciNotification;
