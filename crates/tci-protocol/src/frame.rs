//! Link framing and binary data frames
//!
//! The control channel and the IQ stream share one TCP connection. Each
//! link frame is a 1-byte kind, a little-endian u32 payload length, and the
//! payload:
//!
//! - kind 0 (TEXT): one UTF-8 control message, `name:arg,arg;`
//! - kind 1 (DATA): a 64-byte stream header followed by sample bytes
//!
//! The stream header is sixteen little-endian u32 fields:
//! `receiver, sample_rate, format, codec, crc, length, kind, reserved[9]`.
//! `length` is the sample payload size in bytes. Stream kind 0 is the IQ
//! stream; kind 1 is demodulated RX audio, which the bridge ignores.

use crate::error::ParseError;

/// Link frame kind byte for text messages
pub const FRAME_KIND_TEXT: u8 = 0;
/// Link frame kind byte for data frames
pub const FRAME_KIND_DATA: u8 = 1;

/// Size of the stream header that precedes sample bytes in a DATA frame
pub const DATA_HEADER_LEN: usize = 64;

/// Largest accepted link frame payload. Anything bigger is a framing error,
/// not a legitimate message.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const LINK_HEADER_LEN: usize = 5;

/// Stream content carried by a DATA frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TciStreamKind {
    /// Raw IQ sample stream
    IqStream,
    /// Demodulated RX audio
    RxAudio,
    /// Anything this implementation does not know about
    Unknown(u32),
}

impl TciStreamKind {
    fn from_wire(value: u32) -> Self {
        match value {
            0 => TciStreamKind::IqStream,
            1 => TciStreamKind::RxAudio,
            other => TciStreamKind::Unknown(other),
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            TciStreamKind::IqStream => 0,
            TciStreamKind::RxAudio => 1,
            TciStreamKind::Unknown(v) => v,
        }
    }
}

/// Header of a binary data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrameHeader {
    /// Source receiver index
    pub receiver: u32,
    /// Sample rate the payload was captured at
    pub sample_rate: u32,
    /// Sample format tag (device-defined)
    pub format: u32,
    /// Codec tag (device-defined, 0 = none)
    pub codec: u32,
    /// Payload checksum (0 when unused)
    pub crc: u32,
    /// Payload length in bytes
    pub length: u32,
    /// Stream kind
    pub kind: TciStreamKind,
}

impl DataFrameHeader {
    /// Header for an IQ payload from `receiver` at `sample_rate`
    pub fn iq(receiver: u32, sample_rate: u32, payload_len: usize) -> Self {
        Self {
            receiver,
            sample_rate,
            format: 0,
            codec: 0,
            crc: 0,
            length: payload_len as u32,
            kind: TciStreamKind::IqStream,
        }
    }

    /// Encode to the 64-byte wire form
    pub fn encode(&self) -> [u8; DATA_HEADER_LEN] {
        let mut out = [0u8; DATA_HEADER_LEN];
        let fields = [
            self.receiver,
            self.sample_rate,
            self.format,
            self.codec,
            self.crc,
            self.length,
            self.kind.to_wire(),
        ];
        for (i, f) in fields.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
        }
        out
    }

    /// Decode from the 64-byte wire form
    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < DATA_HEADER_LEN {
            return Err(ParseError::InvalidFrame(format!(
                "data frame header truncated: {} bytes",
                bytes.len()
            )));
        }
        let field = |i: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            u32::from_le_bytes(b)
        };
        Ok(Self {
            receiver: field(0),
            sample_rate: field(1),
            format: field(2),
            codec: field(3),
            crc: field(4),
            length: field(5),
            kind: TciStreamKind::from_wire(field(6)),
        })
    }
}

/// A decoded link frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFrame {
    /// One control message, terminator included
    Text(String),
    /// One stream data frame
    Data {
        header: DataFrameHeader,
        payload: Vec<u8>,
    },
}

/// Encode a control message into a link frame
pub fn encode_text_frame(message: &str) -> Vec<u8> {
    let payload = message.as_bytes();
    let mut out = Vec::with_capacity(LINK_HEADER_LEN + payload.len());
    out.push(FRAME_KIND_TEXT);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encode a data frame into a link frame
pub fn encode_data_frame(header: &DataFrameHeader, payload: &[u8]) -> Vec<u8> {
    let total = DATA_HEADER_LEN + payload.len();
    let mut out = Vec::with_capacity(LINK_HEADER_LEN + total);
    out.push(FRAME_KIND_DATA);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    out
}

/// Streaming link frame decoder
///
/// Push raw socket bytes in, pull complete frames out. Partial input is
/// buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct LinkCodec {
    buffer: Vec<u8>,
}

impl LinkCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Push raw bytes into the codec's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A framing error leaves
    /// the codec unusable for the connection; callers should drop the link.
    pub fn next_frame(&mut self) -> Result<Option<LinkFrame>, ParseError> {
        if self.buffer.len() < LINK_HEADER_LEN {
            return Ok(None);
        }

        let kind = self.buffer[0];
        let len = u32::from_le_bytes([
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
        ]) as usize;

        if len > MAX_FRAME_LEN {
            return Err(ParseError::FrameTooLarge(len));
        }
        if self.buffer.len() < LINK_HEADER_LEN + len {
            return Ok(None);
        }

        let payload: Vec<u8> = self
            .buffer
            .drain(..LINK_HEADER_LEN + len)
            .skip(LINK_HEADER_LEN)
            .collect();

        match kind {
            FRAME_KIND_TEXT => {
                let text = String::from_utf8(payload).map_err(|_| ParseError::InvalidText)?;
                Ok(Some(LinkFrame::Text(text)))
            }
            FRAME_KIND_DATA => {
                let header = DataFrameHeader::decode(&payload)?;
                let samples = payload[DATA_HEADER_LEN..].to_vec();
                if header.length as usize != samples.len() {
                    return Err(ParseError::InvalidFrame(format!(
                        "data frame length field {} does not match payload {}",
                        header.length,
                        samples.len()
                    )));
                }
                Ok(Some(LinkFrame::Data {
                    header,
                    payload: samples,
                }))
            }
            other => Err(ParseError::InvalidFrame(format!(
                "unknown link frame kind {}",
                other
            ))),
        }
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
