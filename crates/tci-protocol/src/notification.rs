//! Inbound parameter notifications
//!
//! The device echoes every accepted write command and reports unsolicited
//! parameter changes in the same `name:arg,arg;` text form. The bridge
//! parses these into typed notifications; anything it does not recognize is
//! preserved as [`TciNotification::Other`] so observers can log it.

use crate::command::{parse_u32, parse_u64, split_message};
use crate::error::ParseError;

/// A parameter notification received from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TciNotification {
    /// `ready;`: control channel is usable
    Ready,
    /// `iq_samplerate:96000;`: device-global IQ sample rate
    SampleRate { rate: u32 },
    /// `dds:0,14200000;`: a receiver's center frequency
    CenterFreq { rx: u32, freq: u64 },
    /// Any other well-formed message, kept for logging
    Other { name: String, args: Vec<String> },
}

impl TciNotification {
    /// Parse a notification from its wire text form.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (name, args) = split_message(text)?;

        match name {
            "ready" => Ok(TciNotification::Ready),
            "iq_samplerate" => {
                if args.len() != 1 {
                    return Err(ParseError::WrongArgCount {
                        name: name.to_string(),
                        expected: 1,
                        actual: args.len(),
                    });
                }
                Ok(TciNotification::SampleRate {
                    rate: parse_u32(args[0])?,
                })
            }
            "dds" => {
                if args.len() != 2 {
                    return Err(ParseError::WrongArgCount {
                        name: name.to_string(),
                        expected: 2,
                        actual: args.len(),
                    });
                }
                Ok(TciNotification::CenterFreq {
                    rx: parse_u32(args[0])?,
                    freq: parse_u64(args[1])?,
                })
            }
            _ => Ok(TciNotification::Other {
                name: name.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}
