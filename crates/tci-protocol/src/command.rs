//! Outbound control commands
//!
//! Commands are ASCII messages of the form `name:arg,arg;`. Arguments are
//! decimal integers or the literals `true`/`false`. The device echoes
//! write commands back in the same format, which is how acknowledgements
//! are delivered (see [`crate::notification`]).

use crate::error::ParseError;

/// A control command addressed to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TciCommand {
    /// Start the device DSP: `start;`
    Start,
    /// Stop the device DSP: `stop;`
    Stop,
    /// Enable or disable a receiver: `rx_enable:0,true;`
    RxEnable { rx: u32, enable: bool },
    /// Set the device-global IQ sample rate: `iq_samplerate:96000;`
    IqSampleRate { rate: u32 },
    /// Set a receiver's center frequency: `dds:0,14200000;`
    Dds { rx: u32, freq: u64 },
    /// Start the IQ stream for a receiver: `iq_start:0;`
    IqStart { rx: u32 },
    /// Stop the IQ stream for a receiver: `iq_stop:0;`
    IqStop { rx: u32 },
}

impl TciCommand {
    /// Message name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            TciCommand::Start => "start",
            TciCommand::Stop => "stop",
            TciCommand::RxEnable { .. } => "rx_enable",
            TciCommand::IqSampleRate { .. } => "iq_samplerate",
            TciCommand::Dds { .. } => "dds",
            TciCommand::IqStart { .. } => "iq_start",
            TciCommand::IqStop { .. } => "iq_stop",
        }
    }

    /// Encode to the wire text form, including the `;` terminator
    pub fn encode(&self) -> String {
        match self {
            TciCommand::Start => "start;".to_string(),
            TciCommand::Stop => "stop;".to_string(),
            TciCommand::RxEnable { rx, enable } => format!("rx_enable:{},{};", rx, enable),
            TciCommand::IqSampleRate { rate } => format!("iq_samplerate:{};", rate),
            TciCommand::Dds { rx, freq } => format!("dds:{},{};", rx, freq),
            TciCommand::IqStart { rx } => format!("iq_start:{};", rx),
            TciCommand::IqStop { rx } => format!("iq_stop:{};", rx),
        }
    }

    /// Parse a command from its wire text form.
    ///
    /// Used by the device side (and the simulator); the bridge itself only
    /// encodes commands and parses notifications.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (name, args) = split_message(text)?;

        match name {
            "start" => expect_args(name, &args, 0).map(|_| TciCommand::Start),
            "stop" => expect_args(name, &args, 0).map(|_| TciCommand::Stop),
            "rx_enable" => {
                expect_args(name, &args, 2)?;
                Ok(TciCommand::RxEnable {
                    rx: parse_u32(args[0])?,
                    enable: parse_bool(args[1])?,
                })
            }
            "iq_samplerate" => {
                expect_args(name, &args, 1)?;
                Ok(TciCommand::IqSampleRate {
                    rate: parse_u32(args[0])?,
                })
            }
            "dds" => {
                expect_args(name, &args, 2)?;
                Ok(TciCommand::Dds {
                    rx: parse_u32(args[0])?,
                    freq: parse_u64(args[1])?,
                })
            }
            "iq_start" => {
                expect_args(name, &args, 1)?;
                Ok(TciCommand::IqStart {
                    rx: parse_u32(args[0])?,
                })
            }
            "iq_stop" => {
                expect_args(name, &args, 1)?;
                Ok(TciCommand::IqStop {
                    rx: parse_u32(args[0])?,
                })
            }
            other => Err(ParseError::UnknownMessage(other.to_string())),
        }
    }
}

/// Split `name:arg,arg;` into the name and its argument list.
///
/// The trailing `;` is required; an empty argument section is allowed for
/// messages that carry none.
pub(crate) fn split_message(text: &str) -> Result<(&str, Vec<&str>), ParseError> {
    let body = text
        .strip_suffix(';')
        .ok_or_else(|| ParseError::InvalidFrame("missing ';' terminator".into()))?;

    match body.split_once(':') {
        Some((name, rest)) => {
            if name.is_empty() {
                return Err(ParseError::InvalidFrame("empty message name".into()));
            }
            Ok((name, rest.split(',').collect()))
        }
        None => {
            if body.is_empty() {
                return Err(ParseError::InvalidFrame("empty message".into()));
            }
            Ok((body, Vec::new()))
        }
    }
}

pub(crate) fn parse_u32(s: &str) -> Result<u32, ParseError> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidInteger(s.into()))
}

pub(crate) fn parse_u64(s: &str) -> Result<u64, ParseError> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidInteger(s.into()))
}

fn parse_bool(s: &str) -> Result<bool, ParseError> {
    match s.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ParseError::InvalidInteger(other.into())),
    }
}

fn expect_args(name: &str, args: &[&str], expected: usize) -> Result<(), ParseError> {
    // `name;` and `name:;` both count as zero arguments
    let actual = if args.len() == 1 && args[0].is_empty() {
        0
    } else {
        args.len()
    };
    if actual == expected {
        Ok(())
    } else {
        Err(ParseError::WrongArgCount {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}
