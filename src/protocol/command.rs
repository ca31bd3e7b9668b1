//! Heater command frames.
//!
//! Every command written to the heater is a fixed 22-byte frame:
//! - Bytes 0-5: Protocol preamble (`00 02 00 01 00 01`)
//! - Bytes 6-7: Length of the rest of the frame (u16 big-endian, always 14)
//! - Bytes 8-11: Command class (`04 00 00 09`)
//! - Bytes 12-19: Reserved, zero
//! - Byte 20: Opcode
//! - Byte 21: Checksum, low byte of the sum of bytes 8-20

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Total size of an encoded command frame.
pub const FRAME_LEN: usize = 22;

/// Size of the preamble plus length field.
const HEADER_LEN: usize = 8;

const PREAMBLE: [u8; 6] = [0x00, 0x02, 0x00, 0x01, 0x00, 0x01];

const COMMAND_CLASS: [u8; 4] = [0x04, 0x00, 0x00, 0x09];

const RESERVED_LEN: usize = 8;

/// A command understood by the heater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Command {
    /// Shut the burner down (enters cooldown).
    #[cfg_attr(feature = "cli", value(name = "stop_heat"))]
    StopHeat,
    /// Start the ignition sequence.
    #[cfg_attr(feature = "cli", value(name = "start_heat"))]
    StartHeat,
    /// Raise the current setting by one step.
    #[cfg_attr(feature = "cli", value(name = "up"))]
    Up,
    /// Lower the current setting by one step.
    #[cfg_attr(feature = "cli", value(name = "down"))]
    Down,
    /// Switch to gear (fixed power level) mode.
    #[cfg_attr(feature = "cli", value(name = "gear"))]
    Gear,
    /// Switch to thermostat (target temperature) mode.
    #[cfg_attr(feature = "cli", value(name = "thermostat"))]
    Thermostat,
    /// Request a status refresh on the read characteristic.
    #[cfg_attr(feature = "cli", value(name = "pump_data"))]
    PumpData,
}

impl Command {
    /// All commands, in the order they are listed to users.
    pub const ALL: [Command; 7] = [
        Command::StopHeat,
        Command::StartHeat,
        Command::Up,
        Command::Down,
        Command::Gear,
        Command::Thermostat,
        Command::PumpData,
    ];

    /// The command's name as used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StopHeat => "stop_heat",
            Self::StartHeat => "start_heat",
            Self::Up => "up",
            Self::Down => "down",
            Self::Gear => "gear",
            Self::Thermostat => "thermostat",
            Self::PumpData => "pump_data",
        }
    }

    /// The opcode byte carried in the frame.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::PumpData => 0x00,
            Self::StopHeat => 0x01,
            Self::StartHeat => 0x02,
            Self::Up => 0x03,
            Self::Down => 0x04,
            Self::Thermostat => 0x06,
            Self::Gear => 0x07,
        }
    }

    /// Look up a command by opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.opcode() == opcode)
    }

    /// Whether this command only asks for data and leaves the heater untouched.
    pub fn is_status_request(&self) -> bool {
        matches!(self, Self::PumpData)
    }

    /// Encode the command into a frame ready to be written to the heater.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(FRAME_LEN);

        buf.put_slice(&PREAMBLE);
        buf.put_u16((FRAME_LEN - HEADER_LEN) as u16);
        buf.put_slice(&COMMAND_CLASS);
        buf.put_bytes(0, RESERVED_LEN);
        buf.put_u8(self.opcode());

        let checksum = checksum(&buf[HEADER_LEN..]);
        buf.put_u8(checksum);

        buf.to_vec()
    }

    /// Decode a frame produced by [`Command::encode`].
    ///
    /// Useful when inspecting captured traffic.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() != FRAME_LEN {
            return Err(Error::InvalidData {
                context: format!(
                    "Command frame must be {} bytes, got {}",
                    FRAME_LEN,
                    frame.len()
                ),
            });
        }

        let expected = checksum(&frame[HEADER_LEN..FRAME_LEN - 1]);
        let actual = frame[FRAME_LEN - 1];
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let mut buf = frame;
        if buf[..PREAMBLE.len()] != PREAMBLE {
            return Err(Error::InvalidData {
                context: format!("Unexpected preamble: {:02X?}", &buf[..PREAMBLE.len()]),
            });
        }
        buf.advance(PREAMBLE.len());

        let length = buf.get_u16() as usize;
        if length != FRAME_LEN - HEADER_LEN {
            return Err(Error::InvalidData {
                context: format!("Unexpected frame length field: {}", length),
            });
        }

        buf.advance(COMMAND_CLASS.len() + RESERVED_LEN);
        let opcode = buf.get_u8();

        Self::from_opcode(opcode).ok_or_else(|| Error::InvalidData {
            context: format!("Unknown opcode: {:#04x}", opcode),
        })
    }
}

/// Compute the frame checksum: the wrapping byte sum of `payload`.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::UnknownCommand { name: s.to_string() })
    }
}
