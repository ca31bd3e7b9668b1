//! Heater status parsing.
//!
//! Parses the response read from the heater's read characteristic after a
//! `pump_data` request.

use bytes::Buf;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};

/// Operating state reported by the heater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaterState {
    /// Burner off.
    Off,
    /// Cooling down after a stop.
    Cooldown,
    /// Cooldown about to begin.
    CooldownStarting,
    /// Stop command accepted.
    CooldownReceived,
    /// Start command accepted.
    IgnitionReceived,
    /// Ignition about to begin.
    IgnitionStarting,
    /// Glow plug lit, flame not yet stable.
    Igniting,
    /// Flame established.
    Running,
    /// Heating at the current setting.
    Heating,
    /// Heater fault.
    Error,
    /// A state byte this crate does not know about.
    Unknown(u8),
}

impl HeaterState {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Off,
            65 => Self::Cooldown,
            67 => Self::CooldownStarting,
            69 => Self::CooldownReceived,
            128 => Self::IgnitionReceived,
            129 => Self::IgnitionStarting,
            131 => Self::Igniting,
            133 => Self::Running,
            135 => Self::Heating,
            255 => Self::Error,
            other => Self::Unknown(other),
        }
    }

    /// Get the raw byte value.
    pub fn to_raw(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Cooldown => 65,
            Self::CooldownStarting => 67,
            Self::CooldownReceived => 69,
            Self::IgnitionReceived => 128,
            Self::IgnitionStarting => 129,
            Self::Igniting => 131,
            Self::Running => 133,
            Self::Heating => 135,
            Self::Error => 255,
            Self::Unknown(raw) => *raw,
        }
    }

    /// Short snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Cooldown => "cooldown",
            Self::CooldownStarting => "cooldown_starting",
            Self::CooldownReceived => "cooldown_received",
            Self::IgnitionReceived => "ignition_received",
            Self::IgnitionStarting => "ignition_starting",
            Self::Igniting => "igniting",
            Self::Running => "running",
            Self::Heating => "heating",
            Self::Error => "error",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether the burner is starting or burning.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::IgnitionReceived
                | Self::IgnitionStarting
                | Self::Igniting
                | Self::Running
                | Self::Heating
        )
    }

    /// Whether the heater is in any cooldown phase.
    pub fn is_cooling_down(&self) -> bool {
        matches!(
            self,
            Self::Cooldown | Self::CooldownStarting | Self::CooldownReceived
        )
    }
}

impl fmt::Display for HeaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown({})", raw),
            other => f.write_str(other.name()),
        }
    }
}

/// Parsed status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaterStatus {
    /// Leading bytes of the response; echoed frame header, kept for debugging.
    pub header: [u8; 20],
    /// Current operating state.
    pub state: HeaterState,
    /// Operating mode byte.
    pub mode: u8,
    /// Current gear or target temperature, depending on mode.
    pub setting: u8,
    /// Supply voltage in tenths of a volt.
    pub raw_voltage: u8,
    /// Heat exchanger temperature in tenths of a degree.
    pub raw_body_temperature: u16,
    /// Ambient temperature in tenths of a degree.
    pub raw_ambient_temperature: u16,
}

impl HeaterStatus {
    /// Minimum size of a status response.
    pub const MIN_SIZE: usize = 28;

    /// Parse a status response.
    ///
    /// Layout:
    /// - Bytes 0-19: Header
    /// - Byte 20: State
    /// - Byte 21: Mode
    /// - Byte 22: Setting
    /// - Byte 23: Voltage (0.1 V)
    /// - Bytes 24-25: Body temperature (u16 big-endian, 0.1 degree)
    /// - Bytes 26-27: Ambient temperature (u16 big-endian, 0.1 degree)
    ///
    /// Any bytes past 27 are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        debug!("HeaterStatus::parse called with {} bytes: {:02X?}", data.len(), data);

        if data.len() < Self::MIN_SIZE {
            return Err(Error::InvalidData {
                context: format!(
                    "Status data too short: {} bytes (need at least {})",
                    data.len(),
                    Self::MIN_SIZE
                ),
            });
        }

        let mut buf = data;

        let mut header = [0u8; 20];
        buf.copy_to_slice(&mut header);

        Ok(Self {
            header,
            state: HeaterState::from_raw(buf.get_u8()),
            mode: buf.get_u8(),
            setting: buf.get_u8(),
            raw_voltage: buf.get_u8(),
            raw_body_temperature: buf.get_u16(),
            raw_ambient_temperature: buf.get_u16(),
        })
    }

    /// Supply voltage in whole volts (truncated).
    pub fn voltage(&self) -> u8 {
        self.raw_voltage / 10
    }

    /// Heat exchanger temperature in whole degrees (truncated).
    pub fn body_temperature(&self) -> u16 {
        self.raw_body_temperature / 10
    }

    /// Ambient temperature in whole degrees (truncated).
    pub fn ambient_temperature(&self) -> u16 {
        self.raw_ambient_temperature / 10
    }

    /// The user-facing view of this status.
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            heater_state: self.state.to_string(),
            heater_mode: self.mode,
            heater_setting: self.setting,
            voltage: self.voltage(),
            body_temperature: self.body_temperature(),
            ambient_temperature: self.ambient_temperature(),
        }
    }

    /// Render the summary as 4-space indented JSON.
    pub fn to_json(&self) -> Result<String> {
        to_pretty_json(&self.summary())
    }
}

/// Decoded status values, in the shape printed by the command line tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    /// State name.
    pub heater_state: String,
    /// Operating mode byte.
    pub heater_mode: u8,
    /// Current gear or target temperature.
    pub heater_setting: u8,
    /// Supply voltage in volts.
    pub voltage: u8,
    /// Heat exchanger temperature in degrees.
    pub body_temperature: u16,
    /// Ambient temperature in degrees.
    pub ambient_temperature: u16,
}

pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;

    String::from_utf8(out).map_err(|_| Error::InvalidData {
        context: "JSON output was not valid UTF-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_response() -> Vec<u8> {
        let mut data = vec![0u8; 20];
        data[1] = 0x02;
        data.extend_from_slice(&[
            133, // running
            2,   // mode
            25,  // setting
            128, // 12.8 V
            0x03, 0x2a, // 81.0
            0x00, 0xd7, // 21.5
        ]);
        data
    }

    #[test]
    fn test_parse_sample() {
        let status = HeaterStatus::parse(&sample_response()).unwrap();

        assert_eq!(status.state, HeaterState::Running);
        assert_eq!(status.mode, 2);
        assert_eq!(status.setting, 25);
        assert_eq!(status.raw_voltage, 128);
        assert_eq!(status.voltage(), 12);
        assert_eq!(status.raw_body_temperature, 810);
        assert_eq!(status.body_temperature(), 81);
        assert_eq!(status.raw_ambient_temperature, 215);
        assert_eq!(status.ambient_temperature(), 21);
        assert_eq!(status.header[1], 0x02);
    }

    #[test]
    fn test_parse_ignores_trailing_bytes() {
        let mut data = sample_response();
        data.extend_from_slice(&[0xff; 12]);

        let status = HeaterStatus::parse(&data).unwrap();
        assert_eq!(status, HeaterStatus::parse(&sample_response()).unwrap());
    }

    #[test]
    fn test_parse_too_short() {
        let data = sample_response();
        let result = HeaterStatus::parse(&data[..HeaterStatus::MIN_SIZE - 1]);
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_unknown_state_preserved() {
        let mut data = sample_response();
        data[20] = 99;

        let status = HeaterStatus::parse(&data).unwrap();
        assert_eq!(status.state, HeaterState::Unknown(99));
        assert_eq!(status.state.to_raw(), 99);
        assert_eq!(status.state.to_string(), "unknown(99)");
    }

    #[test]
    fn test_state_raw_values() {
        for raw in [0u8, 65, 67, 69, 128, 129, 131, 133, 135, 255] {
            let state = HeaterState::from_raw(raw);
            assert!(!matches!(state, HeaterState::Unknown(_)), "raw {}", raw);
            assert_eq!(state.to_raw(), raw);
        }
    }

    #[test]
    fn test_state_groups() {
        assert!(HeaterState::Heating.is_active());
        assert!(HeaterState::IgnitionReceived.is_active());
        assert!(!HeaterState::Off.is_active());
        assert!(HeaterState::CooldownStarting.is_cooling_down());
        assert!(!HeaterState::Error.is_cooling_down());
    }

    #[test]
    fn test_json_output() {
        let status = HeaterStatus::parse(&sample_response()).unwrap();
        let expected = r#"{
    "heater_state": "running",
    "heater_mode": 2,
    "heater_setting": 25,
    "voltage": 12,
    "body_temperature": 81,
    "ambient_temperature": 21
}"#;
        assert_eq!(status.to_json().unwrap(), expected);
    }

    proptest! {
        #[test]
        fn parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let result = HeaterStatus::parse(&data);
            prop_assert_eq!(result.is_ok(), data.len() >= HeaterStatus::MIN_SIZE);
        }

        #[test]
        fn derived_values_truncate(voltage in any::<u8>(), body in any::<u16>()) {
            let mut data = vec![0u8; HeaterStatus::MIN_SIZE];
            data[23] = voltage;
            data[24..26].copy_from_slice(&body.to_be_bytes());

            let status = HeaterStatus::parse(&data).unwrap();
            prop_assert_eq!(status.voltage(), voltage / 10);
            prop_assert_eq!(status.body_temperature(), body / 10);
        }
    }
}
