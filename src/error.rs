//! Error types for the hcalory-control crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No heater was seen at the requested address during the scan.
    #[error("Device not found at address: {address}")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Operation requires a connection but the heater is not connected.
    #[error("Heater not connected")]
    NotConnected,

    /// Failed to establish a connection to the heater.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection to the heater was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// A BLE operation did not complete in time.
    #[error("Timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// Invalid data was received from the heater.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// Checksum check failed for a command frame.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// The checksum computed over the frame payload.
        expected: u8,
        /// The checksum carried in the frame.
        actual: u8,
    },

    /// The command name is not one the heater understands.
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The name that failed to parse.
        name: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Status output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::DeviceNotFound {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Device not found at address: AA:BB:CC:DD:EE:FF"
        );

        let err = Error::ChecksumMismatch {
            expected: 0x0e,
            actual: 0x0d,
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x0e, got 0x0d");
    }
}
