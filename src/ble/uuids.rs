//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for heater communication.

use uuid::Uuid;

/// Heater control service UUID.
pub const HEATER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_fff0_0000_1000_8000_00805f9b34fb);
/// Status characteristic UUID (Read). Holds the latest response after a `pump_data`.
pub const READ_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_fff1_0000_1000_8000_00805f9b34fb);
/// Command characteristic UUID (Write).
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_fff2_0000_1000_8000_00805f9b34fb);

/// Check if a characteristic UUID belongs to the heater protocol.
pub fn is_heater_characteristic(uuid: &Uuid) -> bool {
    *uuid == READ_CHARACTERISTIC_UUID || *uuid == WRITE_CHARACTERISTIC_UUID
}
