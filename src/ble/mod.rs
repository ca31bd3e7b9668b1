//! BLE communication module.
//!
//! This module provides low-level Bluetooth Low Energy functionality
//! for finding and talking to heaters.

pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use connection::{
    connect_with_retry, ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus,
    RetryPolicy,
};
pub use scanner::{parse_address, BleScanner};
pub use transport::{BleTransport, HeaterTransport};
pub use uuids::*;
