// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hcalory-control
//!
//! Control HCalory diesel heaters over Bluetooth Low Energy.
//!
//! The heater exposes two GATT characteristics: commands are written to
//! `FFF2` as fixed 22-byte frames, and the status produced by a `pump_data`
//! request is read back from `FFF1`.
//!
//! ## Features
//!
//! - **Discovery**: Find a heater by its Bluetooth address
//! - **Resilient connections**: Bounded retries with per-attempt timeouts and back-off
//! - **Commands**: Start, stop, up/down, gear and thermostat mode
//! - **Status**: State, mode, setting, voltage and temperatures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hcalory_control::{Command, Heater, HeaterConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let heater = Heater::discover("EC:B1:C3:00:4D:61", HeaterConfig::default()).await?;
//!     heater.connect().await?;
//!
//!     let status = heater.get_data().await?;
//!     println!("Heater is {} at {} V", status.state, status.voltage());
//!
//!     if !status.state.is_active() {
//!         heater.send_command(Command::StartHeat).await?;
//!     }
//!
//!     heater.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! CoreBluetooth does not expose MAC addresses. Pass the peripheral UUID
//! reported by the system instead of the address.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ## Feature Flags
//!
//! - `cli` (default): Build the `hcalory-control` binary

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod heater;
pub mod protocol;
pub mod runner;

// Re-exports for convenience
pub use ble::connection::{ConnectionState, RetryPolicy};
pub use ble::transport::{BleTransport, HeaterTransport};
pub use config::HeaterConfig;
pub use error::{Error, Result};
pub use heater::Heater;
pub use protocol::{Command, HeaterState, HeaterStatus, StatusSummary};
pub use runner::{run_command, CommandReport};
