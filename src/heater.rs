//! Heater struct and methods.
//!
//! Represents a single HCalory diesel heater reachable over BLE.

use tracing::{error, info};

use crate::ble::scanner::BleScanner;
use crate::ble::transport::{BleTransport, HeaterTransport};
use crate::ble::uuids::{READ_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID};
use crate::config::HeaterConfig;
use crate::error::{Error, Result};
use crate::protocol::{Command, HeaterStatus};

/// A heater and the link used to reach it.
pub struct Heater<T: HeaterTransport = BleTransport> {
    transport: T,
    config: HeaterConfig,
}

impl Heater<BleTransport> {
    /// Scan for the heater at `address` and prepare a BLE link to it.
    ///
    /// Does not connect; call [`Heater::connect`] or send a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the heater is not seen within the
    /// configured scan timeout.
    pub async fn discover(address: &str, config: HeaterConfig) -> Result<Self> {
        config.validate()?;

        let scanner = BleScanner::new().await?;
        let peripheral = scanner
            .find_device_by_address(address, config.scan_timeout)
            .await?
            .ok_or_else(|| {
                error!("Device not found at address: {}", address);
                Error::DeviceNotFound {
                    address: address.to_string(),
                }
            })?;

        let transport = BleTransport::new(
            scanner.adapter().clone(),
            peripheral,
            config.retry_policy(),
            config.io_timeout,
        );

        Ok(Self::with_transport(transport, config))
    }
}

impl<T: HeaterTransport> Heater<T> {
    /// Create a heater over an existing transport.
    pub fn with_transport(transport: T, config: HeaterConfig) -> Self {
        Self { transport, config }
    }

    /// Get the heater's address.
    pub fn address(&self) -> String {
        self.transport.address()
    }

    /// Get the configuration.
    pub fn config(&self) -> &HeaterConfig {
        &self.config
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the link is currently up.
    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Connect to the heater.
    pub async fn connect(&self) -> Result<()> {
        match self.transport.connect().await {
            Ok(()) => {
                info!("Connected to heater: {}", self.address());
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to heater {}: {}", self.address(), e);
                Err(e)
            }
        }
    }

    /// Disconnect from the heater.
    ///
    /// Always delegates to the transport, which closes any BLE link still up.
    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await?;
        info!("Disconnected from heater: {}", self.address());
        Ok(())
    }

    /// Send a command, reconnecting first if the link has dropped.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        if !self.transport.is_connected().await {
            self.connect().await?;
        }

        match self
            .transport
            .write(WRITE_CHARACTERISTIC_UUID, command.encode())
            .await
        {
            Ok(()) => {
                info!("Sent command {} to heater {}", command, self.address());
                Ok(())
            }
            Err(e) => {
                error!("Failed to send command {}: {}", command, e);
                Err(e)
            }
        }
    }

    /// Request and read the heater's current status.
    pub async fn get_data(&self) -> Result<HeaterStatus> {
        self.send_command(Command::PumpData).await?;

        let data = self.transport.read(READ_CHARACTERISTIC_UUID).await?;
        let status = HeaterStatus::parse(&data)?;

        info!("Received data: {:?}", status.summary());

        Ok(status)
    }
}
