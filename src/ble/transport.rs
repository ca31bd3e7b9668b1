//! The link between a [`Heater`](crate::Heater) and the radio.
//!
//! [`HeaterTransport`] is the narrow set of BLE operations the heater facade
//! needs. [`BleTransport`] implements it over btleplug.

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::{Adapter, Peripheral};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::connection::{ConnectionEvent, ConnectionManager, ConnectionState, RetryPolicy};
use crate::error::Result;

/// BLE operations used to talk to a heater.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HeaterTransport: Send + Sync {
    /// Address of the remote device, for logging.
    fn address(&self) -> String;

    /// Establish the link, retrying as configured.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down. Must be a no-op when not connected.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up.
    async fn is_connected(&self) -> bool;

    /// Write `data` to the characteristic `uuid`, with response.
    async fn write(&self, uuid: Uuid, data: Vec<u8>) -> Result<()>;

    /// Read the current value of the characteristic `uuid`.
    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>>;
}

/// [`HeaterTransport`] over a btleplug peripheral.
pub struct BleTransport {
    connection: ConnectionManager,
    characteristics: CharacteristicHandler,
}

impl BleTransport {
    /// Create a transport for a discovered peripheral.
    pub fn new(
        adapter: Adapter,
        peripheral: Peripheral,
        policy: RetryPolicy,
        io_timeout: Duration,
    ) -> Self {
        let characteristics = CharacteristicHandler::new(peripheral.clone(), io_timeout);

        Self {
            connection: ConnectionManager::new(adapter, peripheral, policy),
            characteristics,
        }
    }

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }
}

#[async_trait]
impl HeaterTransport for BleTransport {
    fn address(&self) -> String {
        self.connection.peripheral().address().to_string()
    }

    async fn connect(&self) -> Result<()> {
        self.connection.connect().await?;
        self.characteristics.discover_characteristics()
    }

    async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    async fn is_connected(&self) -> bool {
        self.connection.refresh().await
    }

    async fn write(&self, uuid: Uuid, data: Vec<u8>) -> Result<()> {
        self.characteristics.write(&uuid, &data, true).await
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>> {
        self.characteristics.read(&uuid).await
    }
}
