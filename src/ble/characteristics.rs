//! GATT characteristic handling.
//!
//! Provides functionality for reading and writing BLE characteristics on a
//! heater.

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Handler for GATT characteristics on a heater.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
    /// Upper bound on a single read or write.
    io_timeout: Duration,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    ///
    /// Note: Services must be discovered before using this handler.
    pub fn new(peripheral: Peripheral, io_timeout: Duration) -> Self {
        Self {
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
            io_timeout,
        }
    }

    /// Discover and cache all characteristics.
    ///
    /// This should be called after connecting and discovering services.
    pub fn discover_characteristics(&self) -> Result<()> {
        let services = self.peripheral.services();

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid, service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!("Discovered {} characteristics", chars.len());

        let found = heater_characteristic_count(chars.keys());
        if found < 2 {
            warn!(
                "Only {} of 2 heater characteristics ({}, {}) found after discovery",
                found, READ_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID
            );
        }

        Ok(())
    }

    /// Check if a characteristic exists.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.read().contains_key(uuid)
    }

    /// Get a characteristic by UUID.
    pub fn get_characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Read a characteristic value.
    pub async fn read(&self, uuid: &Uuid) -> Result<Vec<u8>> {
        let characteristic = self.get_characteristic(uuid)?;

        let data = self
            .bounded(format!("read of {}", uuid), self.peripheral.read(&characteristic))
            .await?;

        trace!("Read {} bytes from characteristic {}", data.len(), uuid);

        Ok(data)
    }

    /// Write to a characteristic.
    pub async fn write(&self, uuid: &Uuid, data: &[u8], with_response: bool) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.bounded(
            format!("write to {}", uuid),
            self.peripheral.write(&characteristic, data, write_type),
        )
        .await?;

        trace!("Wrote {} bytes to characteristic {}: {:02X?}", data.len(), uuid, data);

        Ok(())
    }

    async fn bounded<T>(
        &self,
        operation: String,
        fut: impl Future<Output = btleplug::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => result.map_err(Error::Bluetooth),
            Err(_) => Err(Error::Timeout { operation }),
        }
    }
}

fn heater_characteristic_count<'a>(uuids: impl IntoIterator<Item = &'a Uuid>) -> usize {
    uuids
        .into_iter()
        .filter(|uuid| is_heater_characteristic(uuid))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heater_characteristic_count() {
        let battery = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

        assert_eq!(
            heater_characteristic_count(&[
                READ_CHARACTERISTIC_UUID,
                WRITE_CHARACTERISTIC_UUID,
                battery
            ]),
            2
        );
        assert_eq!(
            heater_characteristic_count(&[READ_CHARACTERISTIC_UUID, HEATER_SERVICE_UUID]),
            1
        );
        assert_eq!(heater_characteristic_count(&[battery]), 0);
    }

    #[test]
    fn test_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CharacteristicHandler>();
    }
}
