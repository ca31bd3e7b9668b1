//! BLE scanning functionality.
//!
//! Provides the scanner used to locate a heater by its Bluetooth address.

use btleplug::api::{BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

/// Parse a MAC address such as `AA:BB:CC:DD:EE:FF`.
pub fn parse_address(address: &str) -> Result<BDAddr> {
    BDAddr::from_str(address.trim()).map_err(|_| Error::InvalidParameter {
        name: "address".to_string(),
        value: address.to_string(),
    })
}

/// Whether a peripheral matches the requested address.
///
/// CoreBluetooth hides MAC addresses and reports an all-zero address, so the
/// platform identifier is compared as well.
fn matches_target(address: BDAddr, id: &PeripheralId, target: BDAddr, target_text: &str) -> bool {
    if address == target {
        return true;
    }
    id.to_string().eq_ignore_ascii_case(target_text)
}

/// BLE scanner for locating heaters.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl BleScanner {
    /// Create a new BLE scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Scan until a peripheral with the given address shows up.
    ///
    /// Returns `Ok(None)` if nothing matched before `timeout` elapsed. The scan
    /// is stopped before returning in every case.
    pub async fn find_device_by_address(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Option<Peripheral>> {
        let target = parse_address(address)?;
        let target_text = address.trim();

        info!("Scanning for heater {} ({:?} timeout)", target, timeout);

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        let result = self
            .wait_for_device(&mut events, target, target_text, timeout)
            .await;

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        result
    }

    async fn wait_for_device(
        &self,
        events: &mut (impl futures::Stream<Item = CentralEvent> + Unpin),
        target: BDAddr,
        target_text: &str,
        timeout: Duration,
    ) -> Result<Option<Peripheral>> {
        // The adapter may already know the device from an earlier scan.
        for peripheral in self.adapter.peripherals().await.map_err(Error::Bluetooth)? {
            if matches_target(peripheral.address(), &peripheral.id(), target, target_text) {
                debug!("Heater {} already known to adapter", target);
                return Ok(Some(peripheral));
            }
        }

        let deadline = Instant::now() + timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!("Adapter event stream ended");
                    return Ok(None);
                }
                Err(_) => {
                    debug!("Scan for {} timed out", target);
                    return Ok(None);
                }
            };

            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };

            let peripheral = match self.adapter.peripheral(&id).await {
                Ok(p) => p,
                Err(e) => {
                    trace!("Failed to get peripheral: {}", e);
                    continue;
                }
            };

            trace!("Saw peripheral {} ({:?})", peripheral.address(), id);

            if matches_target(peripheral.address(), &id, target, target_text) {
                info!("Found heater {}", target);
                return Ok(Some(peripheral));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr = parse_address("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(addr.into_inner(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        let lower = parse_address(" aa:bb:cc:dd:ee:ff ").unwrap();
        assert_eq!(lower, addr);
    }

    #[test]
    fn test_parse_address_invalid() {
        match parse_address("not-an-address") {
            Err(Error::InvalidParameter { name, value }) => {
                assert_eq!(name, "address");
                assert_eq!(value, "not-an-address");
            }
            other => panic!("expected invalid parameter, got {:?}", other),
        }
    }
}
