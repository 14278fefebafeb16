//! Real BLE backend built on `bluest`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bluest::error::ErrorKind;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

use super::BlePlatform;
use crate::core::bluetooth::address::extract_mac_address;
use crate::core::bluetooth::error::PlatformError;

/// BLE stack of the host, through `bluest`
pub struct BluestPlatform {
    adapter: Adapter,
    adapter_name: String,
    /// Devices seen by any scan cycle, keyed by hardware address
    devices: Arc<Mutex<HashMap<String, Device>>>,
    scanning: AtomicBool,
}

impl BluestPlatform {
    /// Open the system Bluetooth adapter and wait until it is powered
    pub async fn new(adapter_name: &str) -> Result<Self, PlatformError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| {
                PlatformError::AdapterUnavailable("No Bluetooth adapter found".to_string())
            })?;
        adapter.wait_available().await.map_err(classify)?;
        // bluest always drives the system default adapter
        info!("Bluetooth adapter is available (configured as {}).", adapter_name);

        Ok(Self {
            adapter,
            adapter_name: adapter_name.to_string(),
            devices: Arc::new(Mutex::new(HashMap::new())),
            scanning: AtomicBool::new(false),
        })
    }

    async fn remember(&self, device: Device) {
        let id = device.id().to_string();
        let address = extract_mac_address(&id).unwrap_or_else(|| id.to_uppercase());
        let mut devices = self.devices.lock().await;
        if !devices.contains_key(&address) {
            debug!("Discovered device {} ({})", address, device.name().unwrap_or_default());
        }
        devices.insert(address, device);
    }

    async fn scan_window(&self, window: Duration) -> Result<(), PlatformError> {
        for device in self.adapter.connected_devices().await.map_err(classify)? {
            self.remember(device).await;
        }

        let mut scan_stream = self.adapter.scan(&[]).await.map_err(classify)?;
        let deadline = sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            self.remember(discovered_device.device).await;
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn device(&self, address: &str) -> Result<Device, PlatformError> {
        let devices = self.devices.lock().await;
        devices
            .get(address)
            .cloned()
            .ok_or_else(|| {
                PlatformError::NotFound(format!("device {} has not been discovered", address))
            })
    }
}

/// Clears the scanning flag even if the scan future is dropped midway
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[async_trait]
impl BlePlatform for BluestPlatform {
    type Peripheral = Device;
    type Characteristic = Characteristic;

    fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    async fn scan(&self, window: Duration) -> Result<(), PlatformError> {
        if self.scanning.swap(true, Ordering::AcqRel) {
            return Err(PlatformError::InProgress("scan already running".to_string()));
        }
        let _guard = ScanGuard(&self.scanning);
        self.scan_window(window).await
    }

    async fn discovered(&self) -> Result<Vec<String>, PlatformError> {
        Ok(self.devices.lock().await.keys().cloned().collect())
    }

    async fn connect(&self, address: &str) -> Result<Device, PlatformError> {
        let device = self.device(address).await?;
        if device.is_connected().await {
            info!("Device {} already connected.", address);
            return Ok(device);
        }
        info!("Initiating connection to {}...", address);
        self.adapter.connect_device(&device).await.map_err(classify)?;
        Ok(device)
    }

    async fn disconnect(&self, device: &Device) -> Result<(), PlatformError> {
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter.disconnect_device(device).await.map_err(classify)?;
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }

    async fn characteristics(&self, device: &Device) -> Result<Vec<Characteristic>, PlatformError> {
        let mut found = Vec::new();
        for service in device.services().await.map_err(classify)? {
            match service.characteristics().await {
                Ok(characteristics) => found.extend(characteristics),
                Err(e) => warn!("Skipping service {}: {}", service.uuid(), e),
            }
        }
        Ok(found)
    }

    async fn refresh(&self, device: &Device) -> Result<(), PlatformError> {
        for service in device.discover_services().await.map_err(classify)? {
            service.discover_characteristics().await.map_err(classify)?;
        }
        Ok(())
    }

    fn characteristic_uuid(&self, characteristic: &Characteristic) -> Uuid {
        characteristic.uuid()
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        characteristic.write(data).await.map_err(classify)
    }
}

fn classify(err: bluest::Error) -> PlatformError {
    match err.kind() {
        ErrorKind::AlreadyScanning => PlatformError::InProgress(err.to_string()),
        ErrorKind::NotConnected => PlatformError::NotConnected(err.to_string()),
        ErrorKind::AdapterUnavailable => PlatformError::AdapterUnavailable(err.to_string()),
        ErrorKind::NotFound => PlatformError::NotFound(err.to_string()),
        _ => PlatformError::from_message(err.to_string()),
    }
}
