//! Platform BLE stack abstraction
//! The BLE core talks to the radio only through [`BlePlatform`]. The real
//! backend wraps `bluest`; the simulated backend keeps everything in memory.

mod native;
mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::error::PlatformError;

pub use native::BluestPlatform;
pub use simulated::SimulatedPlatform;

/// Capabilities the connection manager needs from a BLE stack
#[async_trait]
pub trait BlePlatform: Send + Sync + 'static {
    /// Handle to a connected peripheral
    type Peripheral: Clone + Send + Sync + 'static;
    /// Handle to a GATT characteristic of a connected peripheral
    type Characteristic: Clone + Send + Sync + 'static;

    /// Name of the local adapter in use
    fn adapter_name(&self) -> &str;

    /// Run one scan cycle lasting `window`. Devices found are added to the
    /// retained discovered set.
    async fn scan(&self, window: Duration) -> Result<(), PlatformError>;

    /// Hardware addresses discovered so far, uppercase and colon separated
    async fn discovered(&self) -> Result<Vec<String>, PlatformError>;

    /// Open a GATT connection to a discovered device
    async fn connect(&self, address: &str) -> Result<Self::Peripheral, PlatformError>;

    async fn disconnect(&self, peripheral: &Self::Peripheral) -> Result<(), PlatformError>;

    /// GATT characteristics enumerated so far for `peripheral`
    async fn characteristics(
        &self,
        peripheral: &Self::Peripheral,
    ) -> Result<Vec<Self::Characteristic>, PlatformError>;

    /// Ask the stack to re-enumerate the GATT objects of `peripheral`
    async fn refresh(&self, peripheral: &Self::Peripheral) -> Result<(), PlatformError>;

    fn characteristic_uuid(&self, characteristic: &Self::Characteristic) -> Uuid;

    /// Write with response; the receiver firmware requires acknowledged writes
    async fn write(
        &self,
        characteristic: &Self::Characteristic,
        data: &[u8],
    ) -> Result<(), PlatformError>;
}
