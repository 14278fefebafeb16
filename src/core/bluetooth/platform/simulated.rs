//! In-memory BLE backend.
//! Behaves like a radio with one scriptable receiver: the device shows up
//! after a number of scan cycles, failures can be queued for the next scan,
//! connect or write, and every accepted write is recorded.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use super::BlePlatform;
use crate::core::bluetooth::error::PlatformError;
use crate::core::bluetooth::types::DeviceIdentity;

#[derive(Debug, Clone)]
pub struct SimPeripheral {
    address: String,
    session: u64,
}

impl SimPeripheral {
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[derive(Debug, Clone)]
pub struct SimCharacteristic {
    uuid: Uuid,
    session: u64,
}

#[derive(Debug, Clone)]
struct SimDevice {
    address: String,
    appears_after_scans: u32,
    characteristics: Vec<Uuid>,
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimDevice>,
    discovered: BTreeSet<String>,
    scans: u32,
    refreshes: u32,
    enumerated_after_refreshes: u32,
    scan_failures: VecDeque<PlatformError>,
    connect_failures: VecDeque<PlatformError>,
    write_failures: VecDeque<PlatformError>,
    connect_calls: u32,
    session: u64,
    /// Address and session of the live connection
    connected: Option<(String, u64)>,
    writes: Vec<Vec<u8>>,
    /// When each acknowledged write landed
    write_times: Vec<Instant>,
    write_latency: Duration,
}

/// Simulated BLE stack
#[derive(Debug)]
pub struct SimulatedPlatform {
    adapter_name: String,
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new(adapter_name: &str) -> Self {
        Self {
            adapter_name: adapter_name.to_string(),
            state: Mutex::new(SimState::default()),
        }
    }

    /// A receiver matching `identity` that answers the first scan cycle
    pub fn for_identity(identity: &DeviceIdentity) -> Self {
        Self::new(&identity.adapter_name).with_device(
            &identity.hardware_address,
            1,
            &[identity.characteristic_uuid],
        )
    }

    /// Add a device that becomes visible after `appears_after_scans` scan cycles
    pub fn with_device(
        mut self,
        address: &str,
        appears_after_scans: u32,
        characteristics: &[Uuid],
    ) -> Self {
        self.state.get_mut().devices.push(SimDevice {
            address: address.to_uppercase(),
            appears_after_scans,
            characteristics: characteristics.to_vec(),
        });
        self
    }

    /// GATT objects only show up after this many refreshes
    pub fn with_enumeration_delay(mut self, refreshes: u32) -> Self {
        self.state.get_mut().enumerated_after_refreshes = refreshes;
        self
    }

    /// Time each write takes to be acknowledged
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.state.get_mut().write_latency = latency;
        self
    }

    pub async fn fail_next_scan(&self, err: PlatformError) {
        self.state.lock().await.scan_failures.push_back(err);
    }

    pub async fn fail_next_connect(&self, err: PlatformError) {
        self.state.lock().await.connect_failures.push_back(err);
    }

    pub async fn fail_next_write(&self, err: PlatformError) {
        self.state.lock().await.write_failures.push_back(err);
    }

    /// Drop the live connection as if the receiver went out of range
    pub async fn drop_link(&self) {
        self.state.lock().await.connected = None;
    }

    /// Payloads of every acknowledged write, oldest first
    pub async fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.writes.clone()
    }

    /// Acknowledgement time of every write, oldest first
    pub async fn write_times(&self) -> Vec<Instant> {
        self.state.lock().await.write_times.clone()
    }

    pub async fn scan_count(&self) -> u32 {
        self.state.lock().await.scans
    }

    pub async fn connect_count(&self) -> u32 {
        self.state.lock().await.connect_calls
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected.is_some()
    }
}

impl SimState {
    fn is_live(&self, session: u64) -> bool {
        matches!(&self.connected, Some((_, live)) if *live == session)
    }
}

#[async_trait]
impl BlePlatform for SimulatedPlatform {
    type Peripheral = SimPeripheral;
    type Characteristic = SimCharacteristic;

    fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    async fn scan(&self, window: Duration) -> Result<(), PlatformError> {
        sleep(window).await;
        let mut state = self.state.lock().await;
        if let Some(err) = state.scan_failures.pop_front() {
            return Err(err);
        }
        state.scans += 1;
        let scans = state.scans;
        let visible: Vec<String> = state
            .devices
            .iter()
            .filter(|device| device.appears_after_scans <= scans)
            .map(|device| device.address.clone())
            .collect();
        state.discovered.extend(visible);
        Ok(())
    }

    async fn discovered(&self) -> Result<Vec<String>, PlatformError> {
        Ok(self.state.lock().await.discovered.iter().cloned().collect())
    }

    async fn connect(&self, address: &str) -> Result<SimPeripheral, PlatformError> {
        let mut state = self.state.lock().await;
        state.connect_calls += 1;
        if let Some(err) = state.connect_failures.pop_front() {
            return Err(err);
        }
        if !state.discovered.contains(address) {
            return Err(PlatformError::NotFound(format!(
                "device {} has not been discovered",
                address
            )));
        }
        state.session += 1;
        let session = state.session;
        state.connected = Some((address.to_string(), session));
        Ok(SimPeripheral {
            address: address.to_string(),
            session,
        })
    }

    async fn disconnect(&self, peripheral: &SimPeripheral) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        if state.is_live(peripheral.session) {
            state.connected = None;
        }
        Ok(())
    }

    async fn characteristics(
        &self,
        peripheral: &SimPeripheral,
    ) -> Result<Vec<SimCharacteristic>, PlatformError> {
        let state = self.state.lock().await;
        if !state.is_live(peripheral.session) {
            return Err(PlatformError::NotConnected(peripheral.address.clone()));
        }
        if state.refreshes < state.enumerated_after_refreshes {
            return Ok(Vec::new());
        }
        let characteristics = state
            .devices
            .iter()
            .filter(|device| device.address == peripheral.address)
            .flat_map(|device| device.characteristics.iter())
            .map(|uuid| SimCharacteristic {
                uuid: *uuid,
                session: peripheral.session,
            })
            .collect();
        Ok(characteristics)
    }

    async fn refresh(&self, _peripheral: &SimPeripheral) -> Result<(), PlatformError> {
        self.state.lock().await.refreshes += 1;
        Ok(())
    }

    fn characteristic_uuid(&self, characteristic: &SimCharacteristic) -> Uuid {
        characteristic.uuid
    }

    async fn write(
        &self,
        characteristic: &SimCharacteristic,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        let latency = self.state.lock().await.write_latency;
        if !latency.is_zero() {
            sleep(latency).await;
        }
        let mut state = self.state.lock().await;
        if let Some(err) = state.write_failures.pop_front() {
            return Err(err);
        }
        if !state.is_live(characteristic.session) {
            return Err(PlatformError::NotConnected("link dropped".to_string()));
        }
        info!("Write, value: {:?}", data);
        state.writes.push(data.to_vec());
        state.write_times.push(Instant::now());
        Ok(())
    }
}
