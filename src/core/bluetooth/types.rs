//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Connection state of the wheelchair link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Identifies which physical peripheral and GATT characteristic to target.
/// Built once from the configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Name of the local adapter, e.g. `hci0`
    pub adapter_name: String,
    /// Hardware address of the receiver, uppercase and colon separated
    pub hardware_address: String,
    /// UUID of the writable command characteristic
    pub characteristic_uuid: Uuid,
}

impl DeviceIdentity {
    pub fn new(adapter_name: String, hardware_address: String, characteristic_uuid: Uuid) -> Self {
        Self {
            adapter_name,
            hardware_address,
            characteristic_uuid,
        }
    }
}

/// Command axis that can be gated by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    Drive,
    Turn,
}

/// Events published by the BLE core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WheelchairEvent {
    /// The connection state machine entered a new state
    StatusChanged(ConnectionState),
    /// A command was written to the characteristic
    CommandSent(super::commands::EncodedCommand),
    /// An axis was enabled or disabled
    AxisEnableChanged { axis: Axis, enabled: bool },
    /// A connect attempt was abandoned by the retry policy
    ConnectionFailed(String),
}
