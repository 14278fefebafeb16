//! Constants used throughout the application
//! This module contains all the constant values used by the BLE core,
//! such as UUID bases, timing defaults, and wire-format values.

use uuid::Uuid;

/// The Bluetooth base UUID, used to expand 16-bit and 32-bit short UUIDs
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x00000000_0000_1000_8000_00805f9b34fb);

/// Default adapter name (BlueZ naming)
pub const DEFAULT_ADAPTER_NAME: &str = "hci0";

/// Largest magnitude accepted on either command axis
pub const AXIS_LIMIT: i16 = 127;

/// Number of bytes in one command written to the receiver
pub const COMMAND_PACKET_SIZE: usize = 2;

/// Minimum delay between two writes for the real receiver in milliseconds.
/// Shorter spacing makes the receiver queue commands and replay them late.
pub const BLUETOOTH_MIN_WRITE_INTERVAL_MS: u64 = 200;

/// Minimum delay between two writes for the simulated backend in milliseconds
pub const SIMULATED_MIN_WRITE_INTERVAL_MS: u64 = 20;

/// Length of one scan cycle while looking for the receiver in milliseconds
pub const DEFAULT_SCAN_POLL_INTERVAL_MS: u64 = 10_000;

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 2_000;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
