//! Wheelchair bridge library
//! BLE connection manager that keeps a link to the wheelchair receiver and
//! turns joystick input into rate-limited movement commands.

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::{AppConfig, Backend, ConfigError};
pub use crate::core::bluetooth::{Axis, DeviceIdentity, EncodedCommand, SkipReason, WriteOutcome};
pub use crate::core::{AdapterSettings, ConnectionState, WheelchairAdapter, WheelchairEvent};
