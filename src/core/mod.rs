//! Core functionality for the wheelchair bridge
//! This module contains the BLE connection manager and the adapter the rest
//! of the application uses to drive the wheelchair.

pub mod bluetooth;
pub mod wheelchair;

// Re-export commonly used types
pub use bluetooth::{ConnectionState, WheelchairEvent};
pub use wheelchair::{AdapterSettings, WheelchairAdapter};
