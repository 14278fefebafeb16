//! Bluetooth functionality for the wheelchair bridge
//! This module handles all bluetooth operations including scanning,
//! connecting, and writing movement commands to the wheelchair receiver.

pub mod address;
mod commands;
mod connection;
mod constants;
mod discovery;
mod error;
mod notification;
pub mod platform;
mod rate_limiter;
mod retry;
mod types;
mod writer;

// Re-export types that should be publicly accessible
pub use commands::{BarLevels, Command, EncodedCommand, decode_axis, encode, encode_axis};
pub use connection::{ConnectionStateMachine, Link};
pub use constants::*; // Re-export all constants
pub use discovery::{PeripheralDiscovery, ResolveError};
pub use error::PlatformError;
pub use notification::{AxisGate, Notifier};
pub use platform::{BlePlatform, BluestPlatform, SimulatedPlatform};
pub use rate_limiter::RateLimiter;
pub use retry::{Abort, RetryBudget, RetryPolicy, UnclassifiedErrorPolicy};
pub use types::{Axis, ConnectionState, DeviceIdentity, WheelchairEvent};
pub use writer::{CommandWriter, SkipReason, WriteOutcome};
