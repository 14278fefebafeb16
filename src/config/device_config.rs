use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::bluetooth::address::{normalize_address, parse_uuid};
use crate::core::bluetooth::{AXIS_LIMIT, DEFAULT_ADAPTER_NAME, DeviceIdentity};

/// Which receiver to connect to. Key names match the receiver's
/// provisioning sheet: `address`, `characteristic`, `neutral`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Local adapter name, e.g. `hci0`
    pub adapter: String,
    /// Hardware address of the receiver, colon-separated hex
    pub address: String,
    /// UUID of the command characteristic; 16/32-bit short forms allowed
    pub characteristic: String,
    /// Input value meaning "no movement". Depends on how the receiver is
    /// wired to the chair.
    pub neutral: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            adapter: DEFAULT_ADAPTER_NAME.to_string(),
            address: "00:00:00:00:00:00".to_string(),
            characteristic: "19B10001-E8F2-537E-4F6C-D104768A1214".to_string(),
            neutral: 0,
        }
    }
}

impl DeviceConfig {
    /// Validate the addressing fields and build the immutable identity
    pub fn identity(&self) -> Result<DeviceIdentity, ConfigError> {
        let address = normalize_address(&self.address)
            .ok_or_else(|| ConfigError::InvalidAddress(self.address.clone()))?;
        let uuid = parse_uuid(&self.characteristic)
            .ok_or_else(|| ConfigError::InvalidUuid(self.characteristic.clone()))?;
        if self.adapter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "device.adapter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(DeviceIdentity::new(self.adapter.trim().to_string(), address, uuid))
    }

    pub fn validated_neutral(&self) -> Result<i32, ConfigError> {
        let limit = i32::from(AXIS_LIMIT);
        if (-limit..=limit).contains(&self.neutral) {
            Ok(self.neutral)
        } else {
            Err(ConfigError::InvalidValue {
                field: "device.neutral",
                reason: format!("{} is outside -{limit}..={limit}", self.neutral),
            })
        }
    }
}
