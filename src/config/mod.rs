pub mod connection_config;
pub mod device_config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::config::connection_config::ConnectionConfig;
use crate::config::device_config::DeviceConfig;
use crate::core::AdapterSettings;

const CONFIG_DIR_NAME: &str = "wheelchair-bridge";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid hardware address {0:?}, expected XX:XX:XX:XX:XX:XX")]
    InvalidAddress(String),
    #[error("invalid characteristic UUID {0:?}")]
    InvalidUuid(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Which BLE stack the bridge talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The system Bluetooth adapter
    #[default]
    Bluetooth,
    /// An in-process stand-in receiver, for bench testing without hardware
    Simulated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: Backend,
    pub device: DeviceConfig,
    pub connection: ConnectionConfig,
}

impl AppConfig {
    /// `<config dir>/wheelchair-bridge/config.json`, or the working
    /// directory when the platform has no config dir
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .unwrap_or_default()
            .join(CONFIG_FILE_NAME)
    }

    /// Loads the config from a configuration file. A missing file yields
    /// the defaults.
    pub async fn load_config(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&config_json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            create_config_dir(dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(path, config_json).await?;

        info!("Config saved to {:?}.", path);
        Ok(())
    }

    /// Validate every field and produce the adapter's runtime settings
    pub fn adapter_settings(&self) -> Result<AdapterSettings, ConfigError> {
        Ok(AdapterSettings {
            identity: self.device.identity()?,
            neutral: self.device.validated_neutral()?,
            scan_poll_interval: self.connection.scan_poll_interval()?,
            retry: self.connection.retry_policy()?,
            min_write_interval: self.connection.min_write_interval(self.backend),
            flush_interval: self.connection.flush_interval(self.backend)?,
        })
    }
}

/// Create the config directory and its parents if they are missing
async fn create_config_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).await.inspect_err(|e| {
        error!("Failed to create config directory {:?}: {}", dir, e);
    })?;
    info!("Created config directory {:?}", dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::core::bluetooth::UnclassifiedErrorPolicy;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());

        let settings = config.adapter_settings().unwrap();
        assert_eq!(settings.identity.adapter_name, "hci0");
        assert_eq!(settings.neutral, 0);
        assert_eq!(settings.scan_poll_interval, Duration::from_secs(10));
        assert_eq!(settings.retry.delay, Duration::from_secs(2));
        assert_eq!(settings.retry.max_attempts, None);
        assert_eq!(settings.min_write_interval, Duration::from_millis(200));
        assert_eq!(settings.flush_interval, Some(Duration::from_millis(200)));
    }

    #[test]
    fn parses_full_document() {
        let json = r#"{
            "backend": "simulated",
            "device": {
                "adapter": "hci1",
                "address": "aa:bb:cc:dd:ee:ff",
                "characteristic": "ffe1",
                "neutral": -3
            },
            "connection": {
                "scan_poll_interval_ms": 500,
                "retry_delay_ms": 100,
                "idle_flush": false,
                "max_attempts": 4,
                "max_duration_ms": 60000,
                "unclassified_errors": "fatal"
            }
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        assert_eq!(config.backend, Backend::Simulated);

        let settings = config.adapter_settings().unwrap();
        assert_eq!(settings.identity.adapter_name, "hci1");
        assert_eq!(settings.identity.hardware_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(
            settings.identity.characteristic_uuid,
            Uuid::parse_str("0000ffe1-0000-1000-8000-00805f9b34fb").unwrap()
        );
        assert_eq!(settings.neutral, -3);
        assert_eq!(settings.scan_poll_interval, Duration::from_millis(500));
        assert_eq!(settings.retry.max_attempts, Some(4));
        assert_eq!(settings.retry.max_duration, Some(Duration::from_secs(60)));
        assert_eq!(settings.retry.unclassified, UnclassifiedErrorPolicy::Fatal);
        assert_eq!(settings.min_write_interval, Duration::from_millis(20));
        assert_eq!(settings.flush_interval, None);
    }

    #[test]
    fn rejects_bad_address() {
        let mut config = AppConfig::default();
        config.device.address = "AA-BB-CC".to_string();
        assert!(matches!(
            config.adapter_settings(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_bad_uuid() {
        let mut config = AppConfig::default();
        config.device.characteristic = "not-a-uuid".to_string();
        assert!(matches!(
            config.adapter_settings(),
            Err(ConfigError::InvalidUuid(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_neutral() {
        let mut config = AppConfig::default();
        config.device.neutral = 128;
        assert!(matches!(
            config.adapter_settings(),
            Err(ConfigError::InvalidValue { field: "device.neutral", .. })
        ));
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.connection.max_attempts = Some(0);
        assert!(matches!(
            config.adapter_settings(),
            Err(ConfigError::InvalidValue { field: "connection.max_attempts", .. })
        ));
    }

    #[test]
    fn explicit_flush_interval_wins() {
        let mut config = AppConfig::default();
        config.connection.flush_interval_ms = Some(500);
        let settings = config.adapter_settings().unwrap();
        assert_eq!(settings.flush_interval, Some(Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("wheelchair-bridge-missing/config.json");
        let config = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir =
            std::env::temp_dir().join(format!("wheelchair-bridge-bad-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME);
        create_config_dir(&dir).await.unwrap();
        fs::write(&path, "{ not json").await.unwrap();

        let result = AppConfig::load_config(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let dir =
            std::env::temp_dir().join(format!("wheelchair-bridge-save-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.backend = Backend::Simulated;
        config.device.address = "11:22:33:44:55:66".to_string();
        config.save_config(&path).await.unwrap();

        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir).await;
    }
}
