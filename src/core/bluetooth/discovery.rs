//! Locating the wheelchair receiver and its command characteristic.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::error::PlatformError;
use crate::core::bluetooth::platform::BlePlatform;
use crate::core::bluetooth::retry::{Abort, RetryBudget, pause};
use crate::core::bluetooth::types::DeviceIdentity;

/// Why characteristic resolution stopped without a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Cancelled,
    /// The peripheral dropped while its GATT objects were enumerated
    LinkLost(PlatformError),
}

pub struct PeripheralDiscovery<P: BlePlatform> {
    platform: Arc<P>,
    poll_interval: Duration,
    refresh_delay: Duration,
}

impl<P: BlePlatform> PeripheralDiscovery<P> {
    pub fn new(platform: Arc<P>, poll_interval: Duration, refresh_delay: Duration) -> Self {
        Self {
            platform,
            poll_interval,
            refresh_delay,
        }
    }

    /// Scan until the configured address shows up in the discovered set.
    ///
    /// Every scan cycle lasts `poll_interval`. A scan that fails because one
    /// is already running is ignored: the set from earlier cycles is kept and
    /// checked anyway.
    pub async fn find(
        &self,
        identity: &DeviceIdentity,
        token: &CancellationToken,
        budget: &mut RetryBudget,
    ) -> Result<(), Abort> {
        info!(
            "Searching for wheelchair {} on {}",
            identity.hardware_address,
            self.platform.adapter_name()
        );
        loop {
            if token.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            let scan = tokio::select! {
                result = self.platform.scan(self.poll_interval) => result,
                _ = token.cancelled() => return Err(Abort::Cancelled),
            };
            match scan {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    debug!("Scan already running, waiting one cycle: {}", e);
                    pause(self.poll_interval, token).await?;
                }
                Err(e) => {
                    warn!("Scan cycle failed: {}", e);
                    budget.on_error(&e)?;
                    pause(budget.delay(), token).await?;
                }
            }

            match self.platform.discovered().await {
                Ok(addresses)
                    if addresses
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(&identity.hardware_address)) =>
                {
                    info!("Found wheelchair {}", identity.hardware_address);
                    return Ok(());
                }
                Ok(addresses) => {
                    debug!("Wheelchair not seen yet, {} devices discovered", addresses.len());
                    budget.charge(format!("device {} not found", identity.hardware_address))?;
                }
                Err(e) => {
                    warn!("Could not list discovered devices: {}", e);
                    budget.on_error(&e)?;
                }
            }
        }
    }

    /// Find the characteristic whose UUID equals `uuid` on a connected
    /// peripheral, refreshing the GATT objects until the stack has
    /// enumerated it. Only cancellation or a dropped link end the search.
    pub async fn resolve_characteristic(
        &self,
        peripheral: &P::Peripheral,
        uuid: Uuid,
        token: &CancellationToken,
    ) -> Result<P::Characteristic, ResolveError> {
        info!("Connection successful, resolving characteristic {}...", uuid);
        loop {
            if token.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            match self.platform.characteristics(peripheral).await {
                Ok(characteristics) => {
                    let found = characteristics
                        .into_iter()
                        .find(|c| self.platform.characteristic_uuid(c) == uuid);
                    if let Some(characteristic) = found {
                        info!("Found command characteristic: {}", uuid);
                        return Ok(characteristic);
                    }
                    debug!("Characteristic {} not enumerated yet, refreshing", uuid);
                }
                Err(e) if e.is_not_connected() => return Err(ResolveError::LinkLost(e)),
                Err(e) => warn!("Failed to enumerate characteristics: {}", e),
            }

            if let Err(e) = self.platform.refresh(peripheral).await {
                if e.is_not_connected() {
                    return Err(ResolveError::LinkLost(e));
                }
                debug!("Refreshing GATT objects failed: {}", e);
            }
            if pause(self.refresh_delay, token).await.is_err() {
                return Err(ResolveError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::platform::SimulatedPlatform;
    use crate::core::bluetooth::retry::RetryPolicy;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn identity(uuid: Uuid) -> DeviceIdentity {
        DeviceIdentity::new("hci0".into(), ADDRESS.into(), uuid)
    }

    fn uuid() -> Uuid {
        crate::core::bluetooth::address::parse_uuid("1234").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn find_polls_until_device_appears() {
        let platform =
            Arc::new(SimulatedPlatform::new("hci0").with_device(ADDRESS, 2, &[uuid()]));
        let discovery = PeripheralDiscovery::new(
            platform.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        let mut budget = RetryPolicy::forever(Duration::from_secs(1)).budget();

        discovery
            .find(&identity(uuid()), &CancellationToken::new(), &mut budget)
            .await
            .unwrap();
        assert_eq!(platform.scan_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn find_ignores_already_scanning() {
        let platform = Arc::new(SimulatedPlatform::new("hci0").with_device(ADDRESS, 1, &[uuid()]));
        platform
            .fail_next_scan(PlatformError::InProgress("already scanning".into()))
            .await;
        let discovery = PeripheralDiscovery::new(
            platform.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        let policy = RetryPolicy {
            unclassified: crate::core::bluetooth::retry::UnclassifiedErrorPolicy::Fatal,
            ..RetryPolicy::forever(Duration::from_secs(1))
        };
        let mut budget = policy.budget();

        discovery
            .find(&identity(uuid()), &CancellationToken::new(), &mut budget)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn find_stops_when_cancelled() {
        let platform = Arc::new(SimulatedPlatform::new("hci0"));
        let discovery = PeripheralDiscovery::new(
            platform.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        let mut budget = RetryPolicy::forever(Duration::from_secs(1)).budget();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(35)).await;
            canceller.cancel();
        });

        let result = discovery.find(&identity(uuid()), &token, &mut budget).await;
        assert_eq!(result, Err(Abort::Cancelled));
        assert_eq!(platform.scan_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn find_gives_up_when_bounded() {
        let platform = Arc::new(SimulatedPlatform::new("hci0"));
        let discovery = PeripheralDiscovery::new(
            platform,
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        let policy = RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::forever(Duration::from_secs(1))
        };
        let mut budget = policy.budget();

        let result = discovery
            .find(&identity(uuid()), &CancellationToken::new(), &mut budget)
            .await;
        assert!(matches!(result, Err(Abort::Exhausted { attempts: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_refreshes_until_enumerated() {
        let platform = Arc::new(
            SimulatedPlatform::new("hci0")
                .with_device(ADDRESS, 1, &[Uuid::from_u128(1), uuid()])
                .with_enumeration_delay(2),
        );
        platform.scan(Duration::from_secs(1)).await.unwrap();
        let peripheral = platform.connect(ADDRESS).await.unwrap();
        let discovery = PeripheralDiscovery::new(
            platform.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );

        let characteristic = discovery
            .resolve_characteristic(&peripheral, uuid(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(platform.characteristic_uuid(&characteristic), uuid());
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_reports_dropped_link() {
        let platform = Arc::new(SimulatedPlatform::new("hci0").with_device(ADDRESS, 1, &[uuid()]));
        platform.scan(Duration::from_secs(1)).await.unwrap();
        let peripheral = platform.connect(ADDRESS).await.unwrap();
        platform.drop_link().await;
        let discovery = PeripheralDiscovery::new(
            platform,
            Duration::from_secs(10),
            Duration::from_secs(1),
        );

        let result = discovery
            .resolve_characteristic(&peripheral, uuid(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ResolveError::LinkLost(_))));
    }
}
