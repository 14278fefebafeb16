//! Bluetooth connection handling for the wheelchair receiver
//! This module owns the connection state and the peripheral and
//! characteristic handles. Every transition goes through one lock, and every
//! transition is published through the [`Notifier`] while that lock is held.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::discovery::{PeripheralDiscovery, ResolveError};
use crate::core::bluetooth::notification::Notifier;
use crate::core::bluetooth::platform::BlePlatform;
use crate::core::bluetooth::retry::{Abort, RetryBudget, RetryPolicy, pause};
use crate::core::bluetooth::types::{ConnectionState, DeviceIdentity};

/// Handles of a live connection. Only handed out while Connected.
pub struct Link<P: BlePlatform> {
    /// Connect attempt that produced this link
    pub epoch: u64,
    pub peripheral: P::Peripheral,
    pub characteristic: P::Characteristic,
}

impl<P: BlePlatform> Clone for Link<P> {
    fn clone(&self) -> Self {
        Self {
            epoch: self.epoch,
            peripheral: self.peripheral.clone(),
            characteristic: self.characteristic.clone(),
        }
    }
}

struct Inner<P: BlePlatform> {
    state: ConnectionState,
    /// Bumped on every connect, disconnect and link loss so results of a
    /// superseded attempt can be recognised and dropped
    epoch: u64,
    link: Option<Link<P>>,
    cancel: CancellationToken,
}

/// Disconnected → Connecting → Connected state machine
pub struct ConnectionStateMachine<P: BlePlatform> {
    platform: Arc<P>,
    identity: DeviceIdentity,
    discovery: PeripheralDiscovery<P>,
    policy: RetryPolicy,
    notifier: Notifier,
    inner: Mutex<Inner<P>>,
}

impl<P: BlePlatform> ConnectionStateMachine<P> {
    pub fn new(
        platform: Arc<P>,
        identity: DeviceIdentity,
        discovery: PeripheralDiscovery<P>,
        policy: RetryPolicy,
        notifier: Notifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform,
            identity,
            discovery,
            policy,
            notifier,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                epoch: 0,
                link: None,
                cancel: CancellationToken::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Handles of the live connection, if Connected
    pub fn link(&self) -> Option<Link<P>> {
        let inner = self.lock();
        match inner.state {
            ConnectionState::Connected => inner.link.clone(),
            _ => None,
        }
    }

    /// Run `f` with the live link while holding the state lock, so no
    /// transition can happen until `f` returns. `None` unless Connected.
    pub fn with_link<R>(&self, f: impl FnOnce(&Link<P>) -> R) -> Option<R> {
        let inner = self.lock();
        match (&inner.state, &inner.link) {
            (ConnectionState::Connected, Some(link)) => Some(f(link)),
            _ => None,
        }
    }

    /// Run `f` only if Connected, without letting the state change meanwhile
    pub fn if_connected<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let inner = self.lock();
        (inner.state == ConnectionState::Connected).then(f)
    }

    /// Start discovery and connect in the background. Ignored unless
    /// Disconnected.
    pub fn connect(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Disconnected {
            debug!("Connect requested while {}, ignoring", inner.state);
            return;
        }
        self.begin_connecting(&mut inner);
    }

    /// Cancel a connect attempt or close the live connection
    pub async fn disconnect(&self) {
        let link = {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Disconnected => {
                    debug!("Disconnect requested while already disconnected");
                    return;
                }
                ConnectionState::Connecting => {
                    info!("Cancelling connect attempt");
                    inner.cancel.cancel();
                    inner.epoch += 1;
                    self.transition(&mut inner, ConnectionState::Disconnected);
                    return;
                }
                ConnectionState::Connected => {
                    inner.epoch += 1;
                    let link = inner.link.take();
                    self.transition(&mut inner, ConnectionState::Disconnected);
                    link
                }
            }
        };

        if let Some(link) = link {
            if let Err(e) = self.platform.disconnect(&link.peripheral).await {
                warn!("Failed to disconnect cleanly: {}", e);
            }
        }
    }

    /// A write on the link from `epoch` failed with "not connected". Drops
    /// the handles and starts over with discovery. Reports about an older
    /// link are ignored.
    pub fn link_lost(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connected || inner.epoch != epoch {
            debug!("Ignoring link loss of stale connection {}", epoch);
            return;
        }
        warn!("Wheelchair has disconnected. Trying to reconnect.");
        inner.link = None;
        self.transition(&mut inner, ConnectionState::Disconnected);
        self.begin_connecting(&mut inner);
    }

    fn transition(&self, inner: &mut Inner<P>, state: ConnectionState) {
        inner.state = state;
        info!("Connection state: {}", state);
        self.notifier.status_changed(state);
    }

    fn begin_connecting(self: &Arc<Self>, inner: &mut Inner<P>) {
        inner.epoch += 1;
        inner.cancel = CancellationToken::new();
        self.transition(inner, ConnectionState::Connecting);

        let machine = Arc::clone(self);
        let epoch = inner.epoch;
        let token = inner.cancel.clone();
        tokio::spawn(async move {
            machine.run_connect(epoch, token).await;
        });
    }

    async fn run_connect(self: Arc<Self>, epoch: u64, token: CancellationToken) {
        let result = self.establish(&token).await;

        let superseded = {
            let mut inner = self.lock();
            let current = inner.epoch == epoch && inner.state == ConnectionState::Connecting;
            match result {
                Ok((peripheral, characteristic)) if current => {
                    inner.link = Some(Link {
                        epoch,
                        peripheral,
                        characteristic,
                    });
                    self.transition(&mut inner, ConnectionState::Connected);
                    None
                }
                Ok((peripheral, _)) => Some(peripheral),
                Err(abort) => {
                    if current {
                        self.transition(&mut inner, ConnectionState::Disconnected);
                        if abort != Abort::Cancelled {
                            self.notifier.connection_failed(abort.to_string());
                        }
                    }
                    None
                }
            }
        };

        if let Some(peripheral) = superseded {
            info!("Connect attempt {} was superseded, releasing device", epoch);
            self.release(&peripheral).await;
        }
    }

    /// Discovery, GATT connect and characteristic lookup
    async fn establish(
        &self,
        token: &CancellationToken,
    ) -> Result<(P::Peripheral, P::Characteristic), Abort> {
        let mut budget = self.policy.budget();
        self.discovery.find(&self.identity, token, &mut budget).await?;

        loop {
            let peripheral = self.connect_peripheral(token, &mut budget).await?;
            match self
                .discovery
                .resolve_characteristic(&peripheral, self.identity.characteristic_uuid, token)
                .await
            {
                Ok(characteristic) => return Ok((peripheral, characteristic)),
                Err(ResolveError::Cancelled) => {
                    self.release(&peripheral).await;
                    return Err(Abort::Cancelled);
                }
                Err(ResolveError::LinkLost(e)) => {
                    warn!("Link dropped while resolving characteristic: {}", e);
                    budget.on_error(&e)?;
                    pause(budget.delay(), token).await?;
                }
            }
        }
    }

    async fn connect_peripheral(
        &self,
        token: &CancellationToken,
        budget: &mut RetryBudget,
    ) -> Result<P::Peripheral, Abort> {
        let address = &self.identity.hardware_address;
        loop {
            if token.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            let result = tokio::select! {
                result = self.platform.connect(address) => result,
                _ = token.cancelled() => return Err(Abort::Cancelled),
            };
            let err = match result {
                Ok(peripheral) => {
                    info!("Connected to {}", address);
                    return Ok(peripheral);
                }
                Err(e) => e,
            };

            if err.is_transient() {
                debug!("Connect already in progress, retrying: {}", err);
            } else {
                warn!("Connection attempt {} failed: {}", budget.attempts() + 1, err);
            }
            budget.on_error(&err)?;
            info!("Retrying connection in {} ms...", budget.delay().as_millis());
            pause(budget.delay(), token).await?;
        }
    }

    async fn release(&self, peripheral: &P::Peripheral) {
        if let Err(e) = self.platform.disconnect(peripheral).await {
            debug!("Releasing device failed: {}", e);
        }
    }
}
