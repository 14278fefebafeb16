//! Wheelchair adapter
//! The only type the rest of the application talks to. Connect, disconnect
//! and link-loss reports are funnelled through one supervisor task so they
//! reach the state machine in the order they were made.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::{
    Axis, BlePlatform, Command, CommandWriter, ConnectionState, ConnectionStateMachine,
    DeviceIdentity, Notifier, PeripheralDiscovery, RateLimiter, RetryPolicy, SkipReason,
    WheelchairEvent, WriteOutcome,
};

/// Everything needed to build a [`WheelchairAdapter`]
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSettings {
    pub identity: DeviceIdentity,
    /// Input-domain value meaning "no movement"
    pub neutral: i32,
    pub scan_poll_interval: Duration,
    pub retry: RetryPolicy,
    pub min_write_interval: Duration,
    /// Re-send the pending command this often while connected, so the
    /// receiver falls back to neutral when input stops. Raised to at least
    /// `min_write_interval`, and disabled if the result is zero.
    pub flush_interval: Option<Duration>,
}

enum Control {
    Connect,
    Disconnect,
    Shutdown(oneshot::Sender<()>),
}

pub struct WheelchairAdapter<P: BlePlatform> {
    machine: Arc<ConnectionStateMachine<P>>,
    writer: Arc<CommandWriter<P>>,
    notifier: Notifier,
    neutral: i32,
    control: mpsc::UnboundedSender<Control>,
    tasks: CancellationToken,
}

impl<P: BlePlatform> WheelchairAdapter<P> {
    /// Build the adapter and start its background tasks. Must be called
    /// from within a tokio runtime.
    pub fn new(platform: Arc<P>, settings: AdapterSettings) -> Self {
        let notifier = Notifier::new();
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let discovery = PeripheralDiscovery::new(
            Arc::clone(&platform),
            settings.scan_poll_interval,
            settings.retry.delay,
        );
        let machine = ConnectionStateMachine::new(
            Arc::clone(&platform),
            settings.identity.clone(),
            discovery,
            settings.retry,
            notifier.clone(),
        );
        let neutral = Command::new(settings.neutral, settings.neutral);
        let writer = Arc::new(CommandWriter::new(
            platform,
            RateLimiter::new(settings.min_write_interval),
            neutral,
            notifier.clone(),
            lost_tx,
        ));

        let tasks = CancellationToken::new();
        tokio::spawn(supervise(
            Arc::clone(&machine),
            Arc::clone(&writer),
            control_rx,
            lost_rx,
        ));
        // At least the write interval; zero disables the ticker
        let flush_interval = settings
            .flush_interval
            .map(|period| period.max(settings.min_write_interval))
            .filter(|period| !period.is_zero());
        if let Some(period) = flush_interval {
            tokio::spawn(flush_loop(
                Arc::clone(&machine),
                Arc::clone(&writer),
                period,
                tasks.clone(),
            ));
        }

        info!(
            "Wheelchair adapter ready for {} ({})",
            settings.identity.hardware_address, settings.identity.characteristic_uuid
        );
        Self {
            machine,
            writer,
            notifier,
            neutral: settings.neutral,
            control: control_tx,
            tasks,
        }
    }

    /// Start connecting; completion is reported as status events
    pub fn connect(&self) {
        self.send(Control::Connect);
    }

    /// Send a stop command and disconnect, or cancel a running connect
    pub fn disconnect(&self) {
        self.send(Control::Disconnect);
    }

    /// Disconnect and stop all background work. The adapter stays
    /// Disconnected afterwards.
    pub async fn shutdown(&self) {
        self.tasks.cancel();
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Control::Shutdown(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, control: Control) {
        if self.control.send(control).is_err() {
            debug!("Adapter already shut down, request dropped");
        }
    }

    /// Hand a movement command to the writer. Disabled axes are replaced by
    /// neutral; nothing happens unless Connected.
    pub fn write_command(&self, drive: i32, turn: i32) -> WriteOutcome {
        let axes = self.notifier.axes();
        let drive = if axes.is_enabled(Axis::Drive) { drive } else { self.neutral };
        let turn = if axes.is_enabled(Axis::Turn) { turn } else { self.neutral };
        let command = Command::new(drive, turn);
        self.machine
            .with_link(|link| self.writer.submit(Some(link), command))
            .unwrap_or(WriteOutcome::Skipped(SkipReason::NotConnected))
    }

    /// Send whatever command is pending now
    pub fn flush(&self) -> Option<WriteOutcome> {
        self.machine.with_link(|link| self.writer.dispatch(link))
    }

    /// Enable or disable an axis. Only possible while Connected; returns
    /// the resulting flag.
    pub fn set_axis_enabled(&self, axis: Axis, enabled: bool) -> bool {
        self.machine
            .if_connected(|| self.notifier.set_axis(axis, enabled));
        self.is_axis_enabled(axis)
    }

    /// Flip an axis flag, subject to the same rule as [`Self::set_axis_enabled`]
    pub fn toggle_axis(&self, axis: Axis) -> bool {
        let enabled = !self.is_axis_enabled(axis);
        self.set_axis_enabled(axis, enabled)
    }

    pub fn set_drive_enabled(&self, enabled: bool) -> bool {
        self.set_axis_enabled(Axis::Drive, enabled)
    }

    pub fn set_turn_enabled(&self, enabled: bool) -> bool {
        self.set_axis_enabled(Axis::Turn, enabled)
    }

    pub fn is_axis_enabled(&self, axis: Axis) -> bool {
        self.notifier.axes().is_enabled(axis)
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.machine.identity()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WheelchairEvent> {
        self.notifier.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.notifier.watch_status()
    }
}

impl<P: BlePlatform> Drop for WheelchairAdapter<P> {
    fn drop(&mut self) {
        self.tasks.cancel();
    }
}

async fn supervise<P: BlePlatform>(
    machine: Arc<ConnectionStateMachine<P>>,
    writer: Arc<CommandWriter<P>>,
    mut control: mpsc::UnboundedReceiver<Control>,
    mut link_lost: mpsc::UnboundedReceiver<u64>,
) {
    loop {
        tokio::select! {
            request = control.recv() => {
                match request {
                    Some(Control::Connect) => machine.connect(),
                    Some(Control::Disconnect) => stop_and_disconnect(&machine, &writer).await,
                    Some(Control::Shutdown(done)) => {
                        stop_and_disconnect(&machine, &writer).await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        stop_and_disconnect(&machine, &writer).await;
                        break;
                    }
                }
            }
            Some(epoch) = link_lost.recv() => machine.link_lost(epoch),
        }
    }
    info!("Wheelchair adapter stopped");
}

async fn stop_and_disconnect<P: BlePlatform>(
    machine: &ConnectionStateMachine<P>,
    writer: &CommandWriter<P>,
) {
    if let Some(link) = machine.link() {
        let outcome = writer.send_stop(&link).await;
        debug!("Stop command before disconnect: {:?}", outcome);
    }
    machine.disconnect().await;
}

async fn flush_loop<P: BlePlatform>(
    machine: Arc<ConnectionStateMachine<P>>,
    writer: Arc<CommandWriter<P>>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                machine.with_link(|link| writer.dispatch(link));
            }
        }
    }
}
