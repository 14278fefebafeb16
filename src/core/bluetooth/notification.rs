//! Event delivery for the BLE core
//! Status changes, sent commands and axis toggles are published on a
//! broadcast channel. The current connection state is also kept in a watch
//! channel so a late subscriber never misses where the link is.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};
use tokio::sync::{broadcast, watch};

use crate::core::bluetooth::commands::EncodedCommand;
use crate::core::bluetooth::constants::EVENT_CHANNEL_CAPACITY;
use crate::core::bluetooth::types::{Axis, ConnectionState, WheelchairEvent};

/// Drive and turn enable flags
#[derive(Debug, Default)]
pub struct AxisGate {
    drive: AtomicBool,
    turn: AtomicBool,
}

impl AxisGate {
    fn flag(&self, axis: Axis) -> &AtomicBool {
        match axis {
            Axis::Drive => &self.drive,
            Axis::Turn => &self.turn,
        }
    }

    pub fn is_enabled(&self, axis: Axis) -> bool {
        self.flag(axis).load(Ordering::Acquire)
    }

    /// Returns true if the flag changed
    fn set(&self, axis: Axis, enabled: bool) -> bool {
        self.flag(axis).swap(enabled, Ordering::AcqRel) != enabled
    }
}

/// Publisher side of all BLE core events
#[derive(Clone)]
pub struct Notifier {
    events: broadcast::Sender<WheelchairEvent>,
    status: Arc<watch::Sender<ConnectionState>>,
    axes: Arc<AxisGate>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            events,
            status: Arc::new(status),
            axes: Arc::new(AxisGate::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WheelchairEvent> {
        self.events.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn axes(&self) -> &AxisGate {
        &self.axes
    }

    /// Publish a state transition. Leaving Connected disables both axes
    /// before observers hear about the new state.
    pub fn status_changed(&self, state: ConnectionState) {
        if state != ConnectionState::Connected {
            self.set_axis(Axis::Drive, false);
            self.set_axis(Axis::Turn, false);
        }
        self.status.send_replace(state);
        self.publish(WheelchairEvent::StatusChanged(state));
    }

    pub fn set_axis(&self, axis: Axis, enabled: bool) {
        if self.axes.set(axis, enabled) {
            debug!("{:?} axis {}", axis, if enabled { "enabled" } else { "disabled" });
            self.publish(WheelchairEvent::AxisEnableChanged { axis, enabled });
        }
    }

    pub fn command_sent(&self, command: EncodedCommand) {
        self.publish(WheelchairEvent::CommandSent(command));
    }

    pub fn connection_failed(&self, reason: String) {
        error!("Connecting to wheelchair failed: {}", reason);
        self.publish(WheelchairEvent::ConnectionFailed(reason));
    }

    fn publish(&self, event: WheelchairEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_subscriber_sees_current_status() {
        let notifier = Notifier::new();
        notifier.status_changed(ConnectionState::Connecting);
        let status = notifier.watch_status();
        assert_eq!(*status.borrow(), ConnectionState::Connecting);
    }

    #[test]
    fn leaving_connected_disables_axes() {
        let notifier = Notifier::new();
        notifier.status_changed(ConnectionState::Connected);
        notifier.set_axis(Axis::Drive, true);
        notifier.set_axis(Axis::Turn, true);
        let mut events = notifier.subscribe();

        notifier.status_changed(ConnectionState::Disconnected);

        assert!(!notifier.axes().is_enabled(Axis::Drive));
        assert!(!notifier.axes().is_enabled(Axis::Turn));
        assert_eq!(
            events.try_recv().unwrap(),
            WheelchairEvent::AxisEnableChanged { axis: Axis::Drive, enabled: false }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            WheelchairEvent::AxisEnableChanged { axis: Axis::Turn, enabled: false }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            WheelchairEvent::StatusChanged(ConnectionState::Disconnected)
        );
    }

    #[test]
    fn unchanged_axis_is_not_republished() {
        let notifier = Notifier::new();
        let mut events = notifier.subscribe();
        notifier.set_axis(Axis::Drive, false);
        assert!(events.try_recv().is_err());
    }
}
