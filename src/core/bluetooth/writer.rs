//! Command dispatch to the wheelchair characteristic
//! Writes are rate limited and never queued: at most one write is in flight,
//! and a request arriving while one is outstanding is dropped.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until, timeout};

use crate::core::bluetooth::commands::{Command, EncodedCommand};
use crate::core::bluetooth::connection::Link;
use crate::core::bluetooth::notification::Notifier;
use crate::core::bluetooth::platform::BlePlatform;
use crate::core::bluetooth::rate_limiter::RateLimiter;

/// How long a stop command waits for an outstanding write to finish
const STOP_SLOT_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of handing a command to the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Write issued in the background
    Dispatched(EncodedCommand),
    /// Write completed and acknowledged
    Written(EncodedCommand),
    Skipped(SkipReason),
    /// The platform reported the link as gone
    LinkLost,
    /// The platform rejected the write for another reason
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConnected,
    RateLimited,
    /// Previous write still in flight
    Busy,
}

struct Pending {
    /// Sent on the next accepted write. Reset to neutral after each one.
    command: Command,
    last_write: Option<Instant>,
}

pub struct CommandWriter<P: BlePlatform> {
    platform: Arc<P>,
    limiter: RateLimiter,
    neutral: Command,
    pending: Mutex<Pending>,
    in_flight: Arc<AtomicBool>,
    notifier: Notifier,
    link_lost: mpsc::UnboundedSender<u64>,
}

impl<P: BlePlatform> CommandWriter<P> {
    /// `link_lost` receives the epoch of a link whose write failed with
    /// "not connected".
    pub fn new(
        platform: Arc<P>,
        limiter: RateLimiter,
        neutral: Command,
        notifier: Notifier,
        link_lost: mpsc::UnboundedSender<u64>,
    ) -> Self {
        Self {
            platform,
            limiter,
            neutral,
            pending: Mutex::new(Pending {
                command: neutral,
                last_write: None,
            }),
            in_flight: Arc::new(AtomicBool::new(false)),
            notifier,
            link_lost,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest command, sent on the next accepted write
    pub fn pending(&self) -> Command {
        self.lock().command
    }

    /// Store `command` as the latest one and try to send it. Commands
    /// arriving without a link are dropped.
    pub fn submit(&self, link: Option<&Link<P>>, command: Command) -> WriteOutcome {
        let Some(link) = link else {
            return WriteOutcome::Skipped(SkipReason::NotConnected);
        };
        self.lock().command = command;
        self.dispatch(link)
    }

    /// Send the pending command if the rate limit and the in-flight slot
    /// allow it
    pub fn dispatch(&self, link: &Link<P>) -> WriteOutcome {
        let encoded = {
            let mut pending = self.lock();
            let now = Instant::now();
            if !self.limiter.permits(pending.last_write, now) {
                return WriteOutcome::Skipped(SkipReason::RateLimited);
            }
            if self.in_flight.swap(true, Ordering::AcqRel) {
                debug!("Previous write still in flight, dropping command");
                return WriteOutcome::Skipped(SkipReason::Busy);
            }
            pending.last_write = Some(now);
            mem::replace(&mut pending.command, self.neutral).encode()
        };

        let platform = Arc::clone(&self.platform);
        let in_flight = Arc::clone(&self.in_flight);
        let notifier = self.notifier.clone();
        let link_lost = self.link_lost.clone();
        let characteristic = link.characteristic.clone();
        let epoch = link.epoch;
        tokio::spawn(async move {
            let result = platform.write(&characteristic, &encoded.to_bytes()).await;
            in_flight.store(false, Ordering::Release);
            match result {
                Ok(()) => {
                    debug!("Sent command {:?}", encoded.to_bytes());
                    notifier.command_sent(encoded);
                }
                Err(e) if e.is_not_connected() => {
                    warn!("Write failed, link lost: {}", e);
                    let _ = link_lost.send(epoch);
                }
                Err(e) => warn!("Write failed: {}", e),
            }
        });

        WriteOutcome::Dispatched(encoded)
    }

    /// Write neutral and wait for the acknowledgement. Used before a
    /// deliberate disconnect. Waits for the in-flight slot and for the rest
    /// of the rate-limit window, so the stop is delayed but never dropped.
    pub async fn send_stop(&self, link: &Link<P>) -> WriteOutcome {
        let acquired = timeout(STOP_SLOT_TIMEOUT, async {
            while self.in_flight.swap(true, Ordering::AcqRel) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if acquired.is_err() {
            warn!("Write slot still busy, skipping stop command");
            return WriteOutcome::Skipped(SkipReason::Busy);
        }

        let last_write = self.lock().last_write;
        if let Some(last) = last_write {
            let ready_at = last + self.limiter.min_interval();
            if ready_at > Instant::now() {
                debug!("Holding stop command until the rate-limit window ends");
                sleep_until(ready_at).await;
            }
        }

        let encoded = {
            let mut pending = self.lock();
            pending.command = self.neutral;
            pending.last_write = Some(Instant::now());
            self.neutral.encode()
        };
        let result = self.platform.write(&link.characteristic, &encoded.to_bytes()).await;
        self.in_flight.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                self.notifier.command_sent(encoded);
                WriteOutcome::Written(encoded)
            }
            Err(e) if e.is_not_connected() => WriteOutcome::LinkLost,
            Err(e) => {
                warn!("Stop command failed: {}", e);
                WriteOutcome::Failed
            }
        }
    }
}
