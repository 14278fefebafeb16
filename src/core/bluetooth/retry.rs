//! Retry policy for the discovery and connect loops.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::error::PlatformError;

/// What to do with platform errors that are not known to be transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedErrorPolicy {
    /// Keep retrying, like in-progress errors
    #[default]
    Retry,
    /// Give up the connect attempt and report the error
    Fatal,
}

/// Bounds for one connect attempt. With no limits set the loops retry until
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
    pub max_duration: Option<Duration>,
    pub unclassified: UnclassifiedErrorPolicy,
}

impl RetryPolicy {
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            max_duration: None,
            unclassified: UnclassifiedErrorPolicy::Retry,
        }
    }

    /// Start counting failures for a new connect attempt
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            policy: *self,
            started: Instant::now(),
            attempts: 0,
        }
    }
}

/// Why a connect attempt stopped before reaching Connected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Abort {
    #[error("connect attempt cancelled")]
    Cancelled,
    #[error("gave up after {attempts} failed attempts, last error: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("unrecoverable platform error: {0}")]
    Fatal(PlatformError),
}

/// Failure counter for a single connect attempt
#[derive(Debug)]
pub struct RetryBudget {
    policy: RetryPolicy,
    started: Instant,
    attempts: u32,
}

impl RetryBudget {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.policy.delay
    }

    /// Count a failed platform call, applying the unclassified-error policy
    pub fn on_error(&mut self, err: &PlatformError) -> Result<(), Abort> {
        if !err.is_transient() && self.policy.unclassified == UnclassifiedErrorPolicy::Fatal {
            self.attempts += 1;
            return Err(Abort::Fatal(err.clone()));
        }
        self.charge(err.to_string())
    }

    /// Count an unsuccessful iteration that produced no error, e.g. a scan
    /// cycle that did not see the device
    pub fn charge(&mut self, last: String) -> Result<(), Abort> {
        self.attempts += 1;
        let out_of_attempts = self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max);
        let out_of_time = self
            .policy
            .max_duration
            .is_some_and(|max| self.started.elapsed() >= max);
        if out_of_attempts || out_of_time {
            return Err(Abort::Exhausted {
                attempts: self.attempts,
                last,
            });
        }
        Ok(())
    }
}

/// Sleep for `delay`, returning early if `token` is cancelled
pub async fn pause(delay: Duration, token: &CancellationToken) -> Result<(), Abort> {
    tokio::select! {
        _ = sleep(delay) => Ok(()),
        _ = token.cancelled() => Err(Abort::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_policy_never_gives_up() {
        let mut budget = RetryPolicy::forever(Duration::from_millis(10)).budget();
        for _ in 0..1000 {
            budget
                .on_error(&PlatformError::Other("Software caused connection abort".into()))
                .unwrap();
        }
        assert_eq!(budget.attempts(), 1000);
    }

    #[tokio::test]
    async fn max_attempts_bounds_the_loop() {
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::forever(Duration::from_millis(10))
        };
        let mut budget = policy.budget();
        assert!(budget.charge("not found".into()).is_ok());
        assert!(budget.charge("not found".into()).is_ok());
        assert_eq!(
            budget.charge("not found".into()),
            Err(Abort::Exhausted {
                attempts: 3,
                last: "not found".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_bounds_the_loop() {
        let policy = RetryPolicy {
            max_duration: Some(Duration::from_secs(5)),
            ..RetryPolicy::forever(Duration::from_secs(1))
        };
        let mut budget = policy.budget();
        assert!(budget.charge("x".into()).is_ok());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(budget.charge("x".into()), Err(Abort::Exhausted { .. })));
    }

    #[tokio::test]
    async fn fatal_policy_only_stops_on_unclassified_errors() {
        let policy = RetryPolicy {
            unclassified: UnclassifiedErrorPolicy::Fatal,
            ..RetryPolicy::forever(Duration::from_millis(10))
        };
        let mut budget = policy.budget();
        assert!(budget.on_error(&PlatformError::InProgress("busy".into())).is_ok());
        let err = PlatformError::Other("Software caused connection abort".into());
        assert_eq!(budget.on_error(&err), Err(Abort::Fatal(err)));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_returns_early_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(pause(Duration::from_secs(60), &token).await, Err(Abort::Cancelled));
    }
}
