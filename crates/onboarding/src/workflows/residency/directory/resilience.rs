//! Timeout, bounded retry, and circuit breaking around directory lookups.
//!
//! ```text
//! ┌────────┐  N failures  ┌──────┐  reset_timeout  ┌───────────┐
//! │ Closed ├─────────────►│ Open ├────────────────►│ Half-Open │
//! └────────┘              └──────┘                 └─────┬─────┘
//!      ▲                      ▲        failure           │
//!      │                      └──────────────────────────┤
//!      └─────────────────────────────────────────────────┘
//!                    M successes in half-open
//! ```
//!
//! `NotFound` and `Rejected` answers prove the directory is up, so they count
//! as successes for the breaker and are never retried.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tokio::time::Instant;
use tracing::warn;

use super::{ApartmentDirectory, BlockSet, DirectoryError};
use crate::config::DirectoryConfig;
use crate::workflows::residency::domain::ApartmentId;

/// Per-attempt timeout plus jittered exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff schedule for the retries after the first attempt. backon counts
    /// retries, so `max_attempts` of 3 yields two delays.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }
}

impl From<&DirectoryConfig> for RetryPolicy {
    fn from(config: &DirectoryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.request_timeout,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Start of the single half-open probe currently allowed through.
    probe_started: Option<Instant>,
}

/// Circuit breaker guarding the single directory dependency.
///
/// While half-open exactly one call at a time is let through as a probe.
/// A probe that never reports back (its caller was cancelled) is abandoned
/// after `reset_timeout` and another caller may probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_started: None,
            }),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            reset_timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Allows the call through, or fails fast while the circuit is open or a
    /// half-open probe is already in flight.
    pub fn check(&self) -> Result<(), DirectoryError> {
        let mut breaker = self.lock();
        let now = Instant::now();
        match breaker.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => match breaker.probe_started {
                Some(started) if now.duration_since(started) < self.reset_timeout => {
                    Err(DirectoryError::CircuitOpen {
                        retry_after: self.reset_timeout - now.duration_since(started),
                    })
                }
                _ => {
                    breaker.probe_started = Some(now);
                    Ok(())
                }
            },
            CircuitState::Open => {
                let elapsed = breaker
                    .opened_at
                    .map(|opened| now.duration_since(opened))
                    .unwrap_or(self.reset_timeout);
                if elapsed < self.reset_timeout {
                    return Err(DirectoryError::CircuitOpen {
                        retry_after: self.reset_timeout - elapsed,
                    });
                }

                breaker.state = CircuitState::HalfOpen;
                breaker.consecutive_successes = 0;
                breaker.probe_started = Some(now);
                warn!(
                    from = %CircuitState::Open,
                    to = %CircuitState::HalfOpen,
                    "apartment directory circuit allowing probe request"
                );
                Ok(())
            }
        }
    }

    pub fn record_success(&self) {
        let mut breaker = self.lock();
        match breaker.state {
            CircuitState::Closed => breaker.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                breaker.probe_started = None;
                breaker.consecutive_successes += 1;
                if breaker.consecutive_successes >= self.success_threshold {
                    breaker.state = CircuitState::Closed;
                    breaker.consecutive_failures = 0;
                    breaker.consecutive_successes = 0;
                    breaker.opened_at = None;
                    warn!(
                        from = %CircuitState::HalfOpen,
                        to = %CircuitState::Closed,
                        "apartment directory circuit closed"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut breaker = self.lock();
        match breaker.state {
            CircuitState::Closed => {
                breaker.consecutive_failures += 1;
                if breaker.consecutive_failures >= self.failure_threshold {
                    breaker.state = CircuitState::Open;
                    breaker.opened_at = Some(Instant::now());
                    warn!(
                        from = %CircuitState::Closed,
                        to = %CircuitState::Open,
                        failures = breaker.consecutive_failures,
                        reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                        "apartment directory circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                breaker.state = CircuitState::Open;
                breaker.consecutive_successes = 0;
                breaker.probe_started = None;
                breaker.opened_at = Some(Instant::now());
                warn!(
                    from = %CircuitState::HalfOpen,
                    to = %CircuitState::Open,
                    "apartment directory probe failed; circuit reopened"
                );
            }
            CircuitState::Open => {}
        }
    }

    // The state is a handful of counters that are valid after any panic.
    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<&DirectoryConfig> for CircuitBreaker {
    fn from(config: &DirectoryConfig) -> Self {
        Self::new(
            config.failure_threshold,
            config.success_threshold,
            config.reset_timeout,
        )
    }
}

/// Decorator adding [`RetryPolicy`] and [`CircuitBreaker`] to any directory.
#[derive(Debug)]
pub struct ResilientDirectory<D> {
    inner: D,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<D> ResilientDirectory<D>
where
    D: ApartmentDirectory,
{
    pub fn new(inner: D, config: &DirectoryConfig) -> Self {
        Self::with_parts(inner, RetryPolicy::from(config), CircuitBreaker::from(config))
    }

    pub fn with_parts(inner: D, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// One guarded call: breaker admission, timeout, and health accounting.
    async fn attempt(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
        self.breaker.check()?;

        let outcome = match tokio::time::timeout(
            self.policy.attempt_timeout,
            self.inner.lookup(apartment_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DirectoryError::Timeout(self.policy.attempt_timeout)),
        };

        match &outcome {
            Err(err) if degrades_health(err) => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }
        outcome
    }
}

fn degrades_health(err: &DirectoryError) -> bool {
    err.is_transient() || matches!(err, DirectoryError::InvalidResponse(_))
}

#[async_trait]
impl<D> ApartmentDirectory for ResilientDirectory<D>
where
    D: ApartmentDirectory,
{
    async fn lookup(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
        let mut attempt: u32 = 0;

        (|| self.attempt(apartment_id))
            .retry(self.policy.backoff())
            .sleep(tokio::time::sleep)
            .when(DirectoryError::is_transient)
            .notify(|err: &DirectoryError, delay: Duration| {
                attempt += 1;
                warn!(
                    %apartment_id,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "apartment lookup failed; retrying"
                );
            })
            .await
    }
}
