use crate::error::{DriverError, PublishError};
use crate::retry::clock::{Clock, TokioClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Classifies errors that are worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DriverError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for PublishError {
    fn is_retryable(&self) -> bool {
        match self {
            PublishError::Driver(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Random extra delay added to waits so UI interaction timing looks human.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jitter {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Jitter {
    pub const NONE: Jitter = Jitter {
        min_ms: 0,
        max_ms: 0,
    };

    /// Bounds may be given in either order
    pub fn between(a: Duration, b: Duration) -> Self {
        let (a, b) = (a.as_millis() as u64, b.as_millis() as u64);
        Self {
            min_ms: a.min(b),
            max_ms: a.max(b),
        }
    }

    /// Ordered `(low, high)` bounds; a `max_ms` below `min_ms` collapses to `min_ms`
    fn bounds(&self) -> (u64, u64) {
        (self.min_ms, self.max_ms.max(self.min_ms))
    }

    /// True when every sample is zero
    pub fn is_none(&self) -> bool {
        self.bounds() == (0, 0)
    }

    pub fn sample(&self) -> Duration {
        let (low, high) = self.bounds();
        if high == low {
            return Duration::from_millis(low);
        }
        let span = (high - low) as f64;
        Duration::from_millis(low + (rand::random::<f64>() * span) as u64)
    }
}

/// Attempt budget and linear backoff for one retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the n-th failure is `base_delay * n`
    pub base_delay: Duration,
    pub jitter: Jitter,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            jitter: Jitter::NONE,
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt + self.jitter.sample()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error that is not worth retrying
    Aborted { attempts: u32, last: E },
    /// The cancellation token fired before the operation succeeded
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Aborted { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Aborted { last, .. } => Some(last),
            RetryError::Cancelled { last, .. } => last,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempt(s): {}", attempts, last)
            }
            RetryError::Aborted { attempts, last } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempts, last)
            }
            RetryError::Cancelled { attempts, .. } => {
                write!(f, "cancelled after {} attempt(s)", attempts)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Aborted { last, .. } => Some(last),
            RetryError::Cancelled { last, .. } => {
                last.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// Runs operations with bounded retries and escalating, cancellable delays.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    clock: Arc<dyn Clock>,
}

impl RetryExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Invoke `operation` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts or `cancel` fires. The operation receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        let mut last_error = None;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last: last_error,
                });
            }
            attempt += 1;

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    last: error,
                });
            }

            if attempt >= max_attempts {
                warn!("Giving up after {} attempt(s): {}", attempt, error);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = policy.delay_for(attempt);
            debug!(
                "Attempt {}/{} failed: {} (retrying in {}ms)",
                attempt,
                max_attempts,
                error,
                delay.as_millis()
            );
            last_error = Some(error);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last: last_error,
                    });
                }
                _ = self.clock.sleep(delay) => {}
            }
        }
    }

    /// Humanized pause between UI actions; returns early with `Cancelled`.
    pub async fn pause(&self, jitter: Jitter, cancel: &CancellationToken) -> Result<(), PublishError> {
        if jitter.is_none() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PublishError::Cancelled),
            _ = self.clock.sleep(jitter.sample()) => Ok(()),
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}
