use crate::retry::backoff::Jitter;
use crate::retry::clock::Clock;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval and deadline for [`poll_until`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub jitter: Jitter,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            jitter: Jitter::NONE,
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Why polling stopped without a value
#[derive(Debug)]
pub enum PollError<E> {
    TimedOut { elapsed: Duration, polls: u32 },
    Cancelled,
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::TimedOut { elapsed, polls } => write!(
                f,
                "condition not met after {} poll(s) in {}ms",
                polls,
                elapsed.as_millis()
            ),
            PollError::Cancelled => f.write_str("polling cancelled"),
            PollError::Failed(e) => write!(f, "poll predicate failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PollError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Evaluate `predicate` until it yields a value, the timeout elapses or `cancel` fires.
///
/// The predicate runs once immediately and then once per interval. `Ok(None)` means
/// "not yet"; an `Err` stops polling at once, so callers map transient lookups to
/// `Ok(None)` themselves.
pub async fn poll_until<T, E, F, Fut>(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    options: PollOptions,
    mut predicate: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = clock.now();
    let mut polls = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        polls += 1;
        if let Some(value) = predicate().await.map_err(PollError::Failed)? {
            return Ok(value);
        }

        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed >= options.timeout {
            return Err(PollError::TimedOut { elapsed, polls });
        }

        let wait = (options.interval + options.jitter.sample()).min(options.timeout - elapsed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = clock.sleep(wait) => {}
        }
    }
}
