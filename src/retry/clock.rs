use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Time source for retry and polling loops.
///
/// Production code uses [`TokioClock`]; tests inject a clock whose `sleep` returns
/// immediately and advances `now`, so backoff schedules can be asserted exactly.
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
