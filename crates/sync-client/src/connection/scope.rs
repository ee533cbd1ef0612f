//! Retry scope and backoff
//!
//! A `RetryScope` is created fresh for every connect cycle; cancelling it
//! unblocks every wait the cycle is suspended in.

use super::error::Cancelled;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancellation scope of one connect cycle
#[derive(Debug, Clone, Default)]
pub struct RetryScope {
    token: CancellationToken,
}

impl RetryScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope cancelled together with this one
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast if the scope is already cancelled
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.guard(tokio::time::sleep(duration)).await
    }

    /// Run `future` unless cancelled first
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}

/// Jittered retry delay, uniformly random in `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    min: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a backoff window; `max` is raised above `min` if needed
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = if max > min {
            max
        } else {
            min + Duration::from_millis(1)
        };
        Self { min, max }
    }

    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Pick the next delay
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(20))
    }
}
