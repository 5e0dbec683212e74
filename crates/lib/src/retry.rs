//! Bounded exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 4,
      initial_backoff: Duration::from_secs(2),
      max_backoff: Duration::from_secs(60),
    }
  }
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      ..Self::default()
    }
  }

  /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
  }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// attempt budget is spent. The last error is returned unchanged.
  pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
  where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if err.kind().is_retryable() && attempt < self.max_attempts => {
          let delay = self.backoff(attempt);
          warn!(what, attempt, max = self.max_attempts, delay = ?delay, error = %err, "transient failure, retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }
}
