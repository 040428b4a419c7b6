use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How many attempts a request gets and how long to wait between them.
#[derive(Clone)]
pub struct RetryPolicy {
  max_attempts: u32,
  delay_fn: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl RetryPolicy {
  /// `delay_fn(n)` is the wait after failed attempt `n` (1-based).
  pub fn new(max_attempts: u32, delay_fn: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      delay_fn: Arc::new(delay_fn),
    }
  }

  /// Wait `base * n` after attempt `n`.
  pub fn linear(max_attempts: u32, base: Duration) -> Self {
    Self::new(max_attempts, move |attempt| base * attempt)
  }

  /// A single attempt, no retries.
  pub fn once() -> Self {
    Self::new(1, |_| Duration::ZERO)
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  pub fn delay_after(&self, attempt: u32) -> Duration {
    (self.delay_fn)(attempt)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::linear(3, Duration::from_secs(1))
  }
}

impl fmt::Debug for RetryPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RetryPolicy")
      .field("max_attempts", &self.max_attempts)
      .finish_non_exhaustive()
  }
}
