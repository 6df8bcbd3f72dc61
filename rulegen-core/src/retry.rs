use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for the execute phase of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. `0` behaves like `1`.
    pub max_retries: u32,
    /// Base pause between two attempts.
    pub wait: Duration,
    pub strategy: RetryStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Always pause `wait`.
    Fixed,
    /// `wait * multiplier^(attempt - 1)`
    Exponential { multiplier: f64 },
    /// `wait + increment * (attempt - 1)`
    Linear { increment: Duration },
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            wait: Duration::ZERO,
            strategy: RetryStrategy::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        Self {
            max_retries,
            wait,
            strategy: RetryStrategy::Fixed,
        }
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Pause taken after the failed attempt number `attempt` (1-based).
    /// Saturates at [`Duration::MAX`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1);
        match self.strategy {
            RetryStrategy::Fixed => self.wait,
            RetryStrategy::Exponential { multiplier } => {
                if self.wait.is_zero() {
                    return Duration::ZERO;
                }
                let factor = multiplier.max(0.0).powi(i32::try_from(step).unwrap_or(i32::MAX));
                Duration::try_from_secs_f64(self.wait.as_secs_f64() * factor)
                    .unwrap_or(Duration::MAX)
            }
            RetryStrategy::Linear { increment } => {
                self.wait.saturating_add(increment.saturating_mul(step))
            }
        }
    }
}

/// Last error of a step whose retry budget ran out.
pub(crate) struct Exhausted {
    pub attempts: u32,
    pub error: anyhow::Error,
}

/// Calls `op` until it succeeds or the policy gives up. Returns the value
/// and the number of attempts it took.
pub(crate) async fn retry<T, F, Fut>(
    config: &RetryConfig,
    step: &str,
    mut op: F,
) -> Result<(T, u32), Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = config.attempts();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if attempt < max_attempts => {
                let delay = config.delay_for(attempt);
                warn!(
                    step = %step,
                    attempt,
                    max_retries = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %format!("{error:#}"),
                    "execute failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => {
                return Err(Exhausted {
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}
