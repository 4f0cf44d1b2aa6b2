use std::time::Duration;

/// Trait for defining reconnection delays
///
/// Consulted once per observed failure (abnormal closure or transport
/// error) to decide when the next connection attempt may start.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before the next attempt
    ///
    /// # Arguments
    /// * `failures` - Consecutive failures observed *before* this one
    ///   was counted (0 for the first failure)
    fn next_delay(&self, failures: u32) -> Duration;
}

/// Exponential backoff reconnection strategy
///
/// Delays grow as `base * 2^failures`. There is no cap unless one is
/// set with [`ExponentialBackoff::with_max_delay`]; the arithmetic
/// saturates instead of overflowing.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Option<Duration>,
}

impl ExponentialBackoff {
    /// Default base delay between reconnection attempts
    pub const DEFAULT_BASE: Duration = Duration::from_millis(1000);

    /// Create a new uncapped exponential backoff strategy
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max_delay: None,
        }
    }

    /// Cap every delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay in milliseconds for the given failure count
    pub fn delay_ms(&self, failures: u32) -> u64 {
        let base = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let factor = 2u64.checked_pow(failures).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor);

        match self.max_delay {
            Some(max) => delay.min(u64::try_from(max.as_millis()).unwrap_or(u64::MAX)),
            None => delay,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, failures: u32) -> Duration {
        Duration::from_millis(self.delay_ms(failures))
    }
}
