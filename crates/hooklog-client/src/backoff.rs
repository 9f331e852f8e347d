//! Reconnect delays with exponential backoff

use std::time::Duration;
use tracing::debug;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect
    pub initial: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Growth factor per failed attempt
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            max: Duration::from_millis(30000),
            multiplier: 2.0,
        }
    }
}

/// Reconnect delay tracker
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempt: usize,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial,
            config,
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt; grows the following one
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let delay = self.current;

        debug!(
            "Reconnect attempt {} in {}ms",
            self.attempt,
            delay.as_millis()
        );

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.config.multiplier);
        self.current = next.min(self.config.max);
        delay
    }

    /// Back to the initial delay (call after a successful open)
    pub fn reset(&mut self) {
        self.current = self.config.initial;
        self.attempt = 0;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::default();

        let delays: Vec<u128> = (0..8).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(backoff.attempt(), 8);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_millis(4000));

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }
}
