//! Exponential backoff for chat socket reconnection

use std::time::Duration;

use rand::Rng;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential growth
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0), subtracted from the computed delay
    pub jitter_factor: f64,
    /// Reconnect attempts allowed before giving up
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000, // 30 seconds
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Delay for a 1-based attempt number, before jitter:
    /// `min(base * multiplier^(attempt - 1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Reconnect attempt counter with exponential delays
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with custom configuration
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Whether the attempt ceiling has been reached
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    /// Count one more attempt and return the delay to wait before it.
    ///
    /// Returns `None` once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }

        self.attempt += 1;
        let delay = self.config.delay_for(self.attempt);

        // Jitter only shortens the delay so the cap still holds
        if self.config.jitter_factor > 0.0 {
            let delay_ms = delay.as_millis() as f64;
            let jitter_range = delay_ms * self.config.jitter_factor.min(1.0);
            let jitter = rand::rng().random_range(0.0..=jitter_range);
            return Some(Duration::from_millis((delay_ms - jitter).max(1.0) as u64));
        }

        Some(delay)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, max: u64, attempts: u32) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: base,
            max_delay_ms: max,
            multiplier: 2.0,
            jitter_factor: 0.0, // No jitter for predictable testing
            max_attempts: attempts,
        }
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let mut backoff = ExponentialBackoff::with_config(config(1000, 30_000, 5));

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(4000)));
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let cfg = config(1000, 5000, 10);
        let mut backoff = ExponentialBackoff::with_config(cfg.clone());

        let mut previous = Duration::ZERO;
        while let Some(delay) = backoff.next_delay() {
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(cfg.max_delay_ms));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(5000));
    }

    #[test]
    fn test_exponential_backoff_stops_at_ceiling() {
        let mut backoff = ExponentialBackoff::with_config(config(100, 10_000, 3));

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.exhausted());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::with_config(config(100, 10_000, 3));

        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let mut cfg = config(1000, 3000, 20);
        cfg.jitter_factor = 0.5;
        let mut backoff = ExponentialBackoff::with_config(cfg);

        while let Some(delay) = backoff.next_delay() {
            assert!(delay <= Duration::from_millis(3000));
            assert!(delay >= Duration::from_millis(1));
        }
    }

    #[test]
    fn test_delay_for_third_attempt() {
        let cfg = config(1000, 30_000, 5);
        assert_eq!(cfg.delay_for(3), Duration::from_millis(4000));
        assert_eq!(config(1000, 3000, 5).delay_for(3), Duration::from_millis(3000));
    }
}
