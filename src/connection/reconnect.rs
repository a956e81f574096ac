// Logique de retry avec backoff exponentiel, en attendant un device

use crate::config::DeviceConfig;
use std::time::Duration;

pub struct ReconnectionStrategy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    current_attempt: u32,
}

impl ReconnectionStrategy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            current_attempt: 0,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.retry_attempts,
            config.retry_base_delay_ms,
            config.retry_max_delay_ms,
        )
    }

    /// Delay before the next attempt (base * 2^attempt, capped), or `None`
    /// once every attempt has been used
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let factor = 2u64.saturating_pow(self.current_attempt);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);

        self.current_attempt += 1;

        Some(Duration::from_millis(delay_ms))
    }

    /// Resets the attempt counter (after a success)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn should_retry(&self) -> bool {
        self.current_attempt < self.max_attempts
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}
