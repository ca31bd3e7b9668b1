//! Tunables for talking to a heater.

use std::time::Duration;

use crate::ble::connection::RetryPolicy;
use crate::error::{Error, Result};

/// Timeouts and retry settings for a heater session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaterConfig {
    /// Upper bound on a single connection attempt.
    pub bluetooth_timeout: Duration,
    /// Number of connection attempts before giving up.
    pub max_retries: u32,
    /// How long to scan for the heater's address.
    pub scan_timeout: Duration,
    /// Pause between sending a command and reading the resulting status.
    pub settle_delay: Duration,
    /// Upper bound on a single characteristic read or write.
    pub io_timeout: Duration,
    /// Delay after the first failed connection attempt.
    pub initial_backoff: Duration,
    /// Cap on the delay between connection attempts.
    pub max_backoff: Duration,
}

impl HeaterConfig {
    /// Default per-attempt connection timeout.
    pub const DEFAULT_BLUETOOTH_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default number of connection attempts.
    pub const DEFAULT_MAX_RETRIES: u32 = 20;
    /// Default scan timeout.
    pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default settle delay.
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
    /// Default characteristic I/O timeout.
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt connection timeout.
    pub fn with_bluetooth_timeout(mut self, timeout: Duration) -> Self {
        self.bluetooth_timeout = timeout;
        self
    }

    /// Set the number of connection attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the characteristic I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set the back-off between connection attempts.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// The connection retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            attempt_timeout: self.bluetooth_timeout,
            initial_delay: self.initial_backoff,
            max_delay: self.max_backoff,
        }
    }

    /// Check that the values can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(invalid("max_retries", self.max_retries));
        }

        for (name, value) in [
            ("bluetooth_timeout", self.bluetooth_timeout),
            ("scan_timeout", self.scan_timeout),
            ("io_timeout", self.io_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(name, format!("{:?}", value)));
            }
        }

        if self.initial_backoff > self.max_backoff {
            return Err(invalid(
                "initial_backoff",
                format!("{:?} > {:?}", self.initial_backoff, self.max_backoff),
            ));
        }

        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

impl Default for HeaterConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();

        Self {
            bluetooth_timeout: Self::DEFAULT_BLUETOOTH_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            scan_timeout: Self::DEFAULT_SCAN_TIMEOUT,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
            io_timeout: Self::DEFAULT_IO_TIMEOUT,
            initial_backoff: policy.initial_delay,
            max_backoff: policy.max_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = HeaterConfig::default();
        assert_eq!(config.bluetooth_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 20);
        assert_eq!(config.scan_timeout, Duration::from_secs(30));
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert_ok!(config.validate());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = HeaterConfig::new()
            .with_max_retries(3)
            .with_bluetooth_timeout(Duration::from_secs(5))
            .with_backoff(Duration::from_millis(100), Duration::from_millis(800));

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(5));
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(800));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = HeaterConfig::new().with_max_retries(0);
        match config.validate() {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "max_retries"),
            other => panic!("expected invalid parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        assert_err!(HeaterConfig::new()
            .with_bluetooth_timeout(Duration::ZERO)
            .validate());
        assert_err!(HeaterConfig::new()
            .with_scan_timeout(Duration::ZERO)
            .validate());
        assert_err!(HeaterConfig::new().with_io_timeout(Duration::ZERO).validate());
    }

    #[test]
    fn test_validate_allows_zero_settle_delay() {
        assert_ok!(HeaterConfig::new()
            .with_settle_delay(Duration::ZERO)
            .validate());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let config =
            HeaterConfig::new().with_backoff(Duration::from_secs(5), Duration::from_secs(1));
        assert_err!(config.validate());
    }
}
