use std::time::Duration;

/// The default maximum payload per data frame.
pub const DEFAULT_MTU: u8 = 200;

/// The default interval between retransmission attempts.
pub const DEFAULT_RETRY: Duration = Duration::from_millis(10);

/// Tunables of a connection.
///
/// ```rust
/// # use std::time::Duration;
/// let config = sarq::Config::new()
///     .with_mtu(64)
///     .with_retry(Duration::from_millis(25));
///
/// assert_eq!(config.mtu(), 64);
/// ```
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Config {
    mtu: u8,
    retry: Duration,
}

impl Config {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Config {
            mtu: DEFAULT_MTU,
            retry: DEFAULT_RETRY,
        }
    }

    /// The maximum amount of payload bytes per data frame.
    pub fn mtu(&self) -> u8 {
        self.mtu
    }

    /// The fixed interval between retransmission attempts.
    ///
    /// Blocking reads poll for data at twice this interval.
    pub fn retry(&self) -> Duration {
        self.retry
    }

    /// Sets the maximum amount of payload bytes per data frame.
    ///
    /// # Panics
    ///
    /// Panics if `mtu` is zero.
    pub fn with_mtu(mut self, mtu: u8) -> Self {
        assert!(mtu > 0, "mtu must be positive");

        self.mtu = mtu;
        self
    }

    /// Sets the retransmission interval.
    ///
    /// # Panics
    ///
    /// Panics if `retry` is zero.
    pub fn with_retry(mut self, retry: Duration) -> Self {
        assert!(retry > Duration::from_millis(0), "retry interval must be positive");

        self.retry = retry;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
