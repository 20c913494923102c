use crate::ConfigError;
use std::time::Duration;

/// Configuration for a [`MaskRing`](crate::MaskRing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Total buffer capacity in bytes (must be a multiple of `region_count`)
    pub capacity: usize,
    /// Number of equal regions the buffer is fenced in (must be >= 3)
    pub region_count: usize,
    /// Longest the producer may wait for a pending region before giving up
    pub max_wait: Duration,
    /// How long a parked producer sleeps between drain requests
    pub poll_interval: Duration,
    /// Maximum `drain_now` calls issued while waiting for a single region
    pub max_drain_attempts: u32,
}

impl Config {
    /// Smallest region count that leaves the consumer one region of slack.
    pub const MIN_REGIONS: usize = 3;

    /// Creates a configuration with the given geometry and default wait policy.
    pub const fn new(capacity: usize, region_count: usize) -> Self {
        Self {
            capacity,
            region_count,
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(1),
            max_drain_attempts: 100_000,
        }
    }

    /// Returns the size of a single region in bytes.
    #[inline]
    pub const fn region_size(&self) -> usize {
        self.capacity / self.region_count
    }

    /// Returns the largest payload a single allocation may request.
    ///
    /// An allocation must be strictly smaller than a region so that it
    /// crosses at most one region boundary.
    #[inline]
    pub const fn max_allocation(&self) -> usize {
        self.region_size() - 1
    }

    /// Checks the geometry preconditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.region_count < Self::MIN_REGIONS {
            return Err(ConfigError::TooFewRegions {
                regions: self.region_count,
                min: Self::MIN_REGIONS,
            });
        }
        if self.capacity % self.region_count != 0 {
            return Err(ConfigError::UnevenRegions {
                capacity: self.capacity,
                regions: self.region_count,
            });
        }
        // Offsets travel as i32 words in the command stream.
        if self.capacity > i32::MAX as usize {
            return Err(ConfigError::CapacityTooLarge {
                capacity: self.capacity,
                max: i32::MAX as usize,
            });
        }
        if self.max_drain_attempts == 0 {
            return Err(ConfigError::NoDrainAttempts);
        }
        Ok(())
    }

    /// Sets the maximum backpressure wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the park interval between drain requests.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum number of drain requests per wait.
    pub fn with_max_drain_attempts(mut self, attempts: u32) -> Self {
        self.max_drain_attempts = attempts;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        DEFAULT_CONFIG
    }
}

/// Four 1 MiB regions.
pub const DEFAULT_CONFIG: Config = Config::new(4 * 1024 * 1024, 4);

/// Four 64 KiB regions, for tests and low-memory targets.
pub const SMALL_CONFIG: Config = Config::new(4 * 64 * 1024, 4);
