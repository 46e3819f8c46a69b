// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus configuration.
//!
//! A [`BusConfig`] is handed to [`LogBus::init`](crate::LogBus::init).  The
//! first call starts the flush worker; later calls only update the tunables,
//! which take effect on the next `put` or flush.
//!
//! ```rust
//! use logwise_bus::BusConfig;
//! use std::time::Duration;
//!
//! let config = BusConfig::default()
//!     .with_flush_period(Duration::from_millis(100))
//!     .with_limit_by_thread(10_000);
//! assert!(config.validate().is_ok());
//! ```

use crate::sys::Duration;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Tunables for a [`LogBus`](crate::LogBus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusConfig {
    /// Time between periodic flushes.
    pub flush_period: Duration,
    /// Per-thread queue length that triggers throttling and spam warnings.
    pub limit_by_thread: usize,
    /// How long a producer over its limit sleeps after each `put`.
    pub throttling_time: Duration,
    /// Poll interval while waiting out an in-progress flush.
    pub wait_flush: Duration,
    /// Messages tolerated before the worker starts; older ones beyond this are discarded.
    pub pre_init_logs_limit: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            flush_period: Duration::from_millis(500),
            limit_by_thread: 100_000,
            throttling_time: Duration::from_millis(1),
            wait_flush: Duration::from_millis(50),
            pre_init_logs_limit: 100_000,
        }
    }
}

impl BusConfig {
    pub fn with_flush_period(mut self, flush_period: Duration) -> Self {
        self.flush_period = flush_period;
        self
    }

    pub fn with_limit_by_thread(mut self, limit_by_thread: usize) -> Self {
        self.limit_by_thread = limit_by_thread;
        self
    }

    pub fn with_throttling_time(mut self, throttling_time: Duration) -> Self {
        self.throttling_time = throttling_time;
        self
    }

    pub fn with_wait_flush(mut self, wait_flush: Duration) -> Self {
        self.wait_flush = wait_flush;
        self
    }

    pub fn with_pre_init_logs_limit(mut self, pre_init_logs_limit: usize) -> Self {
        self.pre_init_logs_limit = pre_init_logs_limit;
        self
    }

    /// Checks that the configuration can drive a worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_period.is_zero() {
            return Err(ConfigError::ZeroFlushPeriod);
        }
        if self.wait_flush.is_zero() {
            return Err(ConfigError::ZeroWaitFlush);
        }
        if self.limit_by_thread == 0 {
            return Err(ConfigError::ZeroThreadLimit);
        }
        Ok(())
    }
}

/// A [`BusConfig`] that was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("flush period must be non-zero")]
    ZeroFlushPeriod,
    #[error("wait_flush poll interval must be non-zero")]
    ZeroWaitFlush,
    #[error("limit_by_thread must be at least 1")]
    ZeroThreadLimit,
}

/// The live, hot-swappable copy of a [`BusConfig`].
#[derive(Debug)]
pub(crate) struct Tunables {
    flush_period_us: AtomicU64,
    limit_by_thread: AtomicUsize,
    throttling_time_us: AtomicU64,
    wait_flush_us: AtomicU64,
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl Tunables {
    pub(crate) fn new(config: &BusConfig) -> Self {
        Self {
            flush_period_us: AtomicU64::new(micros(config.flush_period)),
            limit_by_thread: AtomicUsize::new(config.limit_by_thread),
            throttling_time_us: AtomicU64::new(micros(config.throttling_time)),
            wait_flush_us: AtomicU64::new(micros(config.wait_flush)),
        }
    }

    pub(crate) fn store(&self, config: &BusConfig) {
        self.flush_period_us
            .store(micros(config.flush_period), Ordering::Relaxed);
        self.limit_by_thread
            .store(config.limit_by_thread, Ordering::Relaxed);
        self.throttling_time_us
            .store(micros(config.throttling_time), Ordering::Relaxed);
        self.wait_flush_us
            .store(micros(config.wait_flush), Ordering::Relaxed);
    }

    pub(crate) fn flush_period(&self) -> Duration {
        Duration::from_micros(self.flush_period_us.load(Ordering::Relaxed))
    }

    pub(crate) fn limit_by_thread(&self) -> usize {
        self.limit_by_thread.load(Ordering::Relaxed)
    }

    pub(crate) fn throttling_time(&self) -> Duration {
        Duration::from_micros(self.throttling_time_us.load(Ordering::Relaxed))
    }

    pub(crate) fn wait_flush(&self) -> Duration {
        Duration::from_micros(self.wait_flush_us.load(Ordering::Relaxed))
    }
}
