//! Cluster Configuration
//!
//! Tuning parameters shared by every node of one simulated cluster.

use crate::cluster::registry::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::error::{Error, Result};
use std::time::Duration;

/// Default delay between two registration watch polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Default time to wait for a shared lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a simulated cluster
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Fixed delay between registration watch polls
    pub poll_interval: Duration,
    /// Maximum concurrent notification / poll tasks
    pub worker_threads: usize,
    /// Capacity of the membership observer channel
    pub event_channel_capacity: usize,
    /// Timeout used by `get_lock`
    pub lock_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_threads: available_parallelism(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl ClusterConfig {
    /// Set the registration watch poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the worker pool size
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Set the default lock timeout
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration("poll_interval must be non-zero".into()));
        }
        if self.worker_threads == 0 {
            return Err(Error::Configuration("worker_threads must be at least 1".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Configuration(
                "event_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClusterConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert!(config.worker_threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = ClusterConfig::default().with_poll_interval(Duration::ZERO);
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        let config = ClusterConfig::default().with_worker_threads(0);
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }
}
