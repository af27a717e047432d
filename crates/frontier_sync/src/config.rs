//! Configuration for the sync engine.

use frontier_lfs::LfsConfig;
use frontier_lock::LockConfig;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout of the connectivity pre-check.
    pub connect_timeout: Duration,
    /// Whether to compare remote and local heads after a push.
    pub verify_after_push: bool,
    /// Loose object count above which a sync packs the object database.
    pub pack_threshold: usize,
    /// Whether to rehydrate large files after the working tree moved.
    pub reconcile_after_sync: bool,
    /// Whether the first open of a workspace removes any existing lease.
    ///
    /// Short-lived tools that share workspaces with other processes turn it
    /// off and rely on dead-lease reclamation.
    pub startup_cleanup: bool,
    /// Retry policy of [`sync_with_retry`](crate::SyncEngine::sync_with_retry).
    pub retry: RetryConfig,
    /// Lease timeouts.
    pub lock: LockConfig,
    /// Large-file configuration.
    pub lfs: LfsConfig,
}

impl SyncConfig {
    /// Sets the connectivity pre-check timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables or disables post-push verification.
    pub fn with_verify_after_push(mut self, verify: bool) -> Self {
        self.verify_after_push = verify;
        self
    }

    /// Sets the loose object threshold for opportunistic packing.
    pub fn with_pack_threshold(mut self, threshold: usize) -> Self {
        self.pack_threshold = threshold;
        self
    }

    /// Enables or disables reconciliation after the working tree moved.
    pub fn with_reconcile_after_sync(mut self, reconcile: bool) -> Self {
        self.reconcile_after_sync = reconcile;
        self
    }

    /// Enables or disables lease removal on the first open of a workspace.
    pub fn with_startup_cleanup(mut self, cleanup: bool) -> Self {
        self.startup_cleanup = cleanup;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the lease configuration.
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Sets the large-file configuration.
    pub fn with_lfs(mut self, lfs: LfsConfig) -> Self {
        self.lfs = lfs;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            verify_after_push: true,
            pack_threshold: 512,
            reconcile_after_sync: true,
            startup_cleanup: true,
            retry: RetryConfig::default(),
            lock: LockConfig::default(),
            lfs: LfsConfig::default(),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * jitter_fraction();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::default()
            .with_connect_timeout(Duration::from_secs(3))
            .with_pack_threshold(10)
            .with_verify_after_push(false);

        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.pack_threshold, 10);
        assert!(!config.verify_after_push);
        assert!(config.reconcile_after_sync);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
