//! Lease timing configuration.

use crate::phase;
use std::time::Duration;

/// Thresholds used to classify a lease and to drive its heartbeat.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Heartbeat age after which the owner is considered gone.
    pub heartbeat_timeout: Duration,
    /// Progress age after which a live owner is considered stuck.
    pub progress_timeout: Duration,
    /// Extra allowance for phases that legitimately go quiet.
    pub cpu_bound_grace: Duration,
    /// Age after which a lease without a pid is considered dead.
    pub legacy_timeout: Duration,
    /// Phases that qualify for the grace period.
    pub cpu_bound_phases: Vec<String>,
    /// How often the background heartbeat refreshes the timestamp.
    pub heartbeat_interval: Duration,
    /// Delay before re-reading a lease that looked dead.
    pub recheck_delay: Duration,
}

impl LockConfig {
    /// Sets the heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the progress timeout.
    pub fn with_progress_timeout(mut self, timeout: Duration) -> Self {
        self.progress_timeout = timeout;
        self
    }

    /// Sets the CPU-bound grace period.
    pub fn with_cpu_bound_grace(mut self, grace: Duration) -> Self {
        self.cpu_bound_grace = grace;
        self
    }

    /// Sets the background heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the stale re-check delay.
    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    /// Adds a phase to the CPU-bound set.
    pub fn with_cpu_bound_phase(mut self, phase: impl Into<String>) -> Self {
        self.cpu_bound_phases.push(phase.into());
        self
    }

    /// Returns true if `phase` qualifies for the grace period.
    pub fn is_cpu_bound(&self, phase: &str) -> bool {
        self.cpu_bound_phases.iter().any(|p| p == phase)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(45),
            progress_timeout: Duration::from_secs(120),
            cpu_bound_grace: Duration::from_secs(180),
            legacy_timeout: Duration::from_secs(5 * 60),
            cpu_bound_phases: vec![
                phase::STAGING.to_string(),
                phase::ANALYZING.to_string(),
                phase::MERGING.to_string(),
                phase::PACKING.to_string(),
            ],
            heartbeat_interval: Duration::from_secs(15),
            recheck_delay: Duration::from_millis(250),
        }
    }
}
