//! The on-disk lease record and its classification.

use crate::config::LockConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Optional progress counter reported by the lease owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Units completed.
    pub current: u64,
    /// Units expected.
    pub total: u64,
    /// What is being counted.
    #[serde(default)]
    pub description: String,
}

impl Progress {
    /// Creates a progress value.
    pub fn new(current: u64, total: u64, description: impl Into<String>) -> Self {
        Self {
            current,
            total,
            description: description.into(),
        }
    }
}

/// Lease file content.
///
/// Timestamps are epoch milliseconds. `pid` is optional only so that
/// legacy leases written without it still parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockLease {
    /// Owning process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Last heartbeat.
    pub timestamp: u64,
    /// Last observed forward progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress: Option<u64>,
    /// Current operation label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// When `phase` last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_changed_at: Option<u64>,
    /// Optional progress counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl LockLease {
    /// A fresh lease for `pid` at `now`.
    pub fn new(pid: u32, now: u64) -> Self {
        Self {
            pid: Some(pid),
            timestamp: now,
            last_progress: None,
            phase: None,
            phase_changed_at: None,
            progress: None,
        }
    }

    /// Parses lease bytes. `None` means unparsable.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Age of the heartbeat at `now`.
    pub fn heartbeat_age(&self, now: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.timestamp))
    }

    /// Age of the last forward progress at `now`.
    ///
    /// Falls back to the phase change, then the heartbeat, for owners that
    /// have not reported progress yet.
    pub fn progress_age(&self, now: u64) -> Duration {
        let since = self
            .last_progress
            .or(self.phase_changed_at)
            .unwrap_or(self.timestamp);
        Duration::from_millis(now.saturating_sub(since))
    }

    /// Age of the current phase at `now`.
    pub fn phase_age(&self, now: u64) -> Duration {
        let since = self.phase_changed_at.unwrap_or(self.timestamp);
        Duration::from_millis(now.saturating_sub(since))
    }

    /// Returns true if this lease was written without a pid.
    pub fn is_legacy(&self) -> bool {
        self.pid.is_none()
    }
}

/// Liveness of an observed lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lease file exists.
    Free,
    /// Owner alive and making progress.
    Active,
    /// Owner alive but not progressing.
    Stuck,
    /// Owner gone; safe to reclaim.
    Dead,
}

impl LockState {
    /// Returns true if the lease may be removed without asking anyone.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, LockState::Free | LockState::Dead)
    }
}

/// Classifies a lease observed at `now`.
///
/// `None` stands for unparsable content, which is always dead.
pub fn classify(lease: Option<&LockLease>, now: u64, config: &LockConfig) -> LockState {
    let Some(lease) = lease else {
        return LockState::Dead;
    };

    if lease.is_legacy() {
        return if lease.heartbeat_age(now) > config.legacy_timeout {
            LockState::Dead
        } else {
            LockState::Active
        };
    }

    if lease.heartbeat_age(now) > config.heartbeat_timeout {
        return LockState::Dead;
    }

    if lease.progress_age(now) <= config.progress_timeout {
        return LockState::Active;
    }

    let in_grace = lease
        .phase
        .as_deref()
        .is_some_and(|phase| config.is_cpu_bound(phase))
        && lease.phase_age(now) <= config.cpu_bound_grace;
    if in_grace {
        LockState::Active
    } else {
        LockState::Stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase;

    const SEC: u64 = 1000;
    const NOW: u64 = 10_000 * SEC;

    fn lease(heartbeat_age: u64, progress_age: u64) -> LockLease {
        LockLease {
            pid: Some(42),
            timestamp: NOW - heartbeat_age,
            last_progress: Some(NOW - progress_age),
            phase: Some(phase::FETCHING.to_string()),
            phase_changed_at: Some(NOW - progress_age),
            progress: None,
        }
    }

    #[test]
    fn wire_format_is_camel_case() {
        let mut lease = LockLease::new(7, 1234);
        lease.phase_changed_at = Some(1200);
        lease.progress = Some(Progress::new(1, 4, "objects"));
        let json: serde_json::Value = serde_json::to_value(&lease).unwrap();
        assert_eq!(json["pid"], 7);
        assert_eq!(json["timestamp"], 1234);
        assert_eq!(json["phaseChangedAt"], 1200);
        assert_eq!(json["progress"]["total"], 4);
        assert!(json.get("lastProgress").is_none());
    }

    #[test]
    fn parses_minimal_and_legacy() {
        let minimal = LockLease::parse(br#"{"pid": 12, "timestamp": 99}"#).unwrap();
        assert_eq!(minimal.pid, Some(12));
        let legacy = LockLease::parse(br#"{"timestamp": 99}"#).unwrap();
        assert!(legacy.is_legacy());
        assert!(LockLease::parse(b"not json").is_none());
        assert!(LockLease::parse(b"").is_none());
    }

    #[test]
    fn active_when_fresh() {
        let config = LockConfig::default();
        assert_eq!(classify(Some(&lease(5 * SEC, 5 * SEC)), NOW, &config), LockState::Active);
    }

    #[test]
    fn dead_after_heartbeat_timeout() {
        let config = LockConfig::default();
        assert_eq!(classify(Some(&lease(46 * SEC, 46 * SEC)), NOW, &config), LockState::Dead);
        assert_eq!(classify(None, NOW, &config), LockState::Dead);
    }

    #[test]
    fn stuck_without_progress() {
        let config = LockConfig::default();
        assert_eq!(classify(Some(&lease(5 * SEC, 121 * SEC)), NOW, &config), LockState::Stuck);
    }

    #[test]
    fn cpu_bound_phase_gets_grace() {
        let config = LockConfig::default();
        let mut packing = lease(5 * SEC, 150 * SEC);
        packing.phase = Some(phase::PACKING.to_string());
        assert_eq!(classify(Some(&packing), NOW, &config), LockState::Active);

        packing.phase_changed_at = Some(NOW - 181 * SEC);
        packing.last_progress = Some(NOW - 181 * SEC);
        assert_eq!(classify(Some(&packing), NOW, &config), LockState::Stuck);
    }

    #[test]
    fn legacy_uses_long_timeout() {
        let config = LockConfig::default();
        let mut legacy = lease(60 * SEC, 60 * SEC);
        legacy.pid = None;
        assert_eq!(classify(Some(&legacy), NOW, &config), LockState::Active);
        legacy.timestamp = NOW - 301 * SEC;
        assert_eq!(classify(Some(&legacy), NOW, &config), LockState::Dead);
    }

    #[test]
    fn missing_progress_falls_back_to_heartbeat() {
        let config = LockConfig::default();
        let fresh = LockLease::new(1, NOW - SEC);
        assert_eq!(classify(Some(&fresh), NOW, &config), LockState::Active);
    }
}
