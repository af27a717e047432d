//! Lock status and unlock commands.

use super::Settings;
use crate::error::CliError;
use frontier_lock::{check_filesystem_lock, force_release, LockState, LockStatus, Progress};
use serde::Serialize;

/// Lock status as printed.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Workspace path.
    pub workspace: String,
    /// free, active, stuck or dead.
    pub state: &'static str,
    /// Holder pid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Holder's phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Seconds since the last heartbeat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_age_secs: Option<u64>,
    /// Seconds since the last forward progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_age_secs: Option<u64>,
    /// Holder's progress counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl StatusReport {
    fn new(workspace: &str, status: LockStatus) -> Self {
        Self {
            workspace: workspace.to_string(),
            state: state_name(status.state),
            pid: status.pid,
            phase: status.phase,
            heartbeat_age_secs: status.heartbeat_age.map(|age| age.as_secs()),
            progress_age_secs: status.progress_age.map(|age| age.as_secs()),
            progress: status.progress,
        }
    }
}

fn state_name(state: LockState) -> &'static str {
    match state {
        LockState::Free => "free",
        LockState::Active => "active",
        LockState::Stuck => "stuck",
        LockState::Dead => "dead",
    }
}

/// Runs the lock-status command.
pub fn status(settings: &Settings, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = settings.workspace();
    let status = check_filesystem_lock(workspace, &settings.sync_config().lock)?;
    let report = StatusReport::new(&workspace.display().to_string(), status);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Sync lock of {}: {}", report.workspace, report.state);
            if let Some(pid) = report.pid {
                println!("  Holder pid:    {pid}");
            }
            if let Some(phase) = &report.phase {
                println!("  Phase:         {phase}");
            }
            if let Some(age) = report.heartbeat_age_secs {
                println!("  Heartbeat:     {} ago", format_age(age));
            }
            if let Some(age) = report.progress_age_secs {
                println!("  Last progress: {} ago", format_age(age));
            }
            if let Some(progress) = &report.progress {
                println!(
                    "  Progress:      {}/{} {}",
                    progress.current, progress.total, progress.description
                );
            }
            if report.state == "stuck" {
                println!();
                println!("The holder is alive but not progressing. Use `frontier unlock --force`");
                println!("only if you are sure it will not finish.");
            }
        }
    }
    Ok(())
}

/// Runs the unlock command.
///
/// Without `force`, only a lease whose holder is gone is removed.
pub fn unlock(settings: &Settings, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = settings.workspace();
    let status = check_filesystem_lock(workspace, &settings.sync_config().lock)?;
    if !force && !status.state.is_reclaimable() {
        return Err(CliError::LockHeld {
            workspace: workspace.to_path_buf(),
            state: state_name(status.state).to_string(),
            pid: status
                .pid
                .map_or_else(|| "unknown".to_string(), |pid| pid.to_string()),
        }
        .into());
    }

    if force_release(workspace)? {
        println!("✓ Removed sync lock of {}", workspace.display());
    } else {
        println!("No sync lock in {}", workspace.display());
    }
    Ok(())
}

fn format_age(secs: u64) -> String {
    if secs < 120 {
        format!("{secs}s")
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ages_are_human_readable() {
        assert_eq!(format_age(5), "5s");
        assert_eq!(format_age(200), "3m 20s");
    }

    #[test]
    fn free_lock_report_has_no_holder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let settings = Settings::new(dir.path().to_path_buf(), None);
        let status = check_filesystem_lock(dir.path(), &settings.sync_config().lock).unwrap();
        let report = StatusReport::new("ws", status);
        assert_eq!(report.state, "free");
        assert!(report.pid.is_none());
    }
}
