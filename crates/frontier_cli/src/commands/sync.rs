//! Sync command implementation.

use super::{explain, Settings};
use crate::error::CliError;
use frontier_lfs::slash_path;
use frontier_sync::{Author, Credentials, SyncOutcome};
use serde::Serialize;
use tracing::info;

/// Sync result as printed.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    /// Workspace path.
    pub workspace: String,
    /// Another sync held the lease.
    pub skipped_due_to_lock: bool,
    /// The remote could not be reached.
    pub offline: bool,
    /// Commit created from local changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<String>,
    /// Merge commit created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<String>,
    /// The branch moved to the remote commit.
    pub fast_forwarded: bool,
    /// Something was pushed.
    pub pushed: bool,
    /// Conflicted paths.
    pub conflicts: Vec<String>,
    /// Problems that did not stop the sync.
    pub warnings: Vec<String>,
}

impl SyncSummary {
    fn new(workspace: &str, outcome: &SyncOutcome) -> Self {
        Self {
            workspace: workspace.to_string(),
            skipped_due_to_lock: outcome.skipped_due_to_lock,
            offline: outcome.offline,
            committed: outcome.committed.map(|oid| oid.to_string()),
            merged: outcome.merged.map(|oid| oid.to_string()),
            fast_forwarded: outcome.fast_forwarded,
            pushed: outcome.pushed,
            conflicts: outcome
                .conflicts
                .iter()
                .map(|conflict| slash_path(&conflict.filepath))
                .collect(),
            warnings: outcome.warnings.clone(),
        }
    }
}

/// Runs the sync command.
pub fn run(
    settings: &Settings,
    auth: &Credentials,
    author: &Author,
    retry: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, engine) = settings.engine()?;
    info!(workspace = %engine.workspace().display(), "syncing");

    let result = if retry {
        engine.sync_with_retry(auth, author)
    } else {
        engine.sync_changes(auth, author)
    };
    ctx.shutdown();
    let outcome = result.map_err(explain)?;

    let summary = SyncSummary::new(&engine.workspace().display().to_string(), &outcome);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text_output(&summary),
    }

    if summary.conflicts.is_empty() {
        Ok(())
    } else {
        Err(CliError::Conflicts(summary.conflicts.len()).into())
    }
}

fn print_text_output(summary: &SyncSummary) {
    if summary.skipped_due_to_lock {
        println!("Another sync is running in {}; skipped", summary.workspace);
        return;
    }

    println!("Workspace: {}", summary.workspace);
    if let Some(commit) = &summary.committed {
        println!("  Committed:      {commit}");
    }
    if summary.offline {
        println!("  Remote unreachable; local changes are committed and will be pushed later");
    }
    if summary.fast_forwarded {
        println!("  Updated to the remote branch");
    }
    if let Some(commit) = &summary.merged {
        println!("  Merged:         {commit}");
    }
    if summary.pushed {
        println!("  Pushed");
    }
    if !summary.conflicts.is_empty() {
        println!();
        println!("Conflicts:");
        for path in &summary.conflicts {
            println!("  {path}");
        }
    }
    if !summary.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  {warning}");
        }
    }
}
