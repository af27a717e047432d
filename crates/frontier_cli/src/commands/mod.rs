//! CLI command implementations.

pub mod lock;
pub mod maintenance;
pub mod merge;
pub mod pointer;
pub mod reconcile;
pub mod strategy;
pub mod sync;

use frontier_sync::{StrategyStore, SyncConfig, SyncContext, SyncEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File under the config directory holding media strategies.
pub const STRATEGY_FILE: &str = "strategies.json";

/// Where a command operates and where user settings live.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Workspace path as given.
    pub workspace: PathBuf,
    /// Config directory; strategies are kept in memory without one.
    pub config_dir: Option<PathBuf>,
}

impl Settings {
    /// Resolves the config directory, falling back to `~/.config/frontier`.
    pub fn new(workspace: PathBuf, config_dir: Option<PathBuf>) -> Self {
        let config_dir = config_dir.or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config").join("frontier"))
        });
        Self {
            workspace,
            config_dir,
        }
    }

    /// Opens the strategy store.
    pub fn strategies(&self) -> Result<StrategyStore, Box<dyn std::error::Error>> {
        Ok(match &self.config_dir {
            Some(dir) => StrategyStore::open(dir.join(STRATEGY_FILE))?,
            None => StrategyStore::in_memory(),
        })
    }

    /// Builds the sync configuration used by every command.
    ///
    /// Each invocation is its own process, so a lease found on open may
    /// belong to a concurrent invocation and is never removed unconditionally.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default().with_startup_cleanup(false)
    }

    /// Opens an engine for the workspace.
    pub fn engine(&self) -> Result<(Arc<SyncContext>, SyncEngine), Box<dyn std::error::Error>> {
        let ctx = SyncContext::with_defaults(self.sync_config(), Arc::new(self.strategies()?))?;
        let engine = ctx.open(&self.workspace)?;
        Ok((ctx, engine))
    }

    /// Returns the workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Prints the remedy for a sync error to stderr before it is returned.
pub fn explain(err: frontier_sync::SyncError) -> Box<dyn std::error::Error> {
    if let Some(remedy) = err.remedy() {
        eprintln!("hint: {remedy}");
    }
    Box::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontier_sync::RepoStrategy;
    use tempfile::tempdir;

    #[test]
    fn strategies_persist_under_config_dir() {
        let config = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let settings = Settings::new(
            workspace.path().to_path_buf(),
            Some(config.path().to_path_buf()),
        );

        settings
            .strategies()
            .unwrap()
            .set(workspace.path(), RepoStrategy::StreamOnly)
            .unwrap();

        assert!(config.path().join(STRATEGY_FILE).exists());
        let reopened = settings.strategies().unwrap();
        assert_eq!(reopened.get(workspace.path()), RepoStrategy::StreamOnly);
    }

    #[test]
    fn cli_never_cleans_leases_on_open() {
        let settings = Settings::new(PathBuf::from("."), None);
        assert!(!settings.sync_config().startup_cleanup);
    }
}
