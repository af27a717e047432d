//! Strategy get and set commands.

use super::Settings;
use frontier_lfs::RepoStrategy;

/// Prints the workspace's strategy.
pub fn get(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = settings.strategies()?;
    match store.explicit(settings.workspace()) {
        Some(strategy) => println!("{strategy}"),
        None => println!("{} (default)", RepoStrategy::default()),
    }
    Ok(())
}

/// Records the workspace's strategy.
pub fn set(settings: &Settings, strategy: RepoStrategy) -> Result<(), Box<dyn std::error::Error>> {
    let store = settings.strategies()?;
    store.set(settings.workspace(), strategy)?;
    match store.path() {
        Some(path) => println!("✓ {strategy} saved to {}", path.display()),
        None => println!("{strategy} applies to this invocation only; set FRONTIER_CONFIG_DIR"),
    }
    Ok(())
}
