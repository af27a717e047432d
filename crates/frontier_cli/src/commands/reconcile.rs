//! Reconcile command implementation.

use super::{explain, Settings};
use frontier_lfs::slash_path;
use frontier_sync::Credentials;

/// Runs the reconcile command.
pub fn run(settings: &Settings, auth: &Credentials) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, engine) = settings.engine()?;
    let result = engine.reconcile(auth);
    ctx.shutdown();
    let report = result.map_err(explain)?;

    println!("Strategy: {}", report.strategy);
    println!("  Downloaded:   {}", report.downloaded.len());
    println!("  Placeholders: {}", report.placeholders.len());
    println!("  Already here: {}", report.skipped_existing.len());
    for failure in &report.failed {
        let paths: Vec<String> = failure.paths.iter().map(|p| slash_path(p)).collect();
        println!("  failed {} ({}): {}", failure.oid, paths.join(", "), failure.message);
    }
    if !report.local_only.is_empty() {
        println!();
        println!("Local files with no committed pointer:");
        for path in &report.local_only {
            println!("  {}", slash_path(path));
        }
    }
    Ok(())
}
