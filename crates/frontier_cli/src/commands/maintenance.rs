//! Pack and cleanup-packs commands.

use super::{explain, Settings};

/// Runs the pack command.
pub fn pack(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, engine) = settings.engine()?;
    let result = engine.pack();
    ctx.shutdown();
    let report = result.map_err(explain)?;

    match &report.pack_name {
        Some(name) => {
            println!("✓ Packed {} objects into {name}", report.objects_packed);
            println!("  Loose objects removed: {}", report.loose_removed);
            println!("  Old packs removed:     {}", report.packs_removed);
        }
        None => println!("Nothing to pack"),
    }
    if report.orphans_removed > 0 {
        println!("  Orphaned artifacts:    {}", report.orphans_removed);
    }
    Ok(())
}

/// Runs the cleanup-packs command.
pub fn cleanup(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, engine) = settings.engine()?;
    let result = engine.cleanup_packs();
    ctx.shutdown();
    let report = result.map_err(explain)?;

    if report.removed() == 0 {
        println!("No orphaned pack artifacts");
        return Ok(());
    }
    println!("✓ Removed {} orphaned pack artifacts", report.removed());
    for path in report.temp_files.iter().chain(&report.unpaired) {
        println!("  {}", path.display());
    }
    Ok(())
}
