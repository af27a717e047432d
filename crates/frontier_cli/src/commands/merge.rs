//! Complete-merge command implementation.

use super::{explain, Settings};
use crate::error::CliError;
use frontier_lfs::{repo_path, slash_path};
use frontier_sync::{Author, Credentials, Resolution};

/// Parses a JSON resolution list and checks every path stays inside the
/// workspace.
pub fn parse_resolutions(json: &str) -> Result<Vec<Resolution>, CliError> {
    let resolutions: Vec<Resolution> = serde_json::from_str(json)?;
    resolutions
        .into_iter()
        .map(|resolution| {
            let raw = resolution.filepath.to_string_lossy().into_owned();
            let path = repo_path(&raw).ok_or(CliError::InvalidPath(raw))?;
            Ok(Resolution::new(path, resolution.resolution))
        })
        .collect()
}

/// Runs the complete-merge command.
pub fn run(
    settings: &Settings,
    auth: &Credentials,
    author: &Author,
    resolutions: &[Resolution],
) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, engine) = settings.engine()?;
    let result = engine.complete_merge(auth, author, resolutions);
    ctx.shutdown();
    let outcome = result.map_err(explain)?;

    println!("Merge commit {}", outcome.commit);
    for resolution in resolutions {
        println!(
            "  {:<10} {}",
            format!("{:?}", resolution.resolution).to_lowercase(),
            slash_path(&resolution.filepath)
        );
    }
    if outcome.forced {
        println!("  Pushed with --force");
    } else {
        println!("  Pushed");
    }
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}
