//! Frontier CLI
//!
//! Command-line front end for workspace synchronization.
//!
//! # Commands
//!
//! - `sync` - Commit local changes and bring local and remote together
//! - `complete-merge` - Commit conflict resolutions and push the merge
//! - `lock-status` - Show who holds the workspace sync lock
//! - `unlock` - Forcibly remove a stuck sync lock
//! - `pack` - Pack loose objects into a single pack
//! - `cleanup-packs` - Remove pack artifacts left by interrupted operations
//! - `reconcile` - Apply the media strategy to committed large files
//! - `strategy` - Show or choose the media strategy of a workspace
//! - `pointer` - Encode or decode large-file pointers

mod commands;
mod error;

use clap::{Args, Parser, Subcommand};
use frontier_lfs::RepoStrategy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keeps a working copy synchronized with its origin remote.
#[derive(Parser)]
#[command(name = "frontier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the workspace (defaults to the current directory)
    #[arg(global = true, short = 'C', long)]
    workspace: Option<PathBuf>,

    /// Directory holding per-user settings such as media strategies
    #[arg(global = true, long, env = "FRONTIER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Account used for the remote and the large-file server.
#[derive(Args)]
struct AuthArgs {
    /// Account name
    #[arg(long, env = "FRONTIER_USERNAME")]
    username: String,

    /// Password or access token
    #[arg(long, env = "FRONTIER_PASSWORD", hide_env_values = true)]
    password: String,
}

/// Identity recorded on commits.
#[derive(Args)]
struct AuthorArgs {
    /// Commit author name
    #[arg(long, env = "FRONTIER_AUTHOR_NAME")]
    author_name: String,

    /// Commit author email
    #[arg(long, env = "FRONTIER_AUTHOR_EMAIL")]
    author_email: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit local changes and bring local and remote together
    Sync {
        #[command(flatten)]
        auth: AuthArgs,

        #[command(flatten)]
        author: AuthorArgs,

        /// Retry transient failures with backoff
        #[arg(short, long)]
        retry: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Commit conflict resolutions as a merge and push it
    CompleteMerge {
        #[command(flatten)]
        auth: AuthArgs,

        #[command(flatten)]
        author: AuthorArgs,

        /// JSON array of {"filepath", "resolution"} objects
        #[arg(long, default_value = "[]")]
        resolutions: String,
    },

    /// Show who holds the workspace sync lock
    LockStatus {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Forcibly remove the workspace sync lock
    Unlock {
        /// Remove the lock even if its holder looks alive
        #[arg(long)]
        force: bool,
    },

    /// Pack loose objects into a single pack
    Pack,

    /// Remove pack artifacts left by interrupted operations
    CleanupPacks,

    /// Apply the media strategy to committed large files
    Reconcile {
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Show or choose the media strategy of the workspace
    Strategy {
        #[command(subcommand)]
        command: StrategyCommand,
    },

    /// Encode or decode large-file pointers
    Pointer {
        #[command(subcommand)]
        command: PointerCommand,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StrategyCommand {
    /// Print the current strategy
    Get,
    /// Choose a strategy (auto-download, stream-and-save, stream-only)
    Set {
        /// Strategy name
        strategy: RepoStrategy,
    },
}

#[derive(Subcommand)]
enum PointerCommand {
    /// Print the pointer for a file's content
    Encode {
        /// File to hash
        file: PathBuf,
    },
    /// Parse a pointer file and print its object id and size
    Decode {
        /// Pointer file
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let workspace = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let settings = commands::Settings::new(workspace, cli.config_dir);

    match cli.command {
        Commands::Sync {
            auth,
            author,
            retry,
            format,
        } => {
            commands::sync::run(&settings, &auth.into(), &author.into(), retry, &format)?;
        }
        Commands::CompleteMerge {
            auth,
            author,
            resolutions,
        } => {
            let resolutions = commands::merge::parse_resolutions(&resolutions)?;
            commands::merge::run(&settings, &auth.into(), &author.into(), &resolutions)?;
        }
        Commands::LockStatus { format } => commands::lock::status(&settings, &format)?,
        Commands::Unlock { force } => commands::lock::unlock(&settings, force)?,
        Commands::Pack => commands::maintenance::pack(&settings)?,
        Commands::CleanupPacks => commands::maintenance::cleanup(&settings)?,
        Commands::Reconcile { auth } => commands::reconcile::run(&settings, &auth.into())?,
        Commands::Strategy { command } => match command {
            StrategyCommand::Get => commands::strategy::get(&settings)?,
            StrategyCommand::Set { strategy } => commands::strategy::set(&settings, strategy)?,
        },
        Commands::Pointer { command } => match command {
            PointerCommand::Encode { file } => commands::pointer::encode(&file)?,
            PointerCommand::Decode { file } => commands::pointer::decode(&file)?,
        },
        Commands::Version => {
            println!("Frontier CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

impl From<AuthArgs> for frontier_sync::Credentials {
    fn from(args: AuthArgs) -> Self {
        frontier_sync::Credentials::new(args.username, args.password)
    }
}

impl From<AuthorArgs> for frontier_sync::Author {
    fn from(args: AuthorArgs) -> Self {
        frontier_sync::Author::new(args.author_name, args.author_email)
    }
}
