use crate::generate::Target;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hostforge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative host configuration - compile, diff, reconcile, snapshot", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a declarative config into deployable artifacts
    Compile(CompileArgs),

    /// Validate a config without generating anything
    Validate {
        /// Declarative config file
        config: PathBuf,
    },

    /// Diff a config against the last committed snapshot
    Diff(DiffArgs),

    /// Apply live-safe changes and commit a new snapshot
    Apply(ApplyArgs),

    /// Inspect and roll back configuration snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Show the live/reboot classification policy
    Policy(PolicyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Compile
// ============================================================================

#[derive(Parser)]
pub struct CompileArgs {
    /// Declarative config file
    pub config: PathBuf,

    /// Output directory for generated artifacts
    #[arg(short, long, default_value = "out")]
    pub output: PathBuf,

    /// Subset of output formats (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub targets: Vec<Target>,

    /// Collect all emitter errors instead of stopping at the first
    #[arg(long)]
    pub keep_going: bool,
}

// ============================================================================
// Diff / Apply
// ============================================================================

#[derive(Parser)]
pub struct DiffArgs {
    /// Declarative config file to compare against the committed snapshot
    pub config: PathBuf,

    /// Classification policy override file
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// State directory (default: ~/.local/state/hostforge)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Declarative config file to converge the host to
    pub config: PathBuf,

    /// Don't make changes, just show what would happen
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel jobs within an apply stage
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Timeout for each external command, in seconds
    #[arg(long, default_value = "120")]
    pub timeout_secs: u64,

    /// Classification policy override file
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// State directory (default: ~/.local/state/hostforge)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Secrets file for automation credential lookups
    #[arg(long)]
    pub secrets: Option<PathBuf>,
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// List committed generations, oldest first
    List {
        /// State directory (default: ~/.local/state/hostforge)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Restore a prior generation
    Rollback {
        /// Snapshot id (see `snapshot list`)
        id: String,

        /// State directory (default: ~/.local/state/hostforge)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Show one generation in detail
    Show {
        /// Snapshot id (see `snapshot list`)
        id: String,

        /// State directory (default: ~/.local/state/hostforge)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Parser)]
pub struct PolicyArgs {
    /// Policy override file (default: built-in table)
    #[arg(long)]
    pub file: Option<PathBuf>,
}
