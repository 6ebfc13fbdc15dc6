//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Converge - local-first experiment tracker for AI coding
#[derive(Parser, Debug)]
#[command(
    name = "converge",
    version,
    about = "Local-first experiment tracker for AI coding",
    long_about = "Converge captures each AI-coding iteration as reproducible cells so you can compare, restore, and iterate quickly."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory (default: current directory)
    #[arg(long, global = true, env = "CONVERGE_DIR")]
    pub dir: Option<PathBuf>,

    /// Output as JSON (for agent integration)
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a converge repository in the project directory
    Init,

    /// Create a new experiment cell from the current working tree
    Snap(SnapArgs),

    /// Show cell history
    Log {
        /// Maximum number of cells to print
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Show history for a specific branch
        #[arg(long)]
        branch: Option<String>,

        /// Show history across all branches
        #[arg(long)]
        all: bool,
    },

    /// Show status relative to the latest cell
    Status,

    /// Show differences between two cells
    Diff {
        /// Older cell id
        cell_a: String,
        /// Newer cell id
        cell_b: String,
    },

    /// Restore the working tree to a cell
    Restore {
        /// Target cell id
        cell: String,
    },

    /// Create a named branch from the current branch head
    Fork {
        /// New branch name
        name: String,

        /// Switch to the new branch immediately
        #[arg(long)]
        switch: bool,
    },

    /// Switch to another branch, restoring its head into the working tree
    Switch {
        /// Target branch name
        name: String,
    },

    /// List branches and their head cells
    Branches,

    /// Watch file changes and auto-capture cells
    Watch {
        /// Debounce window in milliseconds before auto-snapshot
        #[arg(long, default_value_t = 3000)]
        debounce_ms: u64,
    },

    /// Run on-demand evaluation for a cell
    Eval {
        /// Cell id to evaluate
        cell: String,
    },

    /// Agent integration hooks
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum HookCommands {
    /// Record an agent completion and auto-snapshot if changed
    Complete(HookCompleteArgs),
}

#[derive(Args, Debug)]
pub struct SnapArgs {
    /// Cell message
    #[arg(short, long)]
    pub message: String,

    /// Comma-separated tags
    #[arg(long, default_value = "")]
    pub tags: String,

    /// Agent identifier
    #[arg(long, default_value = "")]
    pub agent: String,

    /// Run evaluation after snapshot
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub eval: bool,
}

#[derive(Args, Debug)]
pub struct HookCompleteArgs {
    /// Unique run identifier used for idempotency
    #[arg(long)]
    pub run_id: String,

    /// Agent name (for example: codex, claude)
    #[arg(long)]
    pub agent: String,

    /// Agent completion message
    #[arg(short, long)]
    pub message: String,

    /// CSV tags
    #[arg(long, default_value = "")]
    pub tags: String,

    /// Run evaluation after snapshot
    #[arg(long)]
    pub eval: bool,
}
