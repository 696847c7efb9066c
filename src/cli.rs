use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub compact: bool,  // global --compact
}

#[derive(Parser)]
#[command(name = "versed")]
#[command(
    about = "Versioned file editing: numbered backups, SEARCH/REPLACE diffs, and tagged change sessions"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output (records are still printed)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Print JSON records on a single line
    #[arg(long, global = true)]
    pub compact: bool,

    /// Explicit config file (default: first of versed.toml/.yaml/.json, .versed.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or overwrite a file, backing up the previous contents
    Write(WriteArgs),

    /// Print the current file or a stored version
    Read(ReadArgs),

    /// List stored versions, newest first
    Versions(VersionsArgs),

    /// Replace a file with a stored version
    Restore(RestoreArgs),

    /// Apply SEARCH/REPLACE blocks to a file
    ApplyDiff(ApplyDiffArgs),

    /// Locate text in a file (exact, then fuzzy)
    Search(SearchArgs),

    /// Inspect and restore tagged change sessions
    Sessions(SessionsArgs),

    /// Run one JSON request read from stdin
    Call,

    /// Initialize a versed.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Target file
    pub path: String,

    /// Inline content (otherwise --content-file, otherwise stdin)
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    /// Read content from this file
    #[arg(long, value_name = "FILE")]
    pub content_file: Option<PathBuf>,

    /// Parse content as JSON and write it in canonical pretty form
    #[arg(long)]
    pub json: bool,

    /// Skip the pre-write backup
    #[arg(long)]
    pub no_backup: bool,

    /// Change tag embedded in the backup name
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Target file
    pub path: String,

    /// Version number or "current"
    #[arg(long, default_value = "current")]
    pub version: String,
}

#[derive(Args, Debug)]
pub struct VersionsArgs {
    /// Target file
    pub path: String,

    /// Render a table instead of JSON
    #[arg(long)]
    pub human: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Target file
    pub path: String,

    /// Version number or "current"
    #[arg(long)]
    pub version: String,
}

#[derive(Args, Debug)]
pub struct ApplyDiffArgs {
    /// Target file
    pub path: String,

    /// Read the instruction from this file (otherwise stdin)
    #[arg(long, value_name = "FILE")]
    pub instruction_file: Option<PathBuf>,

    /// Replace every occurrence instead of failing on ambiguity
    #[arg(long)]
    pub replace_all: bool,

    /// Skip the pre-write backup
    #[arg(long)]
    pub no_backup: bool,

    /// Change tag embedded in the backup name
    #[arg(long)]
    pub tag: Option<String>,

    /// Show a unified diff without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Target file
    pub path: String,

    /// Text to locate
    pub text: String,

    /// Minimum similarity for fuzzy candidates (0..=1)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum results
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Context lines around each hit
    #[arg(long)]
    pub context: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsSubcommand,

    /// Tree to scan (default: configured root)
    #[arg(long, global = true)]
    pub root: Option<String>,

    /// Render a table instead of JSON
    #[arg(long, global = true)]
    pub human: bool,
}

#[derive(Subcommand, Debug)]
pub enum SessionsSubcommand {
    /// List sessions grouped by tag, newest first
    List,

    /// Show every backup carrying a tag
    Show {
        /// Change tag
        tag: String,
    },

    /// List every tag seen
    Tags,

    /// Restore every file of a session
    Restore {
        /// Change tag
        tag: String,
    },
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
