//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::index::TagMode;
use crate::query::context::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_TOKENS};
use crate::validate::Level;

/// Default structure directory name
pub const DEFAULT_STRUCT_DIR: &str = "struct";

/// Hierarchical code-structure generator, validator and context assembler
#[derive(Parser, Debug)]
#[command(name = "codestruct")]
#[command(about = "Turns a source tree into a validated, queryable structure directory")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Show verbose output (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show progress during long operations
    #[arg(long, global = true)]
    pub progress: bool,
}

// ============================================
// Main Commands Enum
// ============================================

/// Available subcommands for codestruct
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or refresh the structure directory for a source tree
    #[command(visible_alias = "g")]
    Generate(GenerateArgs),

    /// Validate a structure directory at a given level
    #[command(visible_alias = "v")]
    Validate(ValidateArgs),

    /// Assemble token-budgeted context from a structure directory
    #[command(visible_alias = "q")]
    Query(QueryArgs),
}

// ============================================
// Generate Subcommand
// ============================================

/// Arguments for the generate command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Root of the source tree
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Structure directory to write (defaults to <root>/struct)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Reuse shards of files whose content is unchanged since the last build
    #[arg(long)]
    pub incremental: bool,

    /// Validate the result and fail below this level's threshold
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub validate_level: Option<Level>,

    /// Configuration file (defaults to <root>/codestruct.toml)
    #[arg(long, value_name = "FILE", env = "CODESTRUCT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Worker threads for parsing (0 = one per core)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Skip the configured summary generator
    #[arg(long)]
    pub no_summaries: bool,
}

impl GenerateArgs {
    /// Structure directory, defaulting under the root
    pub fn out_dir(&self) -> PathBuf {
        self.out
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_STRUCT_DIR))
    }
}

// ============================================
// Validate Subcommand
// ============================================

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Structure directory to validate
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STRUCT_DIR)]
    pub struct_dir: PathBuf,

    /// Validation level
    #[arg(long, value_enum, default_value = "standard")]
    pub level: Level,

    /// Configuration file for convention thresholds
    #[arg(long, value_name = "FILE", env = "CODESTRUCT_CONFIG")]
    pub config: Option<PathBuf>,
}

// ============================================
// Query Subcommand
// ============================================

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Structure directory to query
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STRUCT_DIR)]
    pub struct_dir: PathBuf,

    /// Module or entity uid to center the context on (repeatable)
    #[arg(long = "uid", value_name = "UID")]
    pub uids: Vec<String>,

    /// Tags to match (repeatable or comma-separated)
    #[arg(long, value_name = "TAG", num_args = 1.., value_delimiter = ',')]
    pub tags: Vec<String>,

    /// How multiple tags combine
    #[arg(long, value_enum, default_value = "and")]
    pub mode: TagMode,

    /// Free-text search over uids, summaries, tags and paths
    #[arg(long, value_name = "QUERY")]
    pub text: Option<String>,

    /// Token budget for the rendered context
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: usize,

    /// Dependency hops followed from each uid
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    pub depth: usize,
}

// ============================================
// Output Format
// ============================================

/// Output format for all commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default for terminal)
    #[default]
    #[value(alias = "pretty")]
    Text,
    /// TOON (Token-Oriented Object Notation) - token-efficient format for AI consumption
    Toon,
    /// JSON - standard JSON output for machine parsing
    Json,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
