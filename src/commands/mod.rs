//! Command modules for the codestruct CLI
//!
//! Each command module implements a single top-level command:
//! - `generate` - Build or refresh the structure directory
//! - `validate` - Score a structure directory against a validation level
//! - `query` - Assemble token-budgeted context from a structure directory
//!
//! All command handlers take their respective `Args` struct from `cli.rs`
//! and a shared `CommandContext` for output format and verbosity.

pub mod generate;
pub mod query;
pub mod validate;

pub use generate::run_generate;
pub use query::run_query;
pub use validate::run_validate;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::StructError;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Output format (text, toon, or json)
    pub format: OutputFormat,
    /// Show verbose output
    pub verbose: bool,
    /// Show progress during long operations
    pub progress: bool,
}

impl Default for CommandContext {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            verbose: false,
            progress: false,
        }
    }
}

impl CommandContext {
    /// Create a new CommandContext from CLI args
    pub fn from_cli(format: OutputFormat, verbose: bool, progress: bool) -> Self {
        Self {
            format,
            verbose,
            progress,
        }
    }

    /// Render `value` as JSON or TOON, or fall back to `text` for text output
    pub fn render<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> String {
        match self.format {
            OutputFormat::Text => text(),
            OutputFormat::Json => {
                let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                let mut out = serde_json::to_string_pretty(&json).unwrap_or_default();
                out.push('\n');
                out
            }
            OutputFormat::Toon => {
                let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                let mut out = encode_toon(&json);
                out.push('\n');
                out
            }
        }
    }
}

/// Encode a JSON value as proper TOON using the rtoon library
pub fn encode_toon(value: &serde_json::Value) -> String {
    rtoon::encode_default(value).unwrap_or_else(|e| format!("TOON encoding error: {}", e))
}

/// What a command prints, plus the failure that decides a non-zero exit
/// even though a report was produced
#[derive(Debug)]
pub struct CommandOutput {
    pub text: String,
    pub failure: Option<StructError>,
}

impl CommandOutput {
    pub fn success(text: String) -> Self {
        Self { text, failure: None }
    }

    pub fn failed(text: String, failure: StructError) -> Self {
        Self {
            text,
            failure: Some(failure),
        }
    }
}
