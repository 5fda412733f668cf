//! Error types and exit codes for codestruct

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for codestruct operations
#[derive(Error, Debug)]
pub enum StructError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("All {failed} source files failed to parse")]
    FatalParse { failed: usize },

    #[error("Structure directory is corrupt ({reason}); run a full `generate` to rebuild it")]
    CorruptIndex { reason: String },

    #[error("No index found at {path}")]
    IndexNotFound { path: PathBuf },

    #[error("Another rebuild holds the lock at {path}")]
    Locked { path: PathBuf },

    #[error("Validation at level {level} failed with score {score:.1}")]
    ValidationFailed { level: String, score: f64 },

    #[error("Query matched nothing")]
    EmptyResult,

    #[error("Nothing fits in {max_tokens} tokens ({omitted} matching blocks left out); raise --max-tokens")]
    BudgetTooSmall { max_tokens: usize, omitted: usize },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl StructError {
    /// Build an `Io` error tagged with the path being touched.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Json {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Convert error to the CLI exit code:
    /// - 1: Validation below threshold
    /// - 2: Fatal parse error
    /// - 3: I/O, configuration, lock or corrupt structure
    /// - 4: Empty query result (nothing matched, or nothing fit the budget)
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }

    /// Numeric form of [`StructError::exit_code`].
    pub fn status(&self) -> u8 {
        match self {
            Self::ValidationFailed { .. } => 1,
            Self::FatalParse { .. } => 2,
            Self::EmptyResult | Self::BudgetTooSmall { .. } => 4,
            Self::Io { .. }
            | Self::Json { .. }
            | Self::Config { .. }
            | Self::CorruptIndex { .. }
            | Self::IndexNotFound { .. }
            | Self::Locked { .. }
            | Self::InvalidArgument { .. } => 3,
        }
    }
}

/// Result type alias for codestruct operations
pub type Result<T> = std::result::Result<T, StructError>;
