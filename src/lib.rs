//! codestruct: hierarchical code structure for token-budgeted retrieval
//!
//! A source tree is parsed with tree-sitter into modules, classes, functions
//! and methods, each with a stable hierarchical uid, tags, a summary and
//! metrics. The result is written as a sharded structure directory:
//!
//! ```text
//! struct/
//!   index.json        compact per-module entries, package tree, stats
//!   modules/<uid>.<hash>.json full entity detail, one shard per module
//!   schema.json       JSON Schema for the documents above
//!   metadata.json     build timing and counts
//!   cache.json        per-file hashes for incremental rebuilds
//!   delta.json        what changed since the previous build
//! ```
//!
//! The directory can be validated at four levels and queried for a
//! bounded, ranked context around uids, tags or free text.
//!
//! # Supported Languages
//!
//! - Python
//! - JavaScript, TypeScript, TSX
//! - Rust
//!
//! # Example
//!
//! ```ignore
//! use codestruct::indexing::{rebuild, RebuildOptions};
//! use codestruct::query::{assemble, ContextRequest};
//! use codestruct::{StructConfig, StructIndex};
//!
//! let options = RebuildOptions {
//!     root: "my-repo".into(),
//!     out: "my-repo/struct".into(),
//!     incremental: true,
//!     config: StructConfig::default(),
//!     generator: None,
//! };
//! rebuild(&options, None)?;
//!
//! let index = StructIndex::load("my-repo/struct")?;
//! let request = ContextRequest {
//!     uids: vec!["app.models".to_string()],
//!     max_tokens: 1500,
//!     ..Default::default()
//! };
//! println!("{}", assemble(&index, &request)?.text);
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod detectors;
pub mod enrich;
pub mod error;
pub mod fs_utils;
pub mod index;
pub mod indexing;
pub mod lang;
pub mod parsing;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod shard;
pub mod uid;
pub mod validate;

// Re-export commonly used types
pub use cache::{content_hash, StructDir};
pub use cli::{Cli, OutputFormat};
pub use config::StructConfig;
pub use enrich::summarizer::SummaryGenerator;
pub use error::{Result, StructError};
pub use index::{StructIndex, TagMode};
pub use indexing::{rebuild, RebuildOptions, RebuildReport};
pub use lang::Lang;
pub use schema::{
    Entity, EntityKind, IndexEntry, IndexFile, LinkStatus, ModuleShard, SCHEMA_VERSION,
};
pub use validate::{Level, ValidationReport, Validator};
