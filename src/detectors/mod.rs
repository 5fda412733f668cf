//! Language-specific structural detectors
//!
//! # Architecture
//!
//! The detector system has two layers:
//!
//! 1. **Grammar definitions** (`grammar.rs`): per-language AST node mappings,
//!    visibility rules and hook functions, registered per `Lang`.
//!
//! 2. **Generic extractor** (`generic.rs`): one walk over any tree-sitter tree
//!    driven by a `LangGrammar`, producing raw entities, calls and metric inputs.
//!
//! The language modules (`python`, `javascript`, `rust`) only implement the
//! hooks: naming of declarator-bound functions, docstrings and imports.
//!
//! # Adding a New Language
//!
//! 1. Add tree-sitter grammar to `Cargo.toml`
//! 2. Add `Lang` variant in `lang.rs`
//! 3. Add `LangGrammar` in `grammar.rs` with AST node mappings and hooks

use std::collections::BTreeSet;

use crate::lang::Lang;
use crate::schema::{EntityKind, LineSpan};

pub mod common;
pub mod generic;
pub mod grammar;
pub mod javascript;
pub mod python;
pub mod rust;

/// What the extractor needs to know about the file being parsed
#[derive(Debug, Clone)]
pub struct FileContext<'a> {
    /// Path relative to the project root, `/`-separated
    pub rel_path: &'a str,
    pub module_uid: &'a str,
    /// The file is a package-init file (`__init__.py`, `index.ts`, `mod.rs`)
    pub is_package: bool,
    pub lang: Lang,
    pub source_roots: &'a [String],
}

/// AST-derived counts the metrics builder turns into [`crate::schema::Metrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricInput {
    pub loc: u32,
    pub decisions: u32,
    pub tokens: u32,
    pub distinct_tokens: u32,
}

/// A class, function or method as found in the tree, before uid assignment
#[derive(Debug, Clone)]
pub struct RawEntity {
    pub kind: EntityKind,
    pub name: String,
    /// Index of the enclosing entity in the same file
    pub parent: Option<usize>,
    /// Name components between the parent (or module) and this entity,
    /// e.g. `["<local>"]` for a nested function or `["inner"]` for a Rust `mod inner`
    pub path: Vec<String>,
    pub lines: LineSpan,
    pub signature: String,
    pub parameters: Vec<String>,
    pub docstring: Option<String>,
    pub decorators: Vec<String>,
    /// Keyword modifiers and declaration flavours (`async`, `static`, `trait`, ...)
    pub modifiers: BTreeSet<String>,
    pub exported: bool,
    /// Type named by the enclosing Rust `impl`, if any
    pub impl_target: Option<String>,
    pub metric_input: MetricInput,
    /// Source text of the whole definition
    pub snippet: String,
}

/// A call expression and the entity it occurs in (`None` = module top level)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCall {
    pub caller: Option<usize>,
    pub callee: String,
}

/// One imported target with the local names it binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImport {
    /// Dotted target, already resolved against the importing module when relative
    pub target: String,
    pub relative: bool,
    /// (local name, dotted target it stands for)
    pub bindings: Vec<(String, String)>,
}

impl RawImport {
    pub fn new(target: impl Into<String>, relative: bool) -> Self {
        Self {
            target: target.into(),
            relative,
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, local: impl Into<String>, target: impl Into<String>) -> Self {
        self.bindings.push((local.into(), target.into()));
        self
    }
}

/// Everything the Parser Adapter extracts from one file
#[derive(Debug, Clone)]
pub struct RawFile {
    pub lang: Lang,
    pub module_docstring: Option<String>,
    pub entities: Vec<RawEntity>,
    pub calls: Vec<RawCall>,
    pub imports: Vec<RawImport>,
    pub module_metrics: MetricInput,
}
