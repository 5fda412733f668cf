//! Structural model persisted in the structure directory
//!
//! Everything here is serialized with sorted collections and no timestamps
//! (except [`Metadata`]) so that regenerating unchanged source reproduces
//! `index.json` and every shard byte for byte.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lang::Lang;

/// Current schema version for output stability
/// 1.0 - Initial shard/index layout
/// 1.1 - Link status on dependencies and call edges
pub const SCHEMA_VERSION: &str = "1.1";

/// Version of the tool that produced an index
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// FNV-1a constants for 64-bit hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Compute a stable FNV-1a hash (deterministic across runs and platforms)
pub fn fnv1a_hash(data: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// ============================================================================
// Shared value types
// ============================================================================

/// Kind of a structural entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
        }
    }

    /// Functions and methods carry executable bodies
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

/// Which tier of the summary chain produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Docstring,
    Generator,
    Heuristic,
}

impl SummarySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docstring => "docstring",
            Self::Generator => "generator",
            Self::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Summary text with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
    pub confidence: Confidence,
}

/// Per-entity metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metrics {
    /// Non-blank, non-comment lines
    pub loc: u32,
    /// Cyclomatic complexity
    pub complexity: u32,
    /// Declared parameters, excluding the receiver
    pub parameters: u32,
    /// Maintainability index normalized to 0-100
    pub maintainability: f64,
}

/// Aggregate metrics for a module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleMetrics {
    pub loc: u32,
    pub complexity: u32,
    pub maintainability: f64,
    pub classes: u32,
    pub functions: u32,
    pub methods: u32,
}

/// Line span, 1-indexed and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

/// Resolution state of a dependency or call edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Target exists in the current index
    Resolved,
    /// Target is internal to the project but does not exist (anymore)
    Unresolved,
    /// Target lives outside the project (stdlib, third-party)
    External,
}

// ============================================================================
// Shard contents
// ============================================================================

/// Module-level import edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dependency {
    /// Imported module path, normalized to dotted form
    pub target: String,
    /// Module uid the target maps to (resolved, or last known when unresolved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub status: LinkStatus,
    /// Written with relative syntax, so always internal
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub relative: bool,
}

/// Call made from an entity (or module top level) to some callee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CallEdge {
    pub caller_uid: String,
    /// Callee expression as written, e.g. `self.save` or `os.path.join`
    pub callee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_uid: Option<String>,
    pub status: LinkStatus,
}

/// Class, function or method with full detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    pub uid: String,
    pub legacy_id: String,
    pub uid_components: Vec<String>,
    pub name: String,
    pub kind: EntityKind,
    pub signature: String,
    pub lines: LineSpan,
    pub summary: Summary,
    pub metrics: Metrics,
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tested_by: Vec<String>,
}

/// One shard: everything known about a single source module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleShard {
    pub schema_version: String,
    pub uid: String,
    pub legacy_id: String,
    pub file_path: String,
    pub language: Lang,
    pub content_hash: String,
    pub tags: BTreeSet<String>,
    pub summary: Summary,
    pub metrics: ModuleMetrics,
    /// Local name bound by an import -> dotted target
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    pub dependencies: Vec<Dependency>,
    /// Top-level entity uids
    pub children: Vec<String>,
    pub entities: Vec<Entity>,
    pub calls: Vec<CallEdge>,
}

impl ModuleShard {
    pub fn entity(&self, uid: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.uid == uid)
    }

    /// Uids of every link in this shard that is internal but dangling
    pub fn unresolved_targets(&self) -> BTreeSet<String> {
        let deps = self
            .dependencies
            .iter()
            .filter(|d| d.status == LinkStatus::Unresolved)
            .filter_map(|d| d.uid.clone());
        let calls = self
            .calls
            .iter()
            .filter(|c| c.status == LinkStatus::Unresolved)
            .filter_map(|c| c.callee_uid.clone());
        deps.chain(calls).collect()
    }
}

// ============================================================================
// Index contents
// ============================================================================

/// Compact per-module entry of `index.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexEntry {
    pub uid: String,
    pub legacy_id: String,
    pub file_path: String,
    pub language: Lang,
    /// Relative to the structure directory
    pub shard_path: String,
    pub content_hash: String,
    pub tags: BTreeSet<String>,
    pub summary: Summary,
    pub metrics: ModuleMetrics,
    /// Resolved module dependencies
    pub dependencies: Vec<String>,
    /// Internal targets (modules or entities) that no longer resolve
    #[serde(default)]
    pub unresolved: Vec<String>,
    /// Modules that depend on this one (reverse of `dependencies`)
    #[serde(default)]
    pub dependents: Vec<String>,
    pub entities: Vec<String>,
}

/// Node of the nested package tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PackageNode {
    /// Dotted path of this package (empty for the root)
    pub path: String,
    /// Modules whose uid sits directly in this package
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub packages: BTreeMap<String, PackageNode>,
}

/// A source file that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ParseError {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IndexStats {
    pub modules: usize,
    pub entities: usize,
    pub classes: usize,
    pub functions: usize,
    pub methods: usize,
    pub dependencies: usize,
    pub unresolved: usize,
    pub parse_errors: usize,
}

/// The top-level `index.json` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexFile {
    pub schema_version: String,
    pub tool_version: String,
    pub modules: BTreeMap<String, IndexEntry>,
    pub packages: PackageNode,
    pub stats: IndexStats,
    #[serde(default)]
    pub parse_errors: Vec<ParseError>,
}

/// `metadata.json`: the only document carrying wall-clock data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    pub generated_at: String,
    pub tool_version: String,
    pub schema_version: String,
    pub root: String,
    pub incremental: bool,
    pub duration_ms: u64,
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_reused: usize,
    pub files_failed: usize,
    pub modules: usize,
    pub entities: usize,
    pub shards_written: usize,
    pub shards_removed: usize,
}

/// JSON Schema document written as `schema.json`
pub fn schema_document() -> serde_json::Value {
    let to_value = |schema: schemars::Schema| {
        serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null)
    };
    serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "index": to_value(schemars::schema_for!(IndexFile)),
        "shard": to_value(schemars::schema_for!(ModuleShard)),
        "metadata": to_value(schemars::schema_for!(Metadata)),
    })
}
