//! Schema Validator
//!
//! A pipeline of independent, read-only checks over a structure directory.
//! Each check yields findings tagged `error` or `warning`; levels enable
//! growing subsets of checks and demand growing minimum scores:
//!
//! | Level        | Checks enabled                         | Min score |
//! |--------------|----------------------------------------|-----------|
//! | `basic`      | structural                             | 60        |
//! | `standard`   | + referential                          | 75        |
//! | `strict`     | + convention                           | 85        |
//! | `enterprise` | + documentation                        | 95        |

pub mod convention;
pub mod referential;
pub mod scoring;
pub mod structural;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::StructDir;
use crate::config::ValidationConfig;
use crate::schema::{IndexFile, ModuleShard};

pub use scoring::{evaluate_level, score, LevelResult};

// ============================================================================
// Levels, checks, findings
// ============================================================================

/// Named bundle of checks plus a minimum passing score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Basic,
    #[default]
    Standard,
    Strict,
    Enterprise,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Strict => "strict",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn min_score(&self) -> f64 {
        match self {
            Self::Basic => 60.0,
            Self::Standard => 75.0,
            Self::Strict => 85.0,
            Self::Enterprise => 95.0,
        }
    }

    pub fn all() -> [Level; 4] {
        [Self::Basic, Self::Standard, Self::Strict, Self::Enterprise]
    }

    pub fn enables(&self, check: Check) -> bool {
        *self >= check.introduced_at()
    }
}

/// Check families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Structural,
    Referential,
    Convention,
    Documentation,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Referential => "referential",
            Self::Convention => "convention",
            Self::Documentation => "documentation",
        }
    }

    /// Lowest level that runs this check
    pub fn introduced_at(&self) -> Level {
        match self {
            Self::Structural => Level::Basic,
            Self::Referential => Level::Standard,
            Self::Convention => Level::Strict,
            Self::Documentation => Level::Enterprise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Where a finding points: a file under the structure directory, a JSON
/// pointer inside it and the uid concerned
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl Location {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub check: Check,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Finding {
    pub fn error(check: Check, location: Location, message: impl Into<String>) -> Self {
        Self {
            check,
            severity: Severity::Error,
            location,
            message: message.into(),
        }
    }

    pub fn warning(check: Check, location: Location, message: impl Into<String>) -> Self {
        Self {
            check,
            severity: Severity::Warning,
            location,
            message: message.into(),
        }
    }
}

/// Structured validation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub struct_dir: String,
    pub requested: Level,
    pub passed: bool,
    pub score: f64,
    /// Modules plus entities, the normalization base of the score
    pub population: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Findings of the checks the requested level enables
    pub findings: Vec<Finding>,
    /// Score and verdict for every level
    pub levels: Vec<LevelResult>,
}

impl ValidationReport {
    pub fn level(&self, level: Level) -> Option<&LevelResult> {
        self.levels.iter().find(|l| l.level == level)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// One shard as found on disk
#[derive(Debug, Clone)]
pub struct ShardDoc {
    /// Path relative to the structure directory
    pub rel_path: String,
    pub raw: Value,
    /// `None` when the document does not deserialize
    pub parsed: Option<ModuleShard>,
}

/// Everything the checks look at, read once up front
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub index_raw: Option<Value>,
    pub index: Option<IndexFile>,
    /// Keyed by the index key the shard was reached from
    pub shards: BTreeMap<String, ShardDoc>,
    /// Shard files present under `modules/`
    pub shard_files: Vec<String>,
    pub schema: Option<Value>,
    pub metadata_raw: Option<Value>,
    /// Problems met while reading
    pub load_findings: Vec<Finding>,
}

impl Snapshot {
    pub fn load(dir: &StructDir) -> Self {
        let mut snapshot = Snapshot::default();

        snapshot.index_raw = read_json(dir.index_path().as_path(), StructDir::INDEX, &mut snapshot.load_findings);
        if let Some(raw) = &snapshot.index_raw {
            snapshot.index = serde_json::from_value(raw.clone()).ok();
        }

        if dir.schema_path().exists() {
            snapshot.schema = read_json(dir.schema_path().as_path(), StructDir::SCHEMA, &mut snapshot.load_findings);
        }
        if dir.metadata_path().exists() {
            snapshot.metadata_raw =
                read_json(dir.metadata_path().as_path(), StructDir::METADATA, &mut snapshot.load_findings);
        } else {
            snapshot.load_findings.push(Finding::warning(
                Check::Structural,
                Location::file(StructDir::METADATA),
                "metadata.json is missing",
            ));
        }

        snapshot.shard_files = dir
            .list_shard_files()
            .map(|names| names.into_iter().map(|n| StructDir::relative_shard_path(&n)).collect())
            .unwrap_or_default();

        for (key, shard_path) in index_shard_paths(snapshot.index_raw.as_ref()) {
            let path = dir.resolve(&shard_path);
            if !path.is_file() {
                snapshot.load_findings.push(Finding::error(
                    Check::Referential,
                    Location::file(StructDir::INDEX)
                        .at(format!("/modules/{}/shard_path", escape_pointer(&key)))
                        .uid(key.clone()),
                    format!("shard file {} does not exist", shard_path),
                ));
                continue;
            }
            if let Some(raw) = read_json(&path, &shard_path, &mut snapshot.load_findings) {
                let parsed = serde_json::from_value(raw.clone()).ok();
                snapshot.shards.insert(
                    key,
                    ShardDoc {
                        rel_path: shard_path,
                        raw,
                        parsed,
                    },
                );
            }
        }
        snapshot
    }

    /// Modules plus entities that exist on disk. An index entry counts only
    /// when its shard was read, and only for entities that shard defines.
    pub fn population(&self) -> usize {
        self.shards
            .iter()
            .map(|(key, doc)| {
                let listed = listed_entities(self.index_raw.as_ref(), key);
                let defined = doc
                    .raw
                    .get("entities")
                    .and_then(Value::as_array)
                    .map(|entities| {
                        entities
                            .iter()
                            .filter_map(|e| e.get("uid").and_then(Value::as_str))
                            .collect::<BTreeSet<&str>>()
                    })
                    .unwrap_or_default();
                1 + defined.intersection(&listed).count()
            })
            .sum()
    }
}

/// Entity uids the raw index lists for `key`
fn listed_entities<'a>(index: Option<&'a Value>, key: &str) -> BTreeSet<&'a str> {
    index
        .and_then(|index| index.get("modules"))
        .and_then(|modules| modules.get(key))
        .and_then(|entry| entry.get("entities"))
        .and_then(Value::as_array)
        .map(|uids| uids.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// `(index key, shard_path)` pairs from a raw index document
fn index_shard_paths(index: Option<&Value>) -> Vec<(String, String)> {
    index
        .and_then(|v| v.get("modules"))
        .and_then(Value::as_object)
        .map(|modules| {
            modules
                .iter()
                .filter_map(|(key, entry)| {
                    entry
                        .get("shard_path")
                        .and_then(Value::as_str)
                        .map(|p| (key.clone(), p.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn read_json(path: &Path, rel: &str, findings: &mut Vec<Finding>) -> Option<Value> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            findings.push(Finding::error(
                Check::Structural,
                Location::file(rel),
                format!("cannot read {}: {}", rel, e),
            ));
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            findings.push(Finding::error(
                Check::Structural,
                Location::file(rel),
                format!("{} is not valid JSON: {}", rel, e),
            ));
            None
        }
    }
}

/// Escape a key for use inside a JSON pointer
pub fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

// ============================================================================
// Validator
// ============================================================================

/// Runs every check over a structure directory and scores the result
pub struct Validator {
    dir: StructDir,
    config: ValidationConfig,
}

impl Validator {
    pub fn new(dir: impl AsRef<Path>, config: ValidationConfig) -> Self {
        Self {
            dir: StructDir::new(dir.as_ref()),
            config,
        }
    }

    /// Validate and report for `requested`. Never writes to the directory.
    pub fn run(&self, requested: Level) -> ValidationReport {
        let snapshot = Snapshot::load(&self.dir);
        let mut findings = snapshot.load_findings.clone();
        findings.extend(structural::check(&snapshot));
        findings.extend(referential::check(&snapshot));
        findings.extend(convention::check(&snapshot, &self.config));
        findings.extend(convention::check_documentation(&snapshot));

        let population = snapshot.population();
        let levels: Vec<LevelResult> = Level::all()
            .iter()
            .map(|level| evaluate_level(*level, &findings, population))
            .collect();

        let mut visible: Vec<Finding> = findings
            .into_iter()
            .filter(|f| requested.enables(f.check))
            .collect();
        visible.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.location.cmp(&b.location))
                .then_with(|| a.message.cmp(&b.message))
        });

        let verdict = levels
            .iter()
            .find(|l| l.level == requested)
            .cloned()
            .unwrap_or_else(|| evaluate_level(requested, &visible, population));
        tracing::info!(
            "Validation at {}: score {:.1}, {} errors, {} warnings",
            requested.as_str(),
            verdict.score,
            verdict.errors,
            verdict.warnings
        );

        ValidationReport {
            struct_dir: self.dir.root().display().to_string(),
            requested,
            passed: verdict.passed,
            score: verdict.score,
            population,
            errors: verdict.errors,
            warnings: verdict.warnings,
            findings: visible,
            levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_enable_supersets() {
        assert!(Level::Basic.enables(Check::Structural));
        assert!(!Level::Basic.enables(Check::Referential));
        assert!(Level::Standard.enables(Check::Referential));
        assert!(!Level::Standard.enables(Check::Convention));
        assert!(Level::Strict.enables(Check::Convention));
        assert!(Level::Enterprise.enables(Check::Documentation));
        let mins: Vec<f64> = Level::all().iter().map(Level::min_score).collect();
        assert_eq!(mins, vec![60.0, 75.0, 85.0, 95.0]);
    }

    #[test]
    fn test_missing_directory_fails_every_level() {
        let temp = tempfile::TempDir::new().unwrap();
        let report = Validator::new(temp.path(), ValidationConfig::default()).run(Level::Basic);
        assert!(!report.passed);
        assert!(report.findings.iter().any(|f| f.location.file == "index.json"));
        assert!(report.levels.iter().all(|l| !l.passed));
    }

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(escape_pointer("a/b~c"), "a~1b~0c");
    }
}
