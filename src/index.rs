//! StructIndex: in-memory lookup over a committed `index.json`
//!
//! Loading reads the index file only (plus a stat of every shard path).
//! Routine queries never open a shard; [`StructIndex::load_shard`] and
//! [`StructIndex::entity_detail`] are the explicit ways to get full detail.
//! A committed structure directory is immutable, so any number of readers
//! may load it concurrently without locking.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cache::StructDir;
use crate::error::{Result, StructError};
use crate::schema::{Entity, IndexEntry, IndexFile, IndexStats, ModuleShard, PackageNode, ParseError, SCHEMA_VERSION};

/// How a tag list combines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    /// Every tag must be present
    #[default]
    And,
    /// Any tag suffices
    Or,
}

/// Loaded index with O(1) lookup maps
#[derive(Debug)]
pub struct StructIndex {
    dir: StructDir,
    modules: AHashMap<String, IndexEntry>,
    tags: AHashMap<String, BTreeSet<String>>,
    entity_modules: AHashMap<String, String>,
    packages: PackageNode,
    stats: IndexStats,
    parse_errors: Vec<ParseError>,
}

impl StructIndex {
    /// Load `index.json` from a structure directory.
    ///
    /// Every shard the index names must exist and be non-empty. Shard
    /// contents are parsed lazily by [`StructIndex::load_shard`], which
    /// reports a malformed shard as [`StructError::CorruptIndex`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = StructDir::new(dir.as_ref());
        let path = dir.index_path();
        if !path.is_file() {
            return Err(StructError::IndexNotFound { path });
        }
        let bytes = fs::read(&path).map_err(|e| StructError::io(&path, e))?;
        let index: IndexFile = serde_json::from_slice(&bytes).map_err(|e| StructError::CorruptIndex {
            reason: format!("{} is malformed: {}", path.display(), e),
        })?;
        Self::from_index(dir, index)
    }

    /// Build the lookup maps, checking the schema version and that every
    /// referenced shard exists and is non-empty
    pub fn from_index(dir: StructDir, index: IndexFile) -> Result<Self> {
        if index.schema_version != SCHEMA_VERSION {
            return Err(StructError::CorruptIndex {
                reason: format!(
                    "index schema version {} does not match {}",
                    index.schema_version, SCHEMA_VERSION
                ),
            });
        }

        let mut tags: AHashMap<String, BTreeSet<String>> = AHashMap::new();
        let mut entity_modules = AHashMap::new();
        for entry in index.modules.values() {
            let shard = dir.resolve(&entry.shard_path);
            match fs::metadata(&shard) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {}
                Ok(meta) if meta.is_file() => {
                    return Err(StructError::CorruptIndex {
                        reason: format!("shard {} for {} is empty", shard.display(), entry.uid),
                    });
                }
                _ => {
                    return Err(StructError::CorruptIndex {
                        reason: format!("shard {} for {} is missing", shard.display(), entry.uid),
                    });
                }
            }
            for tag in &entry.tags {
                tags.entry(tag.clone()).or_default().insert(entry.uid.clone());
            }
            for entity in &entry.entities {
                entity_modules.insert(entity.clone(), entry.uid.clone());
            }
        }

        tracing::debug!("Loaded index with {} modules", index.modules.len());
        Ok(Self {
            dir,
            modules: index.modules.into_iter().collect(),
            tags,
            entity_modules,
            packages: index.packages,
            stats: index.stats,
            parse_errors: index.parse_errors,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.root()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn packages(&self) -> &PackageNode {
        &self.packages
    }

    pub fn parse_errors(&self) -> &[ParseError] {
        &self.parse_errors
    }

    /// Module uids in sorted order
    pub fn module_uids(&self) -> Vec<&str> {
        let mut uids: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        uids.sort_unstable();
        uids
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub fn find_by_uid(&self, uid: &str) -> Option<&IndexEntry> {
        self.modules.get(uid)
    }

    /// Module owning `uid` (the uid itself for modules)
    pub fn module_of(&self, uid: &str) -> Option<&str> {
        if let Some(entry) = self.modules.get(uid) {
            return Some(entry.uid.as_str());
        }
        self.entity_modules.get(uid).map(String::as_str)
    }

    pub fn is_entity(&self, uid: &str) -> bool {
        self.entity_modules.contains_key(uid)
    }

    /// Modules carrying the given tags, sorted by uid. An empty tag list
    /// matches nothing.
    pub fn find_by_tags(&self, tags: &[String], mode: TagMode) -> Vec<&IndexEntry> {
        if tags.is_empty() {
            return Vec::new();
        }
        let sets: Vec<Option<&BTreeSet<String>>> = tags.iter().map(|t| self.tags.get(t)).collect();
        let uids: BTreeSet<&String> = match mode {
            TagMode::Or => sets.iter().flatten().flat_map(|s| s.iter()).collect(),
            TagMode::And => {
                if sets.iter().any(Option::is_none) {
                    return Vec::new();
                }
                let mut iter = sets.iter().flatten();
                let first: BTreeSet<&String> = iter.next().map(|s| s.iter().collect()).unwrap_or_default();
                iter.fold(first, |acc, set| acc.into_iter().filter(|u| set.contains(*u)).collect())
            }
        };
        uids.into_iter().filter_map(|u| self.modules.get(u)).collect()
    }

    /// Transitive module dependencies of `uid`, nearest first
    pub fn transitive_dependencies(&self, uid: &str, max_depth: usize) -> Vec<String> {
        self.walk(uid, max_depth, |e| &e.dependencies)
            .into_iter()
            .map(|(u, _)| u)
            .collect()
    }

    /// Transitive dependents of `uid`, nearest first
    pub fn transitive_dependents(&self, uid: &str, max_depth: usize) -> Vec<String> {
        self.walk(uid, max_depth, |e| &e.dependents)
            .into_iter()
            .map(|(u, _)| u)
            .collect()
    }

    /// Dependencies with their hop distance
    pub fn dependencies_by_depth(&self, uid: &str, max_depth: usize) -> Vec<(String, usize)> {
        self.walk(uid, max_depth, |e| &e.dependencies)
    }

    /// Dependents with their hop distance
    pub fn dependents_by_depth(&self, uid: &str, max_depth: usize) -> Vec<(String, usize)> {
        self.walk(uid, max_depth, |e| &e.dependents)
    }

    /// Breadth-first walk ordered by (depth, uid). The start module is
    /// excluded; a visited set makes cycles harmless.
    fn walk<F>(&self, uid: &str, max_depth: usize, edges: F) -> Vec<(String, usize)>
    where
        F: Fn(&IndexEntry) -> &Vec<String>,
    {
        let Some(start) = self.module_of(uid) else {
            return Vec::new();
        };
        let mut visited: AHashSet<&str> = AHashSet::new();
        visited.insert(start);
        let mut frontier: VecDeque<&str> = VecDeque::from([start]);
        let mut out = Vec::new();

        for depth in 1..=max_depth {
            let mut next: BTreeSet<&str> = BTreeSet::new();
            while let Some(current) = frontier.pop_front() {
                let Some(entry) = self.modules.get(current) else {
                    continue;
                };
                for target in edges(entry) {
                    if !visited.contains(target.as_str()) && self.modules.contains_key(target) {
                        next.insert(target.as_str());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            for uid in &next {
                visited.insert(*uid);
                out.push((uid.to_string(), depth));
            }
            frontier.extend(next);
        }
        out
    }

    // ------------------------------------------------------------------------
    // Text search
    // ------------------------------------------------------------------------

    /// Modules matching any query term, best first
    pub fn search_text(&self, query: &str) -> Vec<&IndexEntry> {
        self.search_scored(query).into_iter().map(|(e, _)| e).collect()
    }

    /// Modules with their match score, sorted by score desc then uid
    pub fn search_scored(&self, query: &str) -> Vec<(&IndexEntry, u32)> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(&IndexEntry, u32)> = self
            .modules
            .values()
            .filter_map(|entry| {
                let score = relevance(&terms, &entry.uid, &entry.summary.text, entry.tags.iter(), &entry.file_path);
                (score > 0).then_some((entry, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.uid.cmp(&b.0.uid)));
        scored
    }

    // ------------------------------------------------------------------------
    // Shard access
    // ------------------------------------------------------------------------

    pub fn shard_path(&self, module_uid: &str) -> Option<PathBuf> {
        self.modules.get(module_uid).map(|e| self.dir.resolve(&e.shard_path))
    }

    /// Read a module's shard. A shard that is unreadable, malformed or
    /// names another module is a corrupt structure.
    pub fn load_shard(&self, module_uid: &str) -> Result<ModuleShard> {
        let path = self.shard_path(module_uid).ok_or_else(|| StructError::InvalidArgument {
            message: format!("unknown module uid '{}'", module_uid),
        })?;
        let bytes = fs::read(&path).map_err(|e| StructError::CorruptIndex {
            reason: format!("shard {} is unreadable: {}", path.display(), e),
        })?;
        let shard: ModuleShard = serde_json::from_slice(&bytes).map_err(|e| StructError::CorruptIndex {
            reason: format!("shard {} is malformed: {}", path.display(), e),
        })?;
        if shard.uid != module_uid {
            return Err(StructError::CorruptIndex {
                reason: format!("shard {} holds {} instead of {}", path.display(), shard.uid, module_uid),
            });
        }
        Ok(shard)
    }

    /// Full detail of one entity, read from its module's shard
    pub fn entity_detail(&self, uid: &str) -> Result<Option<Entity>> {
        let Some(module) = self.entity_modules.get(uid) else {
            return Ok(None);
        };
        let shard = self.load_shard(module)?;
        Ok(shard.entities.into_iter().find(|e| e.uid == uid))
    }
}

/// Lower-cased query terms
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Term hits weighted by where they land: uid 3, summary 2, tag 2, path 1
pub fn relevance<'a>(
    terms: &[String],
    uid: &str,
    summary: &str,
    tags: impl Iterator<Item = &'a String> + Clone,
    file_path: &str,
) -> u32 {
    let uid = uid.to_lowercase();
    let summary = summary.to_lowercase();
    let file_path = file_path.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let mut score = 0;
            if uid.contains(term.as_str()) {
                score += 3;
            }
            if summary.contains(term.as_str()) {
                score += 2;
            }
            if tags.clone().any(|t| t.to_lowercase().contains(term.as_str())) {
                score += 2;
            }
            if file_path.contains(term.as_str()) {
                score += 1;
            }
            score
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::{rebuild, RebuildOptions};
    use crate::config::StructConfig;
    use tempfile::TempDir;

    fn build(files: &[(&str, &str)]) -> (TempDir, StructIndex) {
        let temp = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = temp.path().join("repo").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let options = RebuildOptions {
            root: temp.path().join("repo"),
            out: temp.path().join("struct"),
            incremental: false,
            config: StructConfig::default(),
            generator: None,
        };
        rebuild(&options, None).unwrap();
        let index = StructIndex::load(temp.path().join("struct")).unwrap();
        (temp, index)
    }

    fn chain() -> (TempDir, StructIndex) {
        build(&[
            ("src/a.py", "\"\"\"Entry point.\"\"\"\nfrom b import run_b\n\ndef run_a():\n    run_b()\n"),
            ("src/b.py", "\"\"\"Billing rules.\"\"\"\nfrom c import run_c\n\ndef run_b():\n    run_c()\n"),
            ("src/c.py", "\"\"\"Currency helpers.\"\"\"\nfrom a import run_a\n\ndef run_c():\n    run_a()\n"),
            ("tests/test_b.py", "from b import run_b\n\ndef test_run_b():\n    run_b()\n"),
        ])
    }

    #[test]
    fn test_find_by_uid_and_module_of() {
        let (_temp, index) = chain();
        assert_eq!(index.find_by_uid("b").unwrap().file_path, "src/b.py");
        assert_eq!(index.module_of("b.run_b"), Some("b"));
        assert!(index.find_by_uid("b.run_b").is_none());
        assert!(index.find_by_uid("missing").is_none());
    }

    #[test]
    fn test_transitive_walks_are_cycle_safe() {
        let (_temp, index) = chain();
        assert_eq!(index.transitive_dependencies("a", 10), vec!["b", "c"]);
        assert_eq!(index.transitive_dependencies("a", 1), vec!["b"]);
        assert!(index.transitive_dependencies("a", 0).is_empty());
        assert_eq!(index.dependents_by_depth("b", 5), vec![("a".to_string(), 1), ("tests.test_b".to_string(), 1), ("c".to_string(), 2)]);
    }

    #[test]
    fn test_find_by_tags() {
        let (_temp, index) = chain();
        let test = vec!["test".to_string()];
        let uids: Vec<_> = index.find_by_tags(&test, TagMode::And).iter().map(|e| e.uid.clone()).collect();
        assert_eq!(uids, vec!["tests.test_b"]);

        let both = vec!["test".to_string(), "lang:python".to_string()];
        assert_eq!(index.find_by_tags(&both, TagMode::And).len(), 1);
        assert_eq!(index.find_by_tags(&both, TagMode::Or).len(), 4);
        assert!(index.find_by_tags(&[], TagMode::Or).is_empty());
        assert!(index.find_by_tags(&["nope".to_string()], TagMode::And).is_empty());
    }

    #[test]
    fn test_search_text_ranks_matches() {
        let (_temp, index) = chain();
        let hits: Vec<_> = index.search_text("billing").iter().map(|e| e.uid.clone()).collect();
        assert_eq!(hits, vec!["b"]);
        assert!(index.search_text("   ").is_empty());
    }

    #[test]
    fn test_entity_detail_reads_shard() {
        let (_temp, index) = chain();
        let entity = index.entity_detail("b.run_b").unwrap().unwrap();
        assert_eq!(entity.tested_by, vec!["tests.test_b.test_run_b"]);
        assert!(index.entity_detail("b.nothing").unwrap().is_none());
    }

    #[test]
    fn test_missing_shard_is_corrupt() {
        let (temp, index) = chain();
        let shard = index.shard_path("c").unwrap();
        drop(index);
        fs::remove_file(shard).unwrap();
        let err = StructIndex::load(temp.path().join("struct")).unwrap_err();
        assert!(matches!(err, StructError::CorruptIndex { .. }));
    }

    #[test]
    fn test_truncated_shard_is_corrupt() {
        let (temp, index) = chain();
        let shard = index.shard_path("b").unwrap();
        drop(index);
        fs::write(&shard, b"").unwrap();
        let err = StructIndex::load(temp.path().join("struct")).unwrap_err();
        assert!(err.to_string().contains("empty"), "{}", err);
        assert!(matches!(err, StructError::CorruptIndex { .. }));
    }

    #[test]
    fn test_malformed_shard_is_corrupt_when_read() {
        let (temp, index) = chain();
        let shard = index.shard_path("b").unwrap();
        drop(index);
        fs::write(&shard, b"{\"uid\": ").unwrap();
        let index = StructIndex::load(temp.path().join("struct")).unwrap();
        assert!(matches!(index.load_shard("b"), Err(StructError::CorruptIndex { .. })));
        assert!(matches!(index.entity_detail("b.run_b"), Err(StructError::CorruptIndex { .. })));
    }

    #[test]
    fn test_missing_index_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = StructIndex::load(temp.path()).unwrap_err();
        assert!(matches!(err, StructError::IndexNotFound { .. }));
    }
}
