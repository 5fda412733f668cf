//! Sharded structure writer
//!
//! Turns the resolved module set into the on-disk layout:
//! - `modules/<uid>.<hash>.json` - one shard per module with full entity detail
//! - `index.json` - compact per-module entries, package tree and stats
//!
//! Shard file names carry a prefix of the content hash of their bytes, so a
//! new shard never overwrites a file the committed index still points at.
//! Shards are staged first, then the index is swapped in. Files the new index
//! no longer references are removed only after that swap.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{content_hash, StructDir};
use crate::error::Result;
use crate::fs_utils::{to_json_bytes, write_json_atomic};
use crate::schema::{
    EntityKind, IndexEntry, IndexFile, IndexStats, LinkStatus, ModuleShard, PackageNode, ParseError,
    SCHEMA_VERSION, TOOL_VERSION,
};
use crate::uid::{shard_stem, ROOT_MODULE_UID};

/// Hex digits of the content hash kept in a shard file name
const SHARD_HASH_LEN: usize = 12;

/// File name of a shard with the given serialized bytes
pub fn shard_file_name(module_uid: &str, bytes: &[u8]) -> String {
    format!("{}.{}.json", shard_stem(module_uid), &content_hash(bytes)[..SHARD_HASH_LEN])
}

// ============================================================================
// Index construction
// ============================================================================

/// Build the index document for a resolved module set. `shard_paths` maps
/// module uid to the staged shard path.
pub fn build_index(
    shards: &BTreeMap<String, ModuleShard>,
    shard_paths: &BTreeMap<String, String>,
    mut parse_errors: Vec<ParseError>,
) -> IndexFile {
    let entity_modules: BTreeMap<&str, &str> = shards
        .values()
        .flat_map(|s| s.entities.iter().map(move |e| (e.uid.as_str(), s.uid.as_str())))
        .collect();

    let mut modules: BTreeMap<String, IndexEntry> = BTreeMap::new();
    for shard in shards.values() {
        let mut dependencies: BTreeSet<String> = shard
            .dependencies
            .iter()
            .filter(|d| d.status == LinkStatus::Resolved)
            .filter_map(|d| d.uid.clone())
            .collect();
        for call in &shard.calls {
            if call.status != LinkStatus::Resolved {
                continue;
            }
            if let Some(callee) = &call.callee_uid {
                let module = entity_modules.get(callee.as_str()).copied().unwrap_or(callee.as_str());
                if shards.contains_key(module) {
                    dependencies.insert(module.to_string());
                }
            }
        }
        dependencies.remove(&shard.uid);

        modules.insert(
            shard.uid.clone(),
            IndexEntry {
                uid: shard.uid.clone(),
                legacy_id: shard.legacy_id.clone(),
                file_path: shard.file_path.clone(),
                language: shard.language,
                shard_path: shard_paths.get(&shard.uid).cloned().unwrap_or_default(),
                content_hash: shard.content_hash.clone(),
                tags: shard.tags.clone(),
                summary: shard.summary.clone(),
                metrics: shard.metrics,
                dependencies: dependencies.into_iter().collect(),
                unresolved: shard.unresolved_targets().into_iter().collect(),
                dependents: Vec::new(),
                entities: shard.entities.iter().map(|e| e.uid.clone()).collect(),
            },
        );
    }

    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for entry in modules.values() {
        for dep in &entry.dependencies {
            dependents.entry(dep.clone()).or_default().insert(entry.uid.clone());
        }
    }
    for (uid, users) in dependents {
        if let Some(entry) = modules.get_mut(&uid) {
            entry.dependents = users.into_iter().collect();
        }
    }

    parse_errors.sort();
    parse_errors.dedup();
    let stats = compute_stats(shards, &modules, parse_errors.len());

    IndexFile {
        schema_version: SCHEMA_VERSION.to_string(),
        tool_version: TOOL_VERSION.to_string(),
        packages: package_tree(modules.keys()),
        modules,
        stats,
        parse_errors,
    }
}

fn compute_stats(
    shards: &BTreeMap<String, ModuleShard>,
    modules: &BTreeMap<String, IndexEntry>,
    parse_errors: usize,
) -> IndexStats {
    let mut stats = IndexStats {
        modules: modules.len(),
        parse_errors,
        ..Default::default()
    };
    for shard in shards.values() {
        for entity in &shard.entities {
            stats.entities += 1;
            match entity.kind {
                EntityKind::Class => stats.classes += 1,
                EntityKind::Function => stats.functions += 1,
                EntityKind::Method => stats.methods += 1,
                EntityKind::Module => {}
            }
        }
    }
    for entry in modules.values() {
        stats.dependencies += entry.dependencies.len();
        stats.unresolved += entry.unresolved.len();
    }
    stats
}

/// Nest module uids into a package tree keyed by dotted path
pub fn package_tree<'a>(uids: impl IntoIterator<Item = &'a String>) -> PackageNode {
    let mut root = PackageNode::default();
    for uid in uids {
        if uid == ROOT_MODULE_UID {
            root.modules.push(uid.clone());
            continue;
        }
        let parts: Vec<&str> = uid.split('.').collect();
        let mut node = &mut root;
        for depth in 0..parts.len() - 1 {
            let path = parts[..=depth].join(".");
            node = node
                .packages
                .entry(parts[depth].to_string())
                .or_insert_with(|| PackageNode {
                    path,
                    ..Default::default()
                });
        }
        node.modules.push(uid.clone());
    }
    root
}

// ============================================================================
// Commit
// ============================================================================

/// Statistics about one commit
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    /// Shards whose bytes changed (or were new)
    pub shards_written: usize,
    /// Shards left untouched because their bytes were identical
    pub shards_unchanged: usize,
    /// Orphan shard files removed after the index commit
    pub shards_removed: usize,
    pub index_bytes: usize,
}

/// Shards written under their content-addressed names, not yet referenced
/// by a committed index
#[derive(Debug, Default)]
pub struct StagedShards {
    /// Module uid -> shard path relative to the structure directory
    pub paths: BTreeMap<String, String>,
    created: Vec<PathBuf>,
    unchanged: usize,
}

impl StagedShards {
    /// Remove the files this stage created
    fn discard(&self) {
        for path in &self.created {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("Could not remove staged shard {}: {}", path.display(), e);
            }
        }
    }
}

/// Single writer for a structure directory. Callers hold the build lock.
pub struct ShardWriter {
    dir: StructDir,
}

impl ShardWriter {
    pub fn new(dir: StructDir) -> Self {
        Self { dir }
    }

    /// Write every shard under its content-addressed name. Files the
    /// committed index references are never touched.
    pub fn stage(&self, shards: &BTreeMap<String, ModuleShard>) -> Result<StagedShards> {
        self.dir.ensure()?;
        let mut staged = StagedShards::default();
        for shard in shards.values() {
            let stem_path = self.dir.modules_dir().join(shard_stem(&shard.uid));
            let bytes = match to_json_bytes(&stem_path, shard) {
                Ok(bytes) => bytes,
                Err(e) => {
                    staged.discard();
                    return Err(e);
                }
            };
            let name = shard_file_name(&shard.uid, &bytes);
            let path = self.dir.modules_dir().join(&name);
            staged.paths.insert(shard.uid.clone(), StructDir::relative_shard_path(&name));
            if fs::read(&path).map(|existing| existing == bytes).unwrap_or(false) {
                staged.unchanged += 1;
                continue;
            }
            if let Err(e) = write_json_atomic(&path, &bytes) {
                staged.discard();
                return Err(e);
            }
            staged.created.push(path);
        }
        Ok(staged)
    }

    /// Swap in the index, then collect garbage. A failed index write drops
    /// the staged files and leaves the previous index and its shards intact.
    pub fn commit(&self, staged: StagedShards, index: &IndexFile) -> Result<CommitStats> {
        let mut stats = CommitStats {
            shards_written: staged.created.len(),
            shards_unchanged: staged.unchanged,
            ..Default::default()
        };

        let index_path = self.dir.index_path();
        let written = to_json_bytes(&index_path, index)
            .and_then(|bytes| write_json_atomic(&index_path, &bytes).map(|()| bytes.len()));
        match written {
            Ok(len) => stats.index_bytes = len,
            Err(e) => {
                staged.discard();
                return Err(e);
            }
        }

        stats.shards_removed = self.collect_garbage(index)?;
        tracing::info!(
            "Committed {} shards ({} unchanged, {} removed)",
            stats.shards_written,
            stats.shards_unchanged,
            stats.shards_removed
        );
        Ok(stats)
    }

    /// Delete shard files the index does not reference
    fn collect_garbage(&self, index: &IndexFile) -> Result<usize> {
        let referenced: BTreeSet<String> = index
            .modules
            .values()
            .filter_map(|entry| Path::new(&entry.shard_path).file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect();
        let mut removed = 0;
        for name in self.dir.list_shard_files()? {
            if referenced.contains(&name) {
                continue;
            }
            let path = self.dir.modules_dir().join(&name);
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Removed orphan shard {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::warn!("Could not remove orphan shard {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}
