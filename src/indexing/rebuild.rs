//! Full and incremental rebuilds of a structure directory
//!
//! A rebuild runs in two phases. The parallel phase reads, hashes, parses and
//! enriches files; nothing on disk changes during it. The single-writer
//! phase runs under the build lock, after every worker is done: links are
//! resolved over the merged module set, then shards, index and the side
//! documents are committed atomically. An interrupted rebuild leaves the
//! previously committed files authoritative.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::generation::{process_files, IndexingProgressCallback, SourceInput};
use super::{collect_files, SourceFile};
use crate::cache::{compute_delta, content_hash, modified_secs, BuildManifest, DeltaManifest, FileRecord, FileStatus, StructDir};
use crate::config::StructConfig;
use crate::enrich::summarizer::SummaryGenerator;
use crate::enrich::BuildContext;
use crate::error::{Result, StructError};
use crate::fs_utils::{to_json_bytes, write_json_atomic, BuildLock};
use crate::resolver::{resolve_links, separate_entity_uids, separation_is_stale, History};
use crate::schema::{schema_document, IndexFile, Metadata, ModuleShard, ParseError, SCHEMA_VERSION, TOOL_VERSION};
use crate::shard::{build_index, ShardWriter};
use crate::uid::{module_uid, shard_stem};

/// Inputs of one rebuild
pub struct RebuildOptions {
    pub root: PathBuf,
    /// Structure directory (`struct/`)
    pub out: PathBuf,
    /// Reuse shards of files whose content hash is unchanged
    pub incremental: bool,
    pub config: StructConfig,
    /// Middle summary tier; `None` disables it
    pub generator: Option<Arc<dyn SummaryGenerator>>,
}

/// What a rebuild produced
#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub index: IndexFile,
    pub metadata: Metadata,
    pub delta: DeltaManifest,
    pub parse_errors: Vec<ParseError>,
}

/// A discovered file after reading and hashing
struct ReadFile {
    source: SourceFile,
    module_uid: String,
    bytes: Vec<u8>,
    hash: String,
    size: u64,
    last_modified: u64,
}

/// Run a rebuild of `options.out` from `options.root`
pub fn rebuild(options: &RebuildOptions, progress: Option<&IndexingProgressCallback>) -> Result<RebuildReport> {
    let started = Instant::now();
    let config = &options.config;
    let dir = StructDir::new(&options.out);
    dir.ensure()?;
    let _lock = BuildLock::acquire(&dir.lock_path(), Duration::from_secs(config.build.lock_stale_secs))?;

    // ------------------------------------------------------------------
    // Discovery and hashing
    // ------------------------------------------------------------------
    let files = collect_files(&options.root, &config.source, Some(dir.root()))?;
    let files_discovered = files.len();
    let (read, mut errors) = read_files(files, &config.source.roots);

    let current: BTreeMap<String, String> = read
        .iter()
        .map(|f| (f.source.rel_path.clone(), f.hash.clone()))
        .collect();
    let previous_manifest = BuildManifest::load(&dir.manifest_path());
    let delta = compute_delta(previous_manifest.as_ref().unwrap_or(&BuildManifest::new()), &current);
    tracing::info!(
        "Delta: {} added, {} changed, {} removed, {} unchanged",
        delta.added.len(),
        delta.changed.len(),
        delta.removed.len(),
        delta.unchanged.len()
    );

    let previous_index = load_previous_index(&dir);
    let history = previous_index.as_ref().map(History::from_index).unwrap_or_default();
    let reuse_from = match (&previous_manifest, options.incremental) {
        (Some(manifest), true) => Some(manifest),
        (None, true) => {
            tracing::info!("No usable build manifest, running a full build");
            None
        }
        _ => None,
    };

    // ------------------------------------------------------------------
    // Reuse unchanged shards, process the rest in parallel
    // ------------------------------------------------------------------
    let mut shards: BTreeMap<String, ModuleShard> = BTreeMap::new();
    let mut pending: Vec<SourceInput> = Vec::new();
    let mut reused_inputs: BTreeMap<String, SourceInput> = BTreeMap::new();
    let mut last_modified: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for file in read {
        last_modified.insert(file.source.rel_path.clone(), (file.last_modified, file.size));
        let reused = match (reuse_from, &previous_index) {
            (Some(manifest), Some(index)) => reuse_shard(&dir, manifest, index, &file),
            _ => None,
        };
        let input = SourceInput {
            rel_path: file.source.rel_path,
            bytes: file.bytes,
            content_hash: file.hash,
        };
        match reused {
            Some(shard) => {
                reused_inputs.insert(shard.uid.clone(), input);
                shards.insert(shard.uid.clone(), shard);
            }
            None => pending.push(input),
        }
    }
    let reused_count = shards.len();
    tracing::info!("Reusing {} shards, processing {} files", reused_count, pending.len());

    let cached_summaries = previous_manifest.as_ref().map(|m| m.summaries.clone()).unwrap_or_default();
    let ctx = BuildContext::new(&config.summary, options.generator.clone(), cached_summaries);
    let generated = if config.build.jobs > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.build.jobs)
            .build()
            .map_err(|e| StructError::Config {
                message: format!("Failed to start {} worker threads: {}", config.build.jobs, e),
            })?;
        pool.install(|| process_files(&pending, &config.source.roots, &ctx, progress))
    } else {
        process_files(&pending, &config.source.roots, &ctx, progress)
    };
    let (hits, misses) = ctx.metrics.stats();
    tracing::debug!("Metrics cache: {} hits, {} misses", hits, misses);

    for shard in generated.shards {
        shards.insert(shard.uid.clone(), shard);
    }
    errors.extend(generated.errors);

    // reused shards were separated against the previous module set
    let modules: BTreeSet<String> = shards.keys().cloned().collect();
    let stale: Vec<SourceInput> = reused_inputs
        .into_iter()
        .filter(|(uid, _)| shards.get(uid).is_some_and(|shard| separation_is_stale(shard, &modules)))
        .map(|(_, input)| input)
        .collect();
    if !stale.is_empty() {
        tracing::debug!("Reprocessing {} shards whose entity uids depend on removed modules", stale.len());
        let again = process_files(&stale, &config.source.roots, &ctx, None);
        for shard in again.shards {
            shards.insert(shard.uid.clone(), shard);
        }
        errors.extend(again.errors);
    }
    let files_processed = pending.len() + stale.len();
    let files_reused = reused_count - stale.len();

    if files_discovered > 0 && shards.is_empty() {
        return Err(StructError::FatalParse { failed: errors.len() });
    }

    // ------------------------------------------------------------------
    // Single-writer phase
    // ------------------------------------------------------------------
    separate_entity_uids(&mut shards);
    resolve_links(&mut shards, &history);
    let writer = ShardWriter::new(dir.clone());
    let staged = writer.stage(&shards)?;
    let index = build_index(&shards, &staged.paths, errors);
    let commit = writer.commit(staged, &index)?;

    let schema_path = dir.schema_path();
    write_json_atomic(&schema_path, &to_json_bytes(&schema_path, &schema_document())?)?;

    let manifest = build_manifest(&current, &last_modified, &shards, &index, ctx.cached_summaries());
    manifest.save(&dir.manifest_path())?;
    delta.save(&dir.delta_path())?;

    let metadata = Metadata {
        generated_at: chrono::Utc::now().to_rfc3339(),
        tool_version: TOOL_VERSION.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        root: options.root.display().to_string(),
        incremental: reuse_from.is_some(),
        duration_ms: started.elapsed().as_millis() as u64,
        files_discovered,
        files_processed,
        files_reused,
        files_failed: index.parse_errors.len(),
        modules: index.stats.modules,
        entities: index.stats.entities,
        shards_written: commit.shards_written,
        shards_removed: commit.shards_removed,
    };
    let metadata_path = dir.metadata_path();
    write_json_atomic(&metadata_path, &to_json_bytes(&metadata_path, &metadata)?)?;

    tracing::info!(
        "Indexed {} modules, {} entities in {}ms ({} parse errors)",
        metadata.modules,
        metadata.entities,
        metadata.duration_ms,
        metadata.files_failed
    );

    Ok(RebuildReport {
        parse_errors: index.parse_errors.clone(),
        index,
        metadata,
        delta,
    })
}

/// Read and hash files in parallel; detect module uid collisions
fn read_files(files: Vec<SourceFile>, roots: &[String]) -> (Vec<ReadFile>, Vec<ParseError>) {
    let outcomes: Vec<std::result::Result<ReadFile, ParseError>> = files
        .into_par_iter()
        .map(|source| {
            let fail = |e: std::io::Error| ParseError {
                file: source.rel_path.clone(),
                reason: format!("unreadable: {}", e),
            };
            let bytes = fs::read(&source.path).map_err(fail)?;
            let meta = fs::metadata(&source.path).map_err(fail)?;
            Ok(ReadFile {
                module_uid: module_uid(&source.rel_path, roots),
                hash: content_hash(&bytes),
                size: meta.len(),
                last_modified: modified_secs(&meta),
                bytes,
                source,
            })
        })
        .collect();

    let mut read = Vec::new();
    let mut errors = Vec::new();
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    let mut file_names: BTreeMap<String, String> = BTreeMap::new();
    for outcome in outcomes {
        let file = match outcome {
            Ok(file) => file,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };
        let clash = owners
            .get(&file.module_uid)
            .or_else(|| file_names.get(&shard_stem(&file.module_uid)))
            .cloned();
        if let Some(owner) = clash {
            tracing::warn!("{} maps to the same module as {}, skipping", file.source.rel_path, owner);
            errors.push(ParseError {
                file: file.source.rel_path.clone(),
                reason: format!("uid collision with {} ({})", owner, file.module_uid),
            });
            continue;
        }
        owners.insert(file.module_uid.clone(), file.source.rel_path.clone());
        file_names.insert(shard_stem(&file.module_uid), file.source.rel_path.clone());
        read.push(file);
    }
    (read, errors)
}

/// Previous index, used as resolution history and to locate reusable shards.
/// Anything unreadable counts as no previous index.
fn load_previous_index(dir: &StructDir) -> Option<IndexFile> {
    fs::read(dir.index_path())
        .ok()
        .and_then(|bytes| serde_json::from_slice::<IndexFile>(&bytes).ok())
}

/// The previous shard of an unchanged file, if it is still on disk and intact
fn reuse_shard(dir: &StructDir, manifest: &BuildManifest, index: &IndexFile, file: &ReadFile) -> Option<ModuleShard> {
    let record = manifest.files.get(&file.source.rel_path)?;
    if record.content_hash != file.hash || record.module_uid != file.module_uid || record.status != FileStatus::Indexed {
        return None;
    }
    let entry = index.modules.get(&file.module_uid)?;
    let path = dir.resolve(&entry.shard_path);
    let shard = fs::read(&path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<ModuleShard>(&bytes).ok());
    match shard {
        Some(shard)
            if shard.schema_version == SCHEMA_VERSION
                && shard.content_hash == file.hash
                && shard.file_path == file.source.rel_path =>
        {
            Some(shard)
        }
        _ => {
            tracing::debug!("Shard for {} missing or stale, reprocessing", file.source.rel_path);
            None
        }
    }
}

fn build_manifest(
    current: &BTreeMap<String, String>,
    stat: &BTreeMap<String, (u64, u64)>,
    shards: &BTreeMap<String, ModuleShard>,
    index: &IndexFile,
    summaries: BTreeMap<String, String>,
) -> BuildManifest {
    let indexed: BTreeMap<&str, &str> = shards
        .values()
        .map(|s| (s.file_path.as_str(), s.uid.as_str()))
        .collect();
    let failures: BTreeMap<&str, &str> = index
        .parse_errors
        .iter()
        .map(|e| (e.file.as_str(), e.reason.as_str()))
        .collect();

    let mut manifest = BuildManifest::new();
    manifest.summaries = summaries;
    for (path, hash) in current {
        let (last_modified, size) = stat.get(path).copied().unwrap_or((0, 0));
        let (module_uid, status) = match indexed.get(path.as_str()) {
            Some(uid) => (uid.to_string(), FileStatus::Indexed),
            None => (
                String::new(),
                FileStatus::Failed {
                    reason: failures.get(path.as_str()).unwrap_or(&"not indexed").to_string(),
                },
            ),
        };
        manifest.files.insert(
            path.clone(),
            FileRecord {
                content_hash: hash.clone(),
                last_modified,
                size,
                module_uid,
                status,
            },
        );
    }
    manifest
}
