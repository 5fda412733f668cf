//! Structure directory layout and incremental build state
//!
//! The build manifest (`cache.json`) records, per source file, the content
//! hash that decides whether the file must be re-processed, plus the cache of
//! generator-produced summaries. The delta manifest (`delta.json`) reports
//! what the last rebuild saw change.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StructError};
use crate::fs_utils::{to_json_bytes, write_json_atomic};
use crate::schema::SCHEMA_VERSION;

/// Hex SHA-256 of a file's bytes
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Directory layout
// ============================================================================

/// Paths inside a structure directory
#[derive(Debug, Clone)]
pub struct StructDir {
    root: PathBuf,
}

impl StructDir {
    pub const INDEX: &'static str = "index.json";
    pub const SCHEMA: &'static str = "schema.json";
    pub const METADATA: &'static str = "metadata.json";
    pub const MANIFEST: &'static str = "cache.json";
    pub const DELTA: &'static str = "delta.json";
    pub const LOCK: &'static str = ".lock";
    pub const MODULES: &'static str = "modules";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(Self::INDEX)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.root.join(Self::SCHEMA)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(Self::METADATA)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(Self::MANIFEST)
    }

    pub fn delta_path(&self) -> PathBuf {
        self.root.join(Self::DELTA)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(Self::LOCK)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.root.join(Self::MODULES)
    }

    /// Shard path relative to the structure directory (as stored in the index)
    pub fn relative_shard_path(file_name: &str) -> String {
        format!("{}/{}", Self::MODULES, file_name)
    }

    /// Resolve an index `shard_path` against this directory
    pub fn resolve(&self, shard_path: &str) -> PathBuf {
        self.root.join(shard_path)
    }

    /// Create the directory and its `modules/` subdirectory
    pub fn ensure(&self) -> Result<()> {
        let modules = self.modules_dir();
        fs::create_dir_all(&modules).map_err(|e| StructError::io(&modules, e))
    }

    /// Shard file names currently present under `modules/`
    pub fn list_shard_files(&self) -> Result<BTreeSet<String>> {
        let dir = self.modules_dir();
        if !dir.exists() {
            return Ok(BTreeSet::new());
        }
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&dir).map_err(|e| StructError::io(&dir, e))? {
            let entry = entry.map_err(|e| StructError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") && !name.starts_with('.') {
                names.insert(name);
            }
        }
        Ok(names)
    }
}

// ============================================================================
// Build manifest
// ============================================================================

/// Outcome of the last attempt to process a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    Failed { reason: String },
}

/// What the manifest knows about one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub content_hash: String,
    /// Seconds since the Unix epoch
    pub last_modified: u64,
    pub size: u64,
    pub module_uid: String,
    pub status: FileStatus,
}

/// `cache.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub schema_version: String,
    /// Keyed by project-relative path
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    /// Generated summaries keyed by the SHA-256 of the summarized snippet
    #[serde(default)]
    pub summaries: BTreeMap<String, String>,
}

impl BuildManifest {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Load the manifest; a missing, unreadable or foreign-version manifest
    /// yields `None` so the caller falls back to a full build
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read(path).ok()?;
        match serde_json::from_slice::<BuildManifest>(&content) {
            Ok(manifest) if manifest.schema_version == SCHEMA_VERSION => Some(manifest),
            Ok(manifest) => {
                tracing::info!(
                    "Build manifest has schema {} (expected {}), ignoring",
                    manifest.schema_version,
                    SCHEMA_VERSION
                );
                None
            }
            Err(e) => {
                tracing::warn!("Build manifest {} is malformed: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = to_json_bytes(path, self)?;
        write_json_atomic(path, &bytes)
    }
}

/// Modification time of a file in seconds since the epoch (0 when unknown)
pub fn modified_secs(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Delta manifest
// ============================================================================

/// `delta.json`: how the current tree differs from the previous manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaManifest {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl DeltaManifest {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = to_json_bytes(path, self)?;
        write_json_atomic(path, &bytes)
    }
}

/// Compare current `path -> content_hash` against the previous manifest
pub fn compute_delta(previous: &BuildManifest, current: &BTreeMap<String, String>) -> DeltaManifest {
    let mut delta = DeltaManifest::default();
    for (path, hash) in current {
        match previous.files.get(path) {
            None => delta.added.push(path.clone()),
            Some(record) if &record.content_hash != hash => delta.changed.push(path.clone()),
            Some(_) => delta.unchanged.push(path.clone()),
        }
    }
    delta.removed = previous
        .files
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(hash: &str) -> FileRecord {
        FileRecord {
            content_hash: hash.to_string(),
            last_modified: 0,
            size: 1,
            module_uid: "m".to_string(),
            status: FileStatus::Indexed,
        }
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn test_compute_delta() {
        let mut previous = BuildManifest::new();
        previous.files.insert("a.py".into(), record("1"));
        previous.files.insert("b.py".into(), record("2"));
        previous.files.insert("gone.py".into(), record("3"));

        let current: BTreeMap<String, String> = [
            ("a.py".to_string(), "1".to_string()),
            ("b.py".to_string(), "changed".to_string()),
            ("new.py".to_string(), "4".to_string()),
        ]
        .into_iter()
        .collect();

        let delta = compute_delta(&previous, &current);
        assert_eq!(delta.added, vec!["new.py"]);
        assert_eq!(delta.changed, vec!["b.py"]);
        assert_eq!(delta.removed, vec!["gone.py"]);
        assert_eq!(delta.unchanged, vec!["a.py"]);
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_manifest_round_trip_and_version_gate() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("cache.json");

        let mut manifest = BuildManifest::new();
        manifest.files.insert(
            "x.py".into(),
            FileRecord {
                status: FileStatus::Failed {
                    reason: "syntax error".into(),
                },
                ..record("9")
            },
        );
        manifest.save(&path).unwrap();
        assert_eq!(BuildManifest::load(&path), Some(manifest.clone()));

        manifest.schema_version = "0.1".into();
        manifest.save(&path).unwrap();
        assert_eq!(BuildManifest::load(&path), None);
    }

    #[test]
    fn test_malformed_manifest_is_ignored() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(BuildManifest::load(&path), None);
    }

    #[test]
    fn test_list_shard_files() {
        let temp = tempdir().unwrap();
        let dir = StructDir::new(temp.path());
        dir.ensure().unwrap();
        fs::write(dir.modules_dir().join("a.json"), "{}").unwrap();
        fs::write(dir.modules_dir().join(".a.json.tmp-1"), "").unwrap();
        let names: Vec<_> = dir.list_shard_files().unwrap().into_iter().collect();
        assert_eq!(names, vec!["a.json"]);
    }
}
