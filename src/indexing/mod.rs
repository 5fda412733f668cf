//! Indexing pipeline: source discovery, parallel parse/enrich and the
//! incremental rebuild that commits a structure directory.

pub mod generation;
pub mod rebuild;

pub use generation::{process_files, GenerationResult, IndexingProgressCallback, SourceInput};
pub use rebuild::{rebuild, RebuildOptions, RebuildReport};

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::config::SourceConfig;
use crate::error::{Result, StructError};
use crate::fs_utils::{normalize_path, relative_slash_path};
use crate::lang::is_supported_file;

/// Directory names never descended into, gitignore or not
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "coverage",
    "__pycache__",
    "venv",
];

/// A discovered source file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    /// Slash-separated path relative to the project root
    pub rel_path: String,
    pub path: PathBuf,
}

/// Collect supported source files under `root`, sorted by relative path.
/// Anything under `skip` (the structure directory) is left out.
pub fn collect_files(root: &Path, config: &SourceConfig, skip: Option<&Path>) -> Result<Vec<SourceFile>> {
    let root = root
        .canonicalize()
        .map_err(|e| StructError::io(root, e))?;
    let skip = skip.map(|p| p.canonicalize().unwrap_or_else(|_| normalize_path(p)));

    let mut overrides = OverrideBuilder::new(&root);
    for pattern in &config.exclude {
        overrides
            .add(&format!("!{}", pattern))
            .map_err(|e| StructError::Config {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            })?;
    }
    let overrides = overrides.build().map_err(|e| StructError::Config {
        message: format!("Invalid exclude patterns: {}", e),
    })?;

    let mut builder = WalkBuilder::new(&root);
    builder
        .hidden(true)
        .follow_links(false)
        .require_git(false)
        .git_ignore(config.follow_gitignore)
        .git_global(config.follow_gitignore)
        .git_exclude(config.follow_gitignore)
        .ignore(config.follow_gitignore)
        .overrides(overrides)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if is_dir {
                let name = entry.file_name().to_string_lossy();
                if SKIPPED_DIRS.contains(&name.as_ref()) {
                    return false;
                }
            }
            match &skip {
                Some(skip) => !entry.path().starts_with(skip),
                None => true,
            }
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("Walk error: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if !is_supported_file(path) {
            continue;
        }
        files.push(SourceFile {
            rel_path: relative_slash_path(&root, path),
            path: path.to_path_buf(),
        });
    }
    files.sort();
    tracing::info!("Discovered {} source files under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x = 1\n").unwrap();
    }

    fn rel_paths(files: &[SourceFile]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[test]
    fn test_collects_supported_files_sorted() {
        let temp = TempDir::new().unwrap();
        for rel in ["src/b.py", "src/a.rs", "README.md", "node_modules/x/index.js", ".hidden/c.py"] {
            touch(temp.path(), rel);
        }
        let files = collect_files(temp.path(), &SourceConfig::default(), None).unwrap();
        assert_eq!(rel_paths(&files), vec!["src/a.rs", "src/b.py"]);
    }

    #[test]
    fn test_exclude_patterns_and_gitignore() {
        let temp = TempDir::new().unwrap();
        for rel in ["src/keep.py", "src/gen/out.py", "scratch/tmp.py"] {
            touch(temp.path(), rel);
        }
        fs::write(temp.path().join(".gitignore"), "scratch/\n").unwrap();
        let config = SourceConfig {
            exclude: vec!["src/gen/**".to_string()],
            ..Default::default()
        };
        let files = collect_files(temp.path(), &config, None).unwrap();
        assert_eq!(rel_paths(&files), vec!["src/keep.py"]);
    }

    #[test]
    fn test_skips_structure_directory() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "app.py");
        touch(temp.path(), "out/struct/stray.py");
        let skip = temp.path().join("out/struct");
        let files = collect_files(temp.path(), &SourceConfig::default(), Some(&skip)).unwrap();
        assert_eq!(rel_paths(&files), vec!["app.py"]);
    }
}
