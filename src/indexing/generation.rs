//! Parallel parse and enrich with progress reporting
//!
//! Files are independent: each worker parses one file and builds its shard
//! against the shared [`BuildContext`]. Results are gathered in input order
//! once every worker has finished, so the output does not depend on
//! scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::enrich::{build_shard, BuildContext};
use crate::parsing::parse_source;
use crate::schema::{ModuleShard, ParseError};

/// Progress callback type for index generation.
///
/// The callback receives (current_count, total_count).
pub type IndexingProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// How often (in files) the progress callback fires
const PROGRESS_EVERY: usize = 50;

/// One file queued for processing
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub rel_path: String,
    pub bytes: Vec<u8>,
    pub content_hash: String,
}

/// Outcome of one parallel pass
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    /// Shards in input order
    pub shards: Vec<ModuleShard>,
    pub errors: Vec<ParseError>,
    /// Total bytes of source processed
    pub total_bytes: usize,
}

/// Parse and enrich files in parallel.
///
/// Parse failures are collected as [`ParseError`] values; they never stop
/// the other files.
pub fn process_files(
    inputs: &[SourceInput],
    roots: &[String],
    ctx: &BuildContext,
    progress: Option<&IndexingProgressCallback>,
) -> GenerationResult {
    let total = inputs.len();
    let processed = AtomicUsize::new(0);
    let total_bytes = AtomicUsize::new(0);

    let outcomes: Vec<Result<ModuleShard, ParseError>> = inputs
        .par_iter()
        .map(|input| {
            let current = processed.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = progress {
                if current % PROGRESS_EVERY == 0 {
                    cb(current, total);
                }
            }
            total_bytes.fetch_add(input.bytes.len(), Ordering::Relaxed);

            let parsed = parse_source(&input.rel_path, &input.bytes, roots)?;
            Ok(build_shard(&parsed, &input.content_hash, ctx))
        })
        .collect();

    if let Some(cb) = progress {
        cb(total, total);
    }

    let mut result = GenerationResult {
        total_bytes: total_bytes.load(Ordering::Relaxed),
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(shard) => result.shards.push(shard),
            Err(error) => {
                tracing::warn!("Skipping {}: {}", error.file, error.reason);
                result.errors.push(error);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::content_hash;
    use std::sync::Arc;

    fn input(rel_path: &str, source: &str) -> SourceInput {
        SourceInput {
            rel_path: rel_path.to_string(),
            bytes: source.as_bytes().to_vec(),
            content_hash: content_hash(source.as_bytes()),
        }
    }

    #[test]
    fn test_process_empty_list() {
        let result = process_files(&[], &[], &BuildContext::offline(), None);
        assert!(result.shards.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.total_bytes, 0);
    }

    #[test]
    fn test_parse_errors_do_not_stop_other_files() {
        let inputs = vec![
            input("a.py", "def ok():\n    pass\n"),
            input("b.py", "def broken(:\n"),
            input("c.py", "class C:\n    pass\n"),
        ];
        let result = process_files(&inputs, &[], &BuildContext::offline(), None);
        let uids: Vec<_> = result.shards.iter().map(|s| s.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "c"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].file, "b.py");
    }

    #[test]
    fn test_progress_reports_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let progress: IndexingProgressCallback = Box::new(move |current, total| {
            if current == total {
                seen.fetch_add(1, Ordering::Relaxed);
            }
        });
        process_files(&[input("a.py", "x = 1\n")], &[], &BuildContext::offline(), Some(&progress));
        assert!(calls.load(Ordering::Relaxed) >= 1);
    }
}
