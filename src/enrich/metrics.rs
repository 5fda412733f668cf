//! Entity metrics: lines of code, cyclomatic complexity, parameter count and
//! a maintainability index.
//!
//! Metrics are a pure function of the entity's source text, so
//! [`MetricsCache`] keys them by the SHA-256 of that text. One cache lives
//! for one rebuild.

use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::cache::content_hash;
use crate::detectors::MetricInput;
use crate::schema::{EntityKind, Metrics, ModuleMetrics};

/// Compute entity metrics from extractor counts
pub fn compute(input: &MetricInput, parameters: u32) -> Metrics {
    let complexity = 1 + input.decisions;
    Metrics {
        loc: input.loc,
        complexity,
        parameters,
        maintainability: maintainability_index(input, complexity),
    }
}

/// SEI maintainability index scaled to 0-100, with Halstead volume
/// approximated as `tokens * log2(distinct tokens)`
pub fn maintainability_index(input: &MetricInput, complexity: u32) -> f64 {
    let volume = if input.distinct_tokens > 1 {
        input.tokens as f64 * (input.distinct_tokens as f64).log2()
    } else {
        input.tokens as f64
    };
    let ln_volume = volume.max(1.0).ln();
    let ln_loc = (input.loc.max(1) as f64).ln();
    let raw = 171.0 - 5.2 * ln_volume - 0.23 * complexity as f64 - 16.2 * ln_loc;
    round2((raw * 100.0 / 171.0).clamp(0.0, 100.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate metrics of a module from its file-level counts and its entities
pub fn module_metrics(file: &MetricInput, entities: &[(EntityKind, Metrics)]) -> ModuleMetrics {
    let count = |kind: EntityKind| entities.iter().filter(|(k, _)| *k == kind).count() as u32;
    let complexity = 1 + file.decisions;
    let maintainability = if entities.is_empty() {
        maintainability_index(file, complexity)
    } else {
        let sum: f64 = entities.iter().map(|(_, m)| m.maintainability).sum();
        round2(sum / entities.len() as f64)
    };

    ModuleMetrics {
        loc: file.loc,
        complexity,
        maintainability,
        classes: count(EntityKind::Class),
        functions: count(EntityKind::Function),
        methods: count(EntityKind::Method),
    }
}

/// Metrics memoized by snippet hash for the duration of one build
#[derive(Debug, Default)]
pub struct MetricsCache {
    entries: Mutex<AHashMap<String, Metrics>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, snippet: &str, input: &MetricInput, parameters: u32) -> Metrics {
        let key = content_hash(snippet.as_bytes());
        if let Some(metrics) = self.entries.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *metrics;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let metrics = compute(input, parameters);
        self.entries.lock().insert(key, metrics);
        metrics
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
