//! Score normalization
//!
//! `penalty = 10 * errors + 2 * warnings`, scaled by the population so a
//! large repository is not failed by the same absolute count as a small
//! one. Populations below [`MIN_POPULATION`] count as that floor.

use serde::{Deserialize, Serialize};

use super::{Finding, Level, Severity};

pub const ERROR_WEIGHT: f64 = 10.0;
pub const WARNING_WEIGHT: f64 = 2.0;
pub const MIN_POPULATION: usize = 10;

/// Verdict for one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    pub level: Level,
    pub score: f64,
    pub min_score: f64,
    pub errors: usize,
    pub warnings: usize,
    pub passed: bool,
}

/// Score in `[0, 100]`, rounded to two decimals
pub fn score(errors: usize, warnings: usize, population: usize) -> f64 {
    let penalty = ERROR_WEIGHT * errors as f64 + WARNING_WEIGHT * warnings as f64;
    let scale = population.max(MIN_POPULATION) as f64;
    let raw = 100.0 - penalty * 10.0 / scale;
    (raw.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

/// Score the findings the level enables. Passing needs zero errors and at
/// least the level's minimum score.
pub fn evaluate_level(level: Level, findings: &[Finding], population: usize) -> LevelResult {
    let (errors, warnings) = findings
        .iter()
        .filter(|f| level.enables(f.check))
        .fold((0, 0), |(e, w), f| match f.severity {
            Severity::Error => (e + 1, w),
            Severity::Warning => (e, w + 1),
        });
    let score = score(errors, warnings, population);
    LevelResult {
        level,
        score,
        min_score: level.min_score(),
        errors,
        warnings,
        passed: errors == 0 && score >= level.min_score(),
    }
}
