//! Validate command handler - Score a structure directory

use std::path::Path;

use crate::cli::ValidateArgs;
use crate::commands::{CommandContext, CommandOutput};
use crate::config::StructConfig;
use crate::error::{Result, StructError};
use crate::validate::{Severity, ValidationReport, Validator};

/// Findings shown in text output without `-v`
const TEXT_FINDING_LIMIT: usize = 50;

/// Run the validate command
pub fn run_validate(args: &ValidateArgs, ctx: &CommandContext) -> Result<CommandOutput> {
    let here = Path::new(".");
    let config = match &args.config {
        Some(path) => StructConfig::load(Some(path.as_path()), here)?,
        None => StructConfig::load(None, here).unwrap_or_default(),
    };
    let report = Validator::new(&args.struct_dir, config.validation).run(args.level);
    let text = ctx.render(&report, || render_report(&report, ctx.verbose));

    if report.passed {
        Ok(CommandOutput::success(text))
    } else {
        Ok(CommandOutput::failed(
            text,
            StructError::ValidationFailed {
                level: report.requested.as_str().to_string(),
                score: report.score,
            },
        ))
    }
}

/// Human-readable report
pub fn render_report(report: &ValidationReport, verbose: bool) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "validation: {} at level {} (score {:.2}, min {:.0})\n",
        if report.passed { "PASSED" } else { "FAILED" },
        report.requested.as_str(),
        report.score,
        report.requested.min_score()
    ));
    output.push_str(&format!("  struct_dir: {}\n", report.struct_dir));
    output.push_str(&format!(
        "  population: {}  errors: {}  warnings: {}\n",
        report.population, report.errors, report.warnings
    ));

    output.push_str("\nlevels:\n");
    for level in &report.levels {
        output.push_str(&format!(
            "  {:<10} score {:>6.2} / {:>3.0}  errors {:<4} warnings {:<4} {}\n",
            level.level.as_str(),
            level.score,
            level.min_score,
            level.errors,
            level.warnings,
            if level.passed { "pass" } else { "fail" }
        ));
    }

    if report.findings.is_empty() {
        return output;
    }
    output.push_str(&format!("\nfindings[{}]:\n", report.findings.len()));
    let limit = if verbose { report.findings.len() } else { TEXT_FINDING_LIMIT };
    for finding in report.findings.iter().take(limit) {
        let marker = match finding.severity {
            Severity::Error => "E",
            Severity::Warning => "W",
        };
        let mut location = finding.location.file.clone();
        if let Some(pointer) = &finding.location.pointer {
            location.push('#');
            location.push_str(pointer);
        }
        output.push_str(&format!(
            "  [{}] {:<13} {}: {}\n",
            marker,
            finding.check.as_str(),
            location,
            finding.message
        ));
    }
    if report.findings.len() > limit {
        output.push_str(&format!("  ... and {} more (use -v)\n", report.findings.len() - limit));
    }
    output
}
