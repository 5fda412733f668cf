//! Generate command handler - Build or refresh the structure directory

use serde::Serialize;

use crate::cli::GenerateArgs;
use crate::commands::validate::render_report;
use crate::commands::{CommandContext, CommandOutput};
use crate::config::StructConfig;
use crate::enrich::summarizer;
use crate::error::{Result, StructError};
use crate::indexing::{rebuild, IndexingProgressCallback, RebuildOptions, RebuildReport};
use crate::validate::{ValidationReport, Validator};

#[derive(Debug, Serialize)]
struct GenerateOutput<'a> {
    root: String,
    struct_dir: String,
    incremental: bool,
    files_discovered: usize,
    files_processed: usize,
    files_reused: usize,
    files_failed: usize,
    modules: usize,
    entities: usize,
    dependencies: usize,
    unresolved: usize,
    shards_written: usize,
    shards_removed: usize,
    added: usize,
    changed: usize,
    removed: usize,
    duration_ms: u64,
    parse_errors: &'a [crate::schema::ParseError],
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<&'a ValidationReport>,
}

/// Run the generate command
pub fn run_generate(args: &GenerateArgs, ctx: &CommandContext) -> Result<CommandOutput> {
    if !args.root.is_dir() {
        return Err(StructError::InvalidArgument {
            message: format!("source root {} is not a directory", args.root.display()),
        });
    }
    let mut config = StructConfig::load(args.config.as_deref(), &args.root)?;
    if let Some(jobs) = args.jobs {
        config.build.jobs = jobs;
    }
    let generator = if args.no_summaries {
        None
    } else {
        summarizer::from_config(&config.summary)
    };

    let out = args.out_dir();
    let options = RebuildOptions {
        root: args.root.clone(),
        out: out.clone(),
        incremental: args.incremental,
        config: config.clone(),
        generator,
    };

    let progress: Option<IndexingProgressCallback> = ctx.progress.then(|| {
        Box::new(|current: usize, total: usize| {
            if total > 0 {
                eprintln!(
                    "Progress: {}/{} ({:.0}%)",
                    current,
                    total,
                    (current as f64 / total as f64) * 100.0
                );
            }
        }) as IndexingProgressCallback
    });

    let report = rebuild(&options, progress.as_ref())?;

    let validation = args
        .validate_level
        .map(|level| Validator::new(&out, config.validation.clone()).run(level));

    let summary = summarize(args, &out, &report, validation.as_ref());
    let text = ctx.render(&summary, || render_text(&summary, ctx));

    match validation {
        Some(v) if !v.passed => Ok(CommandOutput::failed(
            text,
            StructError::ValidationFailed {
                level: v.requested.as_str().to_string(),
                score: v.score,
            },
        )),
        _ => Ok(CommandOutput::success(text)),
    }
}

fn summarize<'a>(
    args: &GenerateArgs,
    out: &std::path::Path,
    report: &'a RebuildReport,
    validation: Option<&'a ValidationReport>,
) -> GenerateOutput<'a> {
    let meta = &report.metadata;
    GenerateOutput {
        root: args.root.display().to_string(),
        struct_dir: out.display().to_string(),
        incremental: meta.incremental,
        files_discovered: meta.files_discovered,
        files_processed: meta.files_processed,
        files_reused: meta.files_reused,
        files_failed: meta.files_failed,
        modules: meta.modules,
        entities: meta.entities,
        dependencies: report.index.stats.dependencies,
        unresolved: report.index.stats.unresolved,
        shards_written: meta.shards_written,
        shards_removed: meta.shards_removed,
        added: report.delta.added.len(),
        changed: report.delta.changed.len(),
        removed: report.delta.removed.len(),
        duration_ms: meta.duration_ms,
        parse_errors: &report.parse_errors,
        validation,
    }
}

fn render_text(summary: &GenerateOutput, ctx: &CommandContext) -> String {
    let mut output = String::new();
    output.push_str("Structure generation complete:\n");
    output.push_str(&format!("  root: {}\n", summary.root));
    output.push_str(&format!("  struct_dir: {}\n", summary.struct_dir));
    output.push_str(&format!(
        "  files: {} discovered, {} processed, {} reused, {} failed\n",
        summary.files_discovered, summary.files_processed, summary.files_reused, summary.files_failed
    ));
    output.push_str(&format!(
        "  changes: {} added, {} changed, {} removed\n",
        summary.added, summary.changed, summary.removed
    ));
    output.push_str(&format!("  modules: {}\n", summary.modules));
    output.push_str(&format!("  entities: {}\n", summary.entities));
    output.push_str(&format!(
        "  links: {} dependencies, {} unresolved\n",
        summary.dependencies, summary.unresolved
    ));
    output.push_str(&format!(
        "  shards: {} written, {} removed\n",
        summary.shards_written, summary.shards_removed
    ));
    output.push_str(&format!("  duration_ms: {}\n", summary.duration_ms));

    if !summary.parse_errors.is_empty() {
        output.push_str(&format!("\nparse_errors[{}]:\n", summary.parse_errors.len()));
        let shown = if ctx.verbose { summary.parse_errors.len() } else { 10 };
        for error in summary.parse_errors.iter().take(shown) {
            output.push_str(&format!("  {}: {}\n", error.file, error.reason));
        }
        if summary.parse_errors.len() > shown {
            output.push_str(&format!("  ... and {} more (use -v)\n", summary.parse_errors.len() - shown));
        }
    }

    if let Some(validation) = summary.validation {
        output.push('\n');
        output.push_str(&render_report(validation, ctx.verbose));
    }
    output
}
