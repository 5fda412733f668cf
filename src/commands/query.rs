//! Query command handler - Token-budgeted context from a structure directory

use crate::cli::{OutputFormat, QueryArgs};
use crate::commands::{CommandContext, CommandOutput};
use crate::error::{Result, StructError};
use crate::index::StructIndex;
use crate::query::{assemble, estimate_tokens, ContextRequest, RenderedContext};

/// Run the query command
///
/// Whatever the output format, the printed output's estimated token count
/// stays within `--max-tokens`. Text output is the rendered context itself;
/// JSON and TOON wrap it in an envelope, so the context is re-assembled under
/// a smaller budget until the envelope fits.
pub fn run_query(args: &QueryArgs, ctx: &CommandContext) -> Result<CommandOutput> {
    let index = StructIndex::load(&args.struct_dir)?;
    let mut request = ContextRequest {
        uids: args.uids.clone(),
        tags: args.tags.clone(),
        mode: args.mode,
        text: args.text.clone(),
        max_tokens: args.max_tokens,
        max_depth: args.depth,
    };

    loop {
        let mut rendered = assemble(&index, &request)?;
        if rendered.is_empty() {
            return Err(nothing_included(&rendered, args.max_tokens));
        }
        rendered.max_tokens = args.max_tokens;
        let text = ctx.render(&rendered, || rendered.text.clone());
        let used = estimate_tokens(&text);

        if used <= args.max_tokens || ctx.format == OutputFormat::Text {
            if ctx.verbose {
                eprintln!(
                    "Included {} blocks ({} of {} tokens, {} printed), {} omitted",
                    rendered.blocks.len(),
                    rendered.tokens_used,
                    args.max_tokens,
                    used,
                    rendered.omitted
                );
            }
            return Ok(CommandOutput::success(text));
        }

        let excess = used - args.max_tokens;
        tracing::debug!(
            "{:?} output is {} tokens over budget, re-assembling with {} tokens",
            ctx.format,
            excess,
            request.max_tokens.saturating_sub(excess)
        );
        request.max_tokens = request.max_tokens.saturating_sub(excess.max(1));
    }
}

fn nothing_included(rendered: &RenderedContext, max_tokens: usize) -> StructError {
    if rendered.omitted > 0 {
        StructError::BudgetTooSmall {
            max_tokens,
            omitted: rendered.omitted,
        }
    } else {
        StructError::EmptyResult
    }
}
