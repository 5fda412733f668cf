//! Query/Context Assembler
//!
//! Bounded retrieval over a loaded [`crate::index::StructIndex`]: candidates
//! are ranked by proximity to the requested uids and by textual relevance,
//! then rendered whole until the token budget is spent.

pub mod context;
pub mod tokens;

pub use context::{assemble, ContextBlock, ContextRequest, Reason, RenderedContext};
pub use tokens::estimate_tokens;
