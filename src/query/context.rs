//! Token-budgeted context assembly
//!
//! Candidates are ranked in tiers: explicitly requested uids, then their
//! dependencies by hop, then their dependents by hop, then remaining text or
//! tag matches. Inside a tier, textual relevance breaks ties. Whole blocks
//! are appended until the next one would push the rendered text over the
//! budget; a block is never cut.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::Serialize;

use super::tokens::estimate_tokens;
use crate::error::{Result, StructError};
use crate::index::{query_terms, relevance, StructIndex, TagMode};
use crate::schema::{Entity, IndexEntry};

/// Default proximity expansion depth
pub const DEFAULT_MAX_DEPTH: usize = 2;
/// Default token budget
pub const DEFAULT_MAX_TOKENS: usize = 2000;

/// Separator between rendered blocks
const BLOCK_SEPARATOR: &str = "\n";

/// A context request
#[derive(Debug, Clone)]
pub struct ContextRequest {
    /// Module or entity uids
    pub uids: Vec<String>,
    pub tags: Vec<String>,
    pub mode: TagMode,
    pub text: Option<String>,
    pub max_tokens: usize,
    /// Hops followed from each requested uid
    pub max_depth: usize,
}

impl Default for ContextRequest {
    fn default() -> Self {
        Self {
            uids: Vec::new(),
            tags: Vec::new(),
            mode: TagMode::And,
            text: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Why a candidate was considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reason {
    Seed,
    Dependency,
    Dependent,
    Match,
}

/// One included block
#[derive(Debug, Clone, Serialize)]
pub struct ContextBlock {
    pub uid: String,
    pub kind: String,
    pub reason: Reason,
    /// Hop distance from the nearest requested uid (0 for seeds and matches)
    pub depth: usize,
    pub relevance: u32,
    pub tokens: usize,
    /// Already part of [`RenderedContext::text`]
    #[serde(skip)]
    pub text: String,
}

/// Assembled context
#[derive(Debug, Clone, Serialize)]
pub struct RenderedContext {
    pub text: String,
    pub blocks: Vec<ContextBlock>,
    pub included: Vec<String>,
    pub tokens_used: usize,
    pub max_tokens: usize,
    /// Ranked candidates left out for lack of budget
    pub omitted: usize,
}

impl RenderedContext {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// What a candidate renders from
enum Body<'a> {
    Module(&'a IndexEntry),
    Entity(Entity),
}

struct Candidate<'a> {
    uid: String,
    reason: Reason,
    depth: usize,
    relevance: u32,
    /// Position among seeds so explicit order is kept
    order: usize,
    body: Body<'a>,
}

impl Candidate<'_> {
    fn sort_key(&self) -> (Reason, usize, Reverse<u32>, usize) {
        (self.reason, self.depth, Reverse(self.relevance), self.order)
    }
}

/// Assemble context for `request` from a loaded index
pub fn assemble(index: &StructIndex, request: &ContextRequest) -> Result<RenderedContext> {
    let text = request.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if request.uids.is_empty() && request.tags.is_empty() && text.is_none() {
        return Err(StructError::InvalidArgument {
            message: "a query needs at least one uid, tag or search text".to_string(),
        });
    }
    let terms = text.map(query_terms).unwrap_or_default();
    let score = |entry: &IndexEntry| -> u32 {
        let tag_hits = request.tags.iter().filter(|t| entry.tags.contains(*t)).count() as u32;
        relevance(&terms, &entry.uid, &entry.summary.text, entry.tags.iter(), &entry.file_path) + tag_hits
    };

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seed_modules: Vec<&str> = Vec::new();

    // Seeds
    for uid in &request.uids {
        if let Some(entry) = index.find_by_uid(uid) {
            seed_modules.push(entry.uid.as_str());
            let order = candidates.len();
            candidates.push(Candidate {
                uid: entry.uid.clone(),
                reason: Reason::Seed,
                depth: 0,
                relevance: score(entry),
                order,
                body: Body::Module(entry),
            });
            let shard = index.load_shard(&entry.uid)?;
            for entity in shard.entities {
                let order = candidates.len();
                candidates.push(Candidate {
                    uid: entity.uid.clone(),
                    reason: Reason::Seed,
                    depth: 1,
                    relevance: 0,
                    order,
                    body: Body::Entity(entity),
                });
            }
        } else if let Some(entity) = index.entity_detail(uid)? {
            if let Some(module) = index.module_of(uid) {
                seed_modules.push(module);
            }
            let order = candidates.len();
            candidates.push(Candidate {
                uid: entity.uid.clone(),
                reason: Reason::Seed,
                depth: 0,
                relevance: 0,
                order,
                body: Body::Entity(entity),
            });
        } else {
            tracing::warn!("Unknown uid '{}' ignored", uid);
        }
    }

    // Proximity: nearest hop wins across seeds
    let mut dependencies: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, usize> = BTreeMap::new();
    for seed in &seed_modules {
        for (uid, depth) in index.dependencies_by_depth(seed, request.max_depth) {
            let slot = dependencies.entry(uid).or_insert(depth);
            *slot = (*slot).min(depth);
        }
        for (uid, depth) in index.dependents_by_depth(seed, request.max_depth) {
            let slot = dependents.entry(uid).or_insert(depth);
            *slot = (*slot).min(depth);
        }
    }
    for (reason, set) in [(Reason::Dependency, &dependencies), (Reason::Dependent, &dependents)] {
        for (uid, depth) in set {
            if let Some(entry) = index.find_by_uid(uid) {
                candidates.push(Candidate {
                    uid: uid.clone(),
                    reason,
                    depth: *depth,
                    relevance: score(entry),
                    order: 0,
                    body: Body::Module(entry),
                });
            }
        }
    }

    // Text and tag matches
    let mut matches: BTreeMap<&str, &IndexEntry> = BTreeMap::new();
    if let Some(text) = text {
        for entry in index.search_text(text) {
            matches.insert(entry.uid.as_str(), entry);
        }
    }
    for entry in index.find_by_tags(&request.tags, request.mode) {
        matches.insert(entry.uid.as_str(), entry);
    }
    for entry in matches.into_values() {
        candidates.push(Candidate {
            uid: entry.uid.clone(),
            reason: Reason::Match,
            depth: 0,
            relevance: score(entry),
            order: 0,
            body: Body::Module(entry),
        });
    }

    candidates.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()).then_with(|| a.uid.cmp(&b.uid)));
    let mut seen = std::collections::BTreeSet::new();
    candidates.retain(|c| seen.insert(c.uid.clone()));

    Ok(fill_budget(candidates, request.max_tokens))
}

/// Greedy whole-block inclusion under the token budget
fn fill_budget(candidates: Vec<Candidate>, max_tokens: usize) -> RenderedContext {
    let total = candidates.len();
    let mut rendered = RenderedContext {
        text: String::new(),
        blocks: Vec::new(),
        included: Vec::new(),
        tokens_used: 0,
        max_tokens,
        omitted: 0,
    };

    for candidate in candidates {
        let (kind, block) = match &candidate.body {
            Body::Module(entry) => ("module".to_string(), render_module(entry)),
            Body::Entity(entity) => (entity.kind.as_str().to_string(), render_entity(entity)),
        };
        let next = if rendered.text.is_empty() {
            block.clone()
        } else {
            format!("{}{}{}", rendered.text, BLOCK_SEPARATOR, block)
        };
        let tokens = estimate_tokens(&next);
        if tokens > max_tokens {
            break;
        }
        rendered.text = next;
        rendered.tokens_used = tokens;
        rendered.included.push(candidate.uid.clone());
        rendered.blocks.push(ContextBlock {
            tokens: estimate_tokens(&block),
            uid: candidate.uid,
            kind,
            reason: candidate.reason,
            depth: candidate.depth,
            relevance: candidate.relevance,
            text: block,
        });
    }
    rendered.omitted = total - rendered.blocks.len();
    tracing::debug!(
        "Assembled {} blocks ({} tokens of {}), {} omitted",
        rendered.blocks.len(),
        rendered.tokens_used,
        max_tokens,
        rendered.omitted
    );
    rendered
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn render_module(entry: &IndexEntry) -> String {
    let tags: Vec<String> = entry.tags.iter().cloned().collect();
    let m = &entry.metrics;
    let mut out = format!("## module {} ({})\n", entry.uid, entry.file_path);
    out.push_str(&format!(
        "summary: {} [{}/{}]\n",
        entry.summary.text,
        entry.summary.source.as_str(),
        entry.summary.confidence.as_str()
    ));
    out.push_str(&format!("tags: {}\n", join_or_dash(&tags)));
    out.push_str(&format!(
        "metrics: loc={} complexity={} maintainability={:.2} classes={} functions={} methods={}\n",
        m.loc, m.complexity, m.maintainability, m.classes, m.functions, m.methods
    ));
    out.push_str(&format!("dependencies: {}\n", join_or_dash(&entry.dependencies)));
    out.push_str(&format!("dependents: {}\n", join_or_dash(&entry.dependents)));
    if !entry.unresolved.is_empty() {
        out.push_str(&format!("unresolved: {}\n", entry.unresolved.join(", ")));
    }
    out
}

fn render_entity(entity: &Entity) -> String {
    let tags: Vec<String> = entity.tags.iter().cloned().collect();
    let m = &entity.metrics;
    let mut out = format!(
        "### {} {} (lines {}-{})\n",
        entity.kind.as_str(),
        entity.uid,
        entity.lines.start,
        entity.lines.end
    );
    out.push_str(&format!("signature: {}\n", entity.signature));
    out.push_str(&format!(
        "summary: {} [{}/{}]\n",
        entity.summary.text,
        entity.summary.source.as_str(),
        entity.summary.confidence.as_str()
    ));
    out.push_str(&format!("tags: {}\n", join_or_dash(&tags)));
    out.push_str(&format!(
        "metrics: loc={} complexity={} parameters={} maintainability={:.2}\n",
        m.loc, m.complexity, m.parameters, m.maintainability
    ));
    if !entity.tested_by.is_empty() {
        out.push_str(&format!("tested_by: {}\n", entity.tested_by.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StructConfig;
    use crate::indexing::{rebuild, RebuildOptions};
    use std::fs;
    use tempfile::TempDir;

    fn build() -> (TempDir, StructIndex) {
        let temp = TempDir::new().unwrap();
        let files = [
            ("src/api.py", "\"\"\"HTTP handlers.\"\"\"\nfrom service import create_order\n\ndef post_order(body):\n    return create_order(body)\n"),
            ("src/service.py", "\"\"\"Order service.\"\"\"\nfrom store import save\n\ndef create_order(body):\n    \"\"\"Validate and persist an order.\"\"\"\n    return save(body)\n"),
            ("src/store.py", "\"\"\"Persistence layer.\"\"\"\n\ndef save(record):\n    return record\n"),
            ("src/billing.py", "\"\"\"Invoice billing.\"\"\"\n\ndef bill():\n    pass\n"),
        ];
        for (rel, content) in files {
            let path = temp.path().join("repo").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        rebuild(
            &RebuildOptions {
                root: temp.path().join("repo"),
                out: temp.path().join("struct"),
                incremental: false,
                config: StructConfig::default(),
                generator: None,
            },
            None,
        )
        .unwrap();
        let index = StructIndex::load(temp.path().join("struct")).unwrap();
        (temp, index)
    }

    fn request(uids: &[&str], max_tokens: usize) -> ContextRequest {
        ContextRequest {
            uids: uids.iter().map(|s| s.to_string()).collect(),
            max_tokens,
            ..Default::default()
        }
    }

    #[test]
    fn test_seed_then_dependencies_then_dependents() {
        let (_temp, index) = build();
        let rendered = assemble(&index, &request(&["service"], 10_000)).unwrap();
        assert_eq!(
            rendered.included,
            vec!["service", "service.create_order", "store", "api"]
        );
        assert_eq!(rendered.omitted, 0);
        assert!(rendered.text.contains("Validate and persist an order."));
    }

    #[test]
    fn test_budget_is_never_exceeded_and_blocks_are_whole() {
        let (_temp, index) = build();
        let full = assemble(&index, &request(&["service"], 10_000)).unwrap();
        for budget in [0, 10, 40, 80, 120, 200] {
            let rendered = assemble(&index, &request(&["service"], budget)).unwrap();
            assert!(rendered.tokens_used <= budget);
            assert!(estimate_tokens(&rendered.text) <= budget);
            for block in &rendered.blocks {
                let complete = full.blocks.iter().find(|b| b.uid == block.uid).unwrap();
                assert_eq!(block.text, complete.text);
            }
            assert_eq!(rendered.blocks.len() + rendered.omitted, full.blocks.len());
        }
    }

    #[test]
    fn test_text_matches_and_entity_seed() {
        let (_temp, index) = build();
        let by_text = assemble(
            &index,
            &ContextRequest {
                text: Some("billing".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_text.included, vec!["billing"]);

        let entity = assemble(&index, &request(&["store.save"], 10_000)).unwrap();
        assert_eq!(entity.included[0], "store.save");
        assert!(entity.included.contains(&"service".to_string()));
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let (_temp, index) = build();
        let err = assemble(&index, &ContextRequest::default()).unwrap_err();
        assert!(matches!(err, StructError::InvalidArgument { .. }));
        let nothing = assemble(&index, &request(&["no.such.uid"], 100)).unwrap();
        assert!(nothing.is_empty());
    }
}
