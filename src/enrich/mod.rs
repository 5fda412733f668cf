//! Entity Model Builder
//!
//! Turns a parsed file into a [`ModuleShard`]: assigns uids, computes
//! metrics, picks summaries and infers tags. Links (dependencies and call
//! edges) are left unresolved here; [`crate::resolver`] settles them once
//! every module of the build is known.

pub mod metrics;
pub mod summarizer;
pub mod summary;
pub mod tags;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SummaryConfig;
use crate::parsing::ParsedFile;
use crate::schema::{
    CallEdge, Dependency, Entity, EntityKind, LinkStatus, ModuleShard, SCHEMA_VERSION,
};
use crate::uid::{assign_entity_uids, legacy_id, uid_components, UidInput};

use self::metrics::MetricsCache;
use self::summarizer::SummaryGenerator;
use self::summary::{GeneratorStrategy, SummaryChain, SummaryRequest};

/// Per-rebuild state shared by every worker thread
pub struct BuildContext {
    pub metrics: MetricsCache,
    pub summaries: SummaryChain,
    /// Generated summaries keyed by snippet hash, persisted in the build manifest
    pub summary_cache: Arc<Mutex<BTreeMap<String, String>>>,
}

impl BuildContext {
    pub fn new(
        config: &SummaryConfig,
        generator: Option<Arc<dyn SummaryGenerator>>,
        cached_summaries: BTreeMap<String, String>,
    ) -> Self {
        let summary_cache = Arc::new(Mutex::new(cached_summaries));
        let strategy = generator.map(|g| {
            GeneratorStrategy::new(
                g,
                config.timeout(),
                config.max_failures,
                config.max_snippet_chars,
                Arc::clone(&summary_cache),
            )
        });
        Self {
            metrics: MetricsCache::new(),
            summaries: SummaryChain::standard(strategy),
            summary_cache,
        }
    }

    /// Context with the generator tier disabled
    pub fn offline() -> Self {
        Self::new(&SummaryConfig::default(), None, BTreeMap::new())
    }

    pub fn cached_summaries(&self) -> BTreeMap<String, String> {
        self.summary_cache.lock().clone()
    }
}

/// Build the shard for one parsed file. Dependencies and calls carry
/// `External` status until resolution.
pub fn build_shard(parsed: &ParsedFile, content_hash: &str, ctx: &BuildContext) -> ModuleShard {
    let raw = &parsed.raw;
    let module_uid = parsed.module_uid.as_str();

    let inputs: Vec<UidInput> = raw
        .entities
        .iter()
        .map(|e| UidInput {
            parent: e.parent,
            path: &e.path,
            name: &e.name,
        })
        .collect();
    let uids = assign_entity_uids(module_uid, &inputs);
    let path_tags = tags::path_tags(&parsed.rel_path);

    let mut entities: Vec<Entity> = raw
        .entities
        .iter()
        .zip(&uids)
        .map(|(e, uid)| {
            let parameters = e.parameters.len() as u32;
            let metrics = ctx.metrics.get_or_compute(&e.snippet, &e.metric_input, parameters);
            let summary = ctx.summaries.summarize(&SummaryRequest {
                uid,
                kind: e.kind,
                name: &e.name,
                docstring: e.docstring.as_deref(),
                snippet: Some(&e.snippet),
                parameters: e.parameters.len(),
                members: (0, 0, 0),
            });
            Entity {
                uid: uid.clone(),
                legacy_id: legacy_id(uid),
                uid_components: uid_components(uid),
                name: e.name.clone(),
                kind: e.kind,
                signature: e.signature.clone(),
                lines: e.lines,
                summary,
                metrics,
                tags: tags::entity_tags(e, &path_tags),
                children: Vec::new(),
                tested_by: Vec::new(),
            }
        })
        .collect();

    let mut children: Vec<String> = Vec::new();
    for (i, e) in raw.entities.iter().enumerate() {
        match e.parent {
            Some(p) if p < entities.len() && p != i => {
                let child = uids[i].clone();
                entities[p].children.push(child);
            }
            _ => children.push(uids[i].clone()),
        }
    }

    let calls = raw
        .calls
        .iter()
        .map(|c| CallEdge {
            caller_uid: c
                .caller
                .and_then(|i| uids.get(i).cloned())
                .unwrap_or_else(|| module_uid.to_string()),
            callee: c.callee.clone(),
            callee_uid: None,
            status: LinkStatus::External,
        })
        .collect();

    let mut dependencies: Vec<Dependency> = Vec::new();
    let mut seen_targets = BTreeSet::new();
    let mut bindings = BTreeMap::new();
    for import in &raw.imports {
        if seen_targets.insert(import.target.clone()) {
            dependencies.push(Dependency {
                target: import.target.clone(),
                uid: None,
                status: LinkStatus::External,
                relative: import.relative,
            });
        }
        for (local, target) in &import.bindings {
            bindings.insert(local.clone(), target.clone());
        }
    }

    let entity_metrics: Vec<(EntityKind, _)> = entities.iter().map(|e| (e.kind, e.metrics)).collect();
    let module_metrics = metrics::module_metrics(&raw.module_metrics, &entity_metrics);
    let module_tags = tags::module_tags(
        &path_tags,
        raw.lang,
        parsed.is_package,
        entities.iter().map(|e| &e.tags),
    );
    let module_summary = ctx.summaries.summarize(&SummaryRequest {
        uid: module_uid,
        kind: EntityKind::Module,
        name: module_uid.rsplit('.').next().unwrap_or(module_uid),
        docstring: raw.module_docstring.as_deref(),
        snippet: None,
        parameters: 0,
        members: (module_metrics.classes, module_metrics.functions, module_metrics.methods),
    });

    ModuleShard {
        schema_version: SCHEMA_VERSION.to_string(),
        uid: module_uid.to_string(),
        legacy_id: legacy_id(module_uid),
        file_path: parsed.rel_path.clone(),
        language: raw.lang,
        content_hash: content_hash.to_string(),
        tags: module_tags,
        summary: module_summary,
        metrics: module_metrics,
        bindings,
        dependencies,
        children,
        entities,
        calls,
    }
}
