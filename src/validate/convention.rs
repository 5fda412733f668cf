//! Convention and documentation checks
//!
//! Both only produce warnings: naming per language, size thresholds from
//! [`ValidationConfig`], and missing documentation on public surface.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Check, Finding, Location, Snapshot};
use crate::config::ValidationConfig;
use crate::enrich::tags::PUBLIC;
use crate::lang::Lang;
use crate::schema::{Entity, EntityKind, ModuleShard, SummarySource};
use crate::uid::LOCAL_MARKER;

// ============================================================================
// Naming rules
// ============================================================================

static PASCAL_CASE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^_*[A-Z][A-Za-z0-9]*$").ok());

static SNAKE_CASE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^_*[a-z][a-z0-9_]*$").ok());

static DUNDER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^__[a-z][a-z0-9_]*__$").ok());

static CAMEL_CASE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[_$]*[a-z][A-Za-z0-9]*$").ok());

fn matches(rule: &Lazy<Option<Regex>>, name: &str) -> bool {
    rule.as_ref().map(|re| re.is_match(name)).unwrap_or(true)
}

/// Expected style for `kind` in `lang`, or `None` when the name is fine
fn naming_violation(lang: Lang, kind: EntityKind, name: &str) -> Option<&'static str> {
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_' || c == '$') {
        return None;
    }
    match (lang, kind) {
        (_, EntityKind::Module) => None,
        (Lang::Python, EntityKind::Class) | (Lang::Rust, EntityKind::Class) => {
            (!matches(&PASCAL_CASE, name)).then_some("PascalCase")
        }
        (Lang::Python, _) => {
            (!matches(&SNAKE_CASE, name) && !matches(&DUNDER, name)).then_some("snake_case")
        }
        (Lang::Rust, _) => (!matches(&SNAKE_CASE, name)).then_some("snake_case"),
        (_, EntityKind::Class) => (!matches(&PASCAL_CASE, name)).then_some("PascalCase"),
        // functions may also be component-style constructors
        (_, _) => (!matches(&CAMEL_CASE, name) && !matches(&PASCAL_CASE, name)).then_some("camelCase"),
    }
}

// ============================================================================
// Checks
// ============================================================================

pub fn check(snapshot: &Snapshot, config: &ValidationConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for doc in snapshot.shards.values() {
        let Some(shard) = &doc.parsed else {
            continue;
        };
        for (i, entity) in shard.entities.iter().enumerate() {
            let at = |field: &str| {
                Location::file(doc.rel_path.clone())
                    .at(format!("/entities/{}/{}", i, field))
                    .uid(entity.uid.clone())
            };
            if let Some(style) = naming_violation(shard.language, entity.kind, &entity.name) {
                findings.push(Finding::warning(
                    Check::Convention,
                    at("name"),
                    format!(
                        "{} {} should be {} in {}",
                        entity.kind.as_str(),
                        entity.name,
                        style,
                        shard.language.name()
                    ),
                ));
            }
            if !entity.kind.is_callable() {
                continue;
            }
            let metrics = &entity.metrics;
            let limits = [
                ("loc", metrics.loc, config.max_function_loc, "lines"),
                ("parameters", metrics.parameters, config.max_parameters, "parameters"),
                ("complexity", metrics.complexity, config.max_complexity, "complexity"),
            ];
            for (field, value, limit, noun) in limits {
                if value > limit {
                    findings.push(Finding::warning(
                        Check::Convention,
                        at(&format!("metrics/{}", field)),
                        format!("{} has {} {} (limit {})", entity.uid, value, noun, limit),
                    ));
                }
            }
        }
    }
    findings
}

/// Public surface without a docstring
pub fn check_documentation(snapshot: &Snapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    for doc in snapshot.shards.values() {
        let Some(shard) = &doc.parsed else {
            continue;
        };
        if !module_documented(shard) {
            findings.push(Finding::warning(
                Check::Documentation,
                Location::file(doc.rel_path.clone())
                    .at("/summary")
                    .uid(shard.uid.clone()),
                format!("module {} has no docstring", shard.uid),
            ));
        }
        for (i, entity) in shard.entities.iter().enumerate() {
            if needs_documentation(entity) && entity.summary.source == SummarySource::Heuristic {
                findings.push(Finding::warning(
                    Check::Documentation,
                    Location::file(doc.rel_path.clone())
                        .at(format!("/entities/{}/summary", i))
                        .uid(entity.uid.clone()),
                    format!("public {} {} has no docstring", entity.kind.as_str(), entity.uid),
                ));
            }
        }
    }
    findings
}

fn module_documented(shard: &ModuleShard) -> bool {
    shard.summary.source != SummarySource::Heuristic || shard.entities.is_empty()
}

fn needs_documentation(entity: &Entity) -> bool {
    entity.tags.contains(PUBLIC) && !entity.uid.contains(LOCAL_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_naming() {
        assert_eq!(naming_violation(Lang::Python, EntityKind::Class, "UserAccount"), None);
        assert_eq!(naming_violation(Lang::Python, EntityKind::Class, "user_account"), Some("PascalCase"));
        assert_eq!(naming_violation(Lang::Python, EntityKind::Method, "__init__"), None);
        assert_eq!(naming_violation(Lang::Python, EntityKind::Function, "_private_helper"), None);
        assert_eq!(naming_violation(Lang::Python, EntityKind::Function, "loadData"), Some("snake_case"));
    }

    #[test]
    fn test_javascript_and_rust_naming() {
        assert_eq!(naming_violation(Lang::TypeScript, EntityKind::Function, "loadData"), None);
        assert_eq!(naming_violation(Lang::Tsx, EntityKind::Function, "UserCard"), None);
        assert_eq!(naming_violation(Lang::JavaScript, EntityKind::Function, "load_data"), Some("camelCase"));
        assert_eq!(naming_violation(Lang::Rust, EntityKind::Function, "load_data"), None);
        assert_eq!(naming_violation(Lang::Rust, EntityKind::Class, "load_data"), Some("PascalCase"));
    }

    #[test]
    fn test_anonymous_names_are_skipped() {
        assert_eq!(naming_violation(Lang::JavaScript, EntityKind::Function, "<anonymous>"), None);
    }
}
