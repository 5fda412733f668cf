//! Rule-based tag inference from file paths, names, visibility,
//! decorators and declaration modifiers.

use std::collections::BTreeSet;

use crate::detectors::RawEntity;
use crate::lang::Lang;
use crate::schema::EntityKind;
use crate::uid::LOCAL_MARKER;

pub const TEST: &str = "test";
pub const PUBLIC: &str = "public";
pub const PRIVATE: &str = "private";

/// Directory names mapped to tags
const DIRECTORY_TAGS: &[(&str, &str)] = &[
    ("tests", TEST),
    ("test", TEST),
    ("__tests__", TEST),
    ("spec", TEST),
    ("examples", "example"),
    ("scripts", "script"),
    ("migrations", "migration"),
];

/// Decorator / attribute names mapped to tags (matched on the last path segment)
const DECORATOR_TAGS: &[(&str, &str)] = &[
    ("property", "property"),
    ("cached_property", "property"),
    ("staticmethod", "static"),
    ("classmethod", "classmethod"),
    ("abstractmethod", "abstract"),
    ("test", TEST),
    ("fixture", TEST),
];

/// Modifier keywords and declaration flavours that become tags as-is
const MODIFIER_TAGS: &[&str] = &[
    "async",
    "static",
    "abstract",
    "interface",
    "struct",
    "enum",
    "trait",
    "generator",
];

/// Tags implied by the file's location
pub fn path_tags(rel_path: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    let mut parts: Vec<&str> = rel_path.split('/').collect();
    let file_name = parts.pop().unwrap_or(rel_path);

    for dir in parts {
        for (name, tag) in DIRECTORY_TAGS {
            if dir == *name {
                tags.insert(tag.to_string());
            }
        }
    }

    let stem = file_name.split('.').next().unwrap_or(file_name);
    let is_test_file = stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem == "conftest"
        || file_name.contains(".test.")
        || file_name.contains(".spec.");
    if is_test_file {
        tags.insert(TEST.to_string());
    }
    tags
}

/// Tags of one entity. `path` holds the file's path tags.
pub fn entity_tags(raw: &RawEntity, path: &BTreeSet<String>) -> BTreeSet<String> {
    let mut tags = path.clone();
    let name = raw.name.as_str();

    match raw.kind {
        EntityKind::Class => {
            if name.starts_with("Test") || name.ends_with("Test") || name.ends_with("Tests") {
                tags.insert(TEST.to_string());
            }
            if name.ends_with("Error") || name.ends_with("Exception") {
                tags.insert("exception".to_string());
            }
        }
        _ => {
            let lower = name.to_lowercase();
            if lower.starts_with("test_") || lower == "test" || (name.starts_with("test") && name[4..].starts_with(char::is_uppercase)) {
                tags.insert(TEST.to_string());
            }
            if lower.starts_with("get_") || (name.starts_with("get") && name[3..].starts_with(char::is_uppercase)) {
                tags.insert("accessor".to_string());
            }
            if lower.starts_with("set_") || (name.starts_with("set") && name[3..].starts_with(char::is_uppercase)) {
                tags.insert("mutator".to_string());
            }
            if ["is_", "has_"].iter().any(|p| lower.starts_with(p))
                || (name.starts_with("is") && name[2..].starts_with(char::is_uppercase))
                || (name.starts_with("has") && name[3..].starts_with(char::is_uppercase))
            {
                tags.insert("predicate".to_string());
            }
            if is_constructor(raw) {
                tags.insert("constructor".to_string());
            }
            if name == "main" {
                tags.insert("entrypoint".to_string());
            }
            if raw.path.iter().any(|p| p == LOCAL_MARKER) {
                tags.insert("closure".to_string());
            }
        }
    }

    tags.insert(if raw.exported { PUBLIC } else { PRIVATE }.to_string());

    for decorator in &raw.decorators {
        let last = decorator.rsplit(['.', ':']).next().unwrap_or(decorator);
        for (name, tag) in DECORATOR_TAGS {
            if last == *name {
                tags.insert(tag.to_string());
            }
        }
        if decorator.starts_with("pytest.") {
            tags.insert(TEST.to_string());
        }
    }

    for modifier in &raw.modifiers {
        if MODIFIER_TAGS.contains(&modifier.as_str()) {
            tags.insert(modifier.clone());
        }
    }
    tags
}

fn is_constructor(raw: &RawEntity) -> bool {
    match raw.kind {
        EntityKind::Method => matches!(raw.name.as_str(), "__init__" | "__new__" | "constructor" | "new"),
        _ => false,
    }
}

/// Module tags: path tags, language, package marker and the entity tags
/// (visibility excluded)
pub fn module_tags<'a>(
    path: &BTreeSet<String>,
    lang: Lang,
    is_package: bool,
    entity_tags: impl IntoIterator<Item = &'a BTreeSet<String>>,
) -> BTreeSet<String> {
    let mut tags = path.clone();
    tags.insert(format!("lang:{}", lang.name()));
    if is_package {
        tags.insert("package".to_string());
    }
    for set in entity_tags {
        tags.extend(
            set.iter()
                .filter(|t| t.as_str() != PUBLIC && t.as_str() != PRIVATE)
                .cloned(),
        );
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::MetricInput;
    use crate::schema::LineSpan;

    fn entity(kind: EntityKind, name: &str) -> RawEntity {
        RawEntity {
            kind,
            name: name.to_string(),
            parent: None,
            path: Vec::new(),
            lines: LineSpan { start: 1, end: 1 },
            signature: String::new(),
            parameters: Vec::new(),
            docstring: None,
            decorators: Vec::new(),
            modifiers: BTreeSet::new(),
            exported: true,
            impl_target: None,
            metric_input: MetricInput::default(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_path_tags() {
        assert!(path_tags("tests/test_api.py").contains(TEST));
        assert!(path_tags("src/api.test.ts").contains(TEST));
        assert!(path_tags("pkg/api_test.py").contains(TEST));
        assert!(path_tags("examples/demo.py").contains("example"));
        assert!(path_tags("db/migrations/0001.py").contains("migration"));
        assert!(path_tags("src/testing.py").is_empty());
    }

    #[test]
    fn test_naming_rules() {
        let none = BTreeSet::new();
        assert!(entity_tags(&entity(EntityKind::Function, "get_user"), &none).contains("accessor"));
        assert!(entity_tags(&entity(EntityKind::Function, "setName"), &none).contains("mutator"));
        assert!(entity_tags(&entity(EntityKind::Function, "is_ready"), &none).contains("predicate"));
        assert!(entity_tags(&entity(EntityKind::Function, "test_login"), &none).contains(TEST));
        assert!(entity_tags(&entity(EntityKind::Method, "__init__"), &none).contains("constructor"));
        assert!(entity_tags(&entity(EntityKind::Function, "main"), &none).contains("entrypoint"));
        assert!(entity_tags(&entity(EntityKind::Class, "ParseError"), &none).contains("exception"));
        assert!(!entity_tags(&entity(EntityKind::Function, "settle"), &none).contains("mutator"));
        assert!(!entity_tags(&entity(EntityKind::Function, "island"), &none).contains("predicate"));
    }

    #[test]
    fn test_visibility_decorators_and_modifiers() {
        let mut e = entity(EntityKind::Method, "name");
        e.exported = false;
        e.decorators = vec!["property".into(), "tokio::test".into()];
        e.modifiers.insert("async".into());
        e.path = vec![LOCAL_MARKER.to_string()];
        let tags = entity_tags(&e, &BTreeSet::new());
        for expected in [PRIVATE, "property", TEST, "async", "closure"] {
            assert!(tags.contains(expected), "missing {}", expected);
        }
        assert!(!tags.contains(PUBLIC));
    }

    #[test]
    fn test_module_tags_drop_visibility() {
        let entity_set: BTreeSet<String> = [PUBLIC.to_string(), "async".to_string()].into_iter().collect();
        let tags = module_tags(&BTreeSet::new(), Lang::Python, true, [&entity_set]);
        assert!(tags.contains("lang:python"));
        assert!(tags.contains("package"));
        assert!(tags.contains("async"));
        assert!(!tags.contains(PUBLIC));
    }
}
