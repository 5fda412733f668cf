//! Deterministic hierarchical identifiers
//!
//! A module uid is derived from the file path alone; an entity uid appends
//! the nesting chain of names inside that file. Both are pure functions of
//! their input, so parallel parsing yields the same uids in any order.

use std::collections::HashMap;

use crate::lang::Lang;
use crate::schema::fnv1a_hash;

/// Uid of a package-init file sitting directly in a source root
pub const ROOT_MODULE_UID: &str = "__root__";

/// Component inserted between a function and definitions nested in its body
pub const LOCAL_MARKER: &str = "<local>";

// ============================================================================
// Module uids
// ============================================================================

/// Module uid of a project-relative path (`src/pkg/util.py` -> `pkg.util`)
pub fn module_uid(rel_path: &str, roots: &[String]) -> String {
    module_uid_with(rel_path, roots, None)
}

/// Like [`module_uid`], with the language to assume when the last component
/// carries no recognized extension (import specifiers such as `./util`)
pub fn module_uid_with(rel_path: &str, roots: &[String], fallback: Option<Lang>) -> String {
    let normalized = rel_path.replace('\\', "/");
    let mut parts: Vec<&str> = normalized
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    for root in roots {
        let root_parts: Vec<&str> = root.split('/').filter(|p| !p.is_empty()).collect();
        if !root_parts.is_empty() && parts.len() > root_parts.len() && parts.starts_with(&root_parts) {
            parts.drain(..root_parts.len());
            break;
        }
    }

    let Some(last) = parts.pop() else {
        return ROOT_MODULE_UID.to_string();
    };
    let (stem, lang) = split_extension(last, fallback);
    let is_init = lang.map(|l| l.is_init_stem(stem)).unwrap_or(false);

    let mut components: Vec<String> = parts.iter().map(|p| sanitize_component(p)).collect();
    if !is_init {
        components.push(sanitize_component(stem));
    }
    if components.is_empty() {
        ROOT_MODULE_UID.to_string()
    } else {
        components.join(".")
    }
}

fn split_extension(file_name: &str, fallback: Option<Lang>) -> (&str, Option<Lang>) {
    if let Some((stem, ext)) = file_name.rsplit_once('.') {
        if let Some(lang) = Lang::from_extension(ext) {
            if !stem.is_empty() {
                return (stem, Some(lang));
            }
        }
    }
    (file_name, fallback)
}

/// Dots inside a single path component would read as nesting
fn sanitize_component(part: &str) -> String {
    part.replace(|c| c == '.' || c == '#', "_")
}

/// Whether the file is a package-init file (`__init__.py`, `index.ts`, `mod.rs`)
pub fn is_package_file(rel_path: &str) -> bool {
    let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    match split_extension(file_name, None) {
        (stem, Some(lang)) => lang.is_init_stem(stem),
        _ => false,
    }
}

/// Dotted components of a uid, `__root__` counting as none
fn module_parts(uid: &str) -> Vec<&str> {
    if uid == ROOT_MODULE_UID || uid.is_empty() {
        Vec::new()
    } else {
        uid.split('.').collect()
    }
}

fn from_parts(parts: &[&str]) -> String {
    if parts.is_empty() {
        ROOT_MODULE_UID.to_string()
    } else {
        parts.join(".")
    }
}

/// Target of a Python relative import: `level` leading dots counted from the
/// importing module, then the optional dotted `rest`
pub fn python_relative_target(module_uid: &str, is_package: bool, level: usize, rest: Option<&str>) -> String {
    let mut base = module_parts(module_uid);
    if !is_package {
        base.pop();
    }
    for _ in 1..level {
        base.pop();
    }
    if let Some(rest) = rest.filter(|r| !r.is_empty()) {
        base.extend(rest.split('.'));
    }
    from_parts(&base)
}

/// Parent module of a module uid (`a.b` -> `a`, `a` -> `__root__`)
pub fn parent_module(uid: &str) -> String {
    let mut parts = module_parts(uid);
    parts.pop();
    from_parts(&parts)
}

/// Append dotted components to a module uid, treating `__root__` as empty
pub fn join_module(base: &str, rest: &str) -> String {
    let mut parts = module_parts(base);
    parts.extend(rest.split('.').filter(|p| !p.is_empty()));
    from_parts(&parts)
}

// ============================================================================
// Entity uids
// ============================================================================

/// Location of one entity inside its file, as needed for uid assignment
#[derive(Debug, Clone, Copy)]
pub struct UidInput<'a> {
    /// Index of the enclosing entity in the same list
    pub parent: Option<usize>,
    /// Namespace components between parent (or module) and the entity
    pub path: &'a [String],
    pub name: &'a str,
}

/// Assign uids to the entities of one module. Entities sharing a base uid
/// are numbered `#2`, `#3`, ... in list (source) order.
pub fn assign_entity_uids(module_uid: &str, entities: &[UidInput]) -> Vec<String> {
    let mut assigned: Vec<Option<String>> = vec![None; entities.len()];
    let mut seen: HashMap<String, usize> = HashMap::new();
    for i in 0..entities.len() {
        resolve_uid(i, module_uid, entities, &mut assigned, &mut seen, 0);
    }
    assigned.into_iter().map(Option::unwrap_or_default).collect()
}

fn resolve_uid(
    i: usize,
    module_uid: &str,
    entities: &[UidInput],
    assigned: &mut Vec<Option<String>>,
    seen: &mut HashMap<String, usize>,
    depth: usize,
) -> String {
    if let Some(uid) = &assigned[i] {
        return uid.clone();
    }
    let entity = entities[i];
    let prefix = match entity.parent {
        // depth guard keeps a malformed parent cycle from recursing forever
        Some(p) if p < entities.len() && p != i && depth < entities.len() => {
            resolve_uid(p, module_uid, entities, assigned, seen, depth + 1)
        }
        _ => module_uid.to_string(),
    };

    let mut base = prefix;
    for component in entity.path {
        base.push('.');
        base.push_str(component);
    }
    base.push('.');
    base.push_str(entity.name);

    let count = seen.entry(base.clone()).or_insert(0);
    *count += 1;
    let uid = with_ordinal(&base, *count);
    assigned[i] = Some(uid.clone());
    uid
}

/// Ordered prefix chain of a uid: `a.b.C.m` -> `a`, `a.b`, `a.b.C`, `a.b.C.m`.
/// Dots inside `<...>` markers do not split.
pub fn uid_components(uid: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut depth = 0usize;
    for (i, ch) in uid.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => components.push(uid[..i].to_string()),
            _ => {}
        }
    }
    if !uid.is_empty() {
        components.push(uid.to_string());
    }
    components
}

/// Fixed-length key derived from the uid alone
pub fn legacy_id(uid: &str) -> String {
    format!("{:016x}", fnv1a_hash(uid))
}

/// Whether `uid` names `module_uid` itself or something defined inside it
pub fn is_within(uid: &str, module_uid: &str) -> bool {
    uid == module_uid
        || (uid.len() > module_uid.len()
            && uid.starts_with(module_uid)
            && uid.as_bytes()[module_uid.len()] == b'.')
}

/// Split a trailing `#n` ordinal: `a.f#3` -> (`a.f`, 3). Uids without one
/// are the first of their name.
pub fn split_ordinal(uid: &str) -> (&str, usize) {
    if let Some((base, n)) = uid.rsplit_once('#') {
        if let Ok(n) = n.parse::<usize>() {
            if n >= 2 && !base.is_empty() {
                return (base, n);
            }
        }
    }
    (uid, 1)
}

/// Inverse of [`split_ordinal`]
pub fn with_ordinal(base: &str, n: usize) -> String {
    if n <= 1 {
        base.to_string()
    } else {
        format!("{}#{}", base, n)
    }
}

/// File-system safe stem of a module's shard name
pub fn shard_stem(module_uid: &str) -> String {
    module_uid
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
