//! Link resolution over the merged module set
//!
//! Runs after every shard of a rebuild is known (freshly built or reused).
//! Each dependency and call edge ends up `resolved` (target exists now),
//! `unresolved` (internal target that is gone; its last known uid is kept)
//! or `external` (outside the project). Nothing is ever dropped.

use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};

use crate::enrich::tags::TEST;
use crate::lang::Lang;
use crate::schema::{EntityKind, IndexFile, LinkStatus, ModuleShard};
use crate::uid::{
    is_within, join_module, legacy_id, parent_module, split_ordinal, uid_components, with_ordinal, LOCAL_MARKER,
    ROOT_MODULE_UID,
};

/// Receivers that refer to the enclosing class
const RECEIVERS: &[&str] = &["self", "this", "Self", "cls"];

/// Uids known from the previous index, used to tell "deleted internal"
/// targets apart from external ones
#[derive(Debug, Clone, Default)]
pub struct History {
    pub modules: BTreeSet<String>,
    pub entities: BTreeSet<String>,
    /// Uids the previous index already listed as unresolved
    pub dangling: BTreeSet<String>,
}

impl History {
    pub fn from_index(index: &IndexFile) -> Self {
        let mut history = Self::default();
        for entry in index.modules.values() {
            history.modules.insert(entry.uid.clone());
            history.entities.extend(entry.entities.iter().cloned());
            // targets that were already dangling stay internal, module or not
            for uid in &entry.unresolved {
                history.dangling.insert(uid.clone());
            }
        }
        history
    }

    fn knows(&self, uid: &str) -> bool {
        self.modules.contains(uid) || self.entities.contains(uid) || self.dangling.contains(uid)
    }
}

/// Lookup tables over the current module set
struct Universe {
    modules: AHashSet<String>,
    entities: AHashMap<String, EntityKind>,
    /// child entity uid -> parent entity uid
    parents: AHashMap<String, String>,
}

impl Universe {
    fn new(shards: &BTreeMap<String, ModuleShard>) -> Self {
        let mut universe = Self {
            modules: shards.keys().cloned().collect(),
            entities: AHashMap::new(),
            parents: AHashMap::new(),
        };
        for shard in shards.values() {
            for entity in &shard.entities {
                universe.entities.insert(entity.uid.clone(), entity.kind);
                for child in &entity.children {
                    universe.parents.insert(child.clone(), entity.uid.clone());
                }
            }
        }
        universe
    }

    fn exists(&self, uid: &str) -> bool {
        self.modules.contains(uid) || self.entities.contains_key(uid)
    }

    /// Longest dotted prefix of `target` that is a current module
    fn module_prefix(&self, target: &str) -> Option<String> {
        longest_prefix(target, |p| self.modules.contains(p))
    }

    /// Nearest class enclosing `uid` (the entity itself counts)
    fn enclosing_class(&self, uid: &str) -> Option<String> {
        let mut current = Some(uid.to_string());
        while let Some(u) = current {
            if self.entities.get(&u) == Some(&EntityKind::Class) {
                return Some(u);
            }
            current = self.parents.get(&u).cloned();
        }
        None
    }
}

fn longest_prefix(target: &str, accept: impl Fn(&str) -> bool) -> Option<String> {
    let mut candidate = target;
    loop {
        if accept(candidate) {
            return Some(candidate.to_string());
        }
        match candidate.rfind('.') {
            Some(i) => candidate = &candidate[..i],
            None => return None,
        }
    }
}

// ============================================================================
// Entity uids shadowed by modules
// ============================================================================

/// Move entity uids that equal a module uid (`def util()` in
/// `pkg/__init__.py` next to `pkg/util.py`) to the next free ordinal, along
/// with everything nested under them. The module keeps the plain uid.
/// Returns the number of entities renamed.
pub fn separate_entity_uids(shards: &mut BTreeMap<String, ModuleShard>) -> usize {
    let modules: BTreeSet<String> = shards.keys().cloned().collect();
    let renamed: usize = shards.values_mut().map(|shard| separate_shard(shard, &modules)).sum();
    if renamed > 0 {
        tracing::debug!("Renamed {} entities shadowed by module uids", renamed);
    }
    renamed
}

/// Whether a previously written shard has to be rebuilt because the module
/// set it was separated against no longer matches `modules`
pub fn separation_is_stale(shard: &ModuleShard, modules: &BTreeSet<String>) -> bool {
    let uids: BTreeSet<&str> = shard.entities.iter().map(|e| e.uid.as_str()).collect();
    uids.iter().any(|uid| {
        let (base, n) = split_ordinal(uid);
        // a numbered uid without its first sibling was moved off a module uid
        modules.contains(*uid) || (n > 1 && !uids.contains(base))
    })
}

fn separate_shard(shard: &mut ModuleShard, modules: &BTreeSet<String>) -> usize {
    let mut renamed = 0;
    loop {
        // shallowest first, so nested uids are checked under their final prefix
        let clash = shard
            .entities
            .iter()
            .map(|e| e.uid.as_str())
            .filter(|uid| modules.contains(*uid))
            .min_by_key(|uid| (uid_components(uid).len(), *uid))
            .map(str::to_string);
        let Some(clash) = clash else {
            break;
        };

        let mut ordinals: Vec<usize> = shard
            .entities
            .iter()
            .filter_map(|e| {
                let (base, n) = split_ordinal(&e.uid);
                (base == clash).then_some(n)
            })
            .collect();
        ordinals.sort_unstable_by(|a, b| b.cmp(a));
        for n in ordinals {
            renamed += rename_subtree(shard, &with_ordinal(&clash, n), &with_ordinal(&clash, n + 1));
        }
    }
    if renamed > 0 {
        for entity in &mut shard.entities {
            entity.uid_components = uid_components(&entity.uid);
            entity.legacy_id = legacy_id(&entity.uid);
        }
    }
    renamed
}

/// Replace the `from` prefix with `to` on every uid within `from`
fn rename_subtree(shard: &mut ModuleShard, from: &str, to: &str) -> usize {
    let moved = |uid: &mut String| -> bool {
        if is_within(uid, from) {
            *uid = format!("{}{}", to, &uid[from.len()..]);
            true
        } else {
            false
        }
    };
    let mut count = 0;
    for entity in &mut shard.entities {
        if moved(&mut entity.uid) {
            count += 1;
        }
        entity.children.iter_mut().for_each(|c| {
            moved(c);
        });
    }
    shard.children.iter_mut().for_each(|c| {
        moved(c);
    });
    for call in &mut shard.calls {
        moved(&mut call.caller_uid);
    }
    count
}

// ============================================================================
// Link resolution
// ============================================================================

/// Resolve every link of every shard in place and recompute `tested_by`
pub fn resolve_links(shards: &mut BTreeMap<String, ModuleShard>, history: &History) {
    let universe = Universe::new(shards);
    let test_callers: AHashSet<String> = shards
        .values()
        .flat_map(|s| {
            let module = s.tags.contains(TEST).then(|| s.uid.clone());
            module.into_iter().chain(
                s.entities
                    .iter()
                    .filter(|e| e.tags.contains(TEST))
                    .map(|e| e.uid.clone()),
            )
        })
        .collect();

    let mut tested_by: AHashMap<String, BTreeSet<String>> = AHashMap::new();
    let mut unresolved_total = 0usize;

    for shard in shards.values_mut() {
        let relative_targets: Vec<String> = shard
            .dependencies
            .iter()
            .filter(|d| d.relative)
            .map(|d| d.target.clone())
            .collect();

        for dep in &mut shard.dependencies {
            let (status, uid) = resolve_dependency(&dep.target, dep.relative, &universe, history);
            dep.status = status;
            dep.uid = uid;
            if status == LinkStatus::Unresolved {
                unresolved_total += 1;
            }
        }

        for call in &mut shard.calls {
            let candidates = call_candidates(
                &call.callee,
                &call.caller_uid,
                &shard.uid,
                shard.language,
                &shard.bindings,
                &relative_targets,
                &universe,
            );
            let (status, uid) = settle_call(&candidates, &universe, history);
            call.status = status;
            call.callee_uid = uid;
            match status {
                LinkStatus::Resolved => {
                    if let Some(callee) = &call.callee_uid {
                        if test_callers.contains(&call.caller_uid) && universe.entities.contains_key(callee) {
                            tested_by
                                .entry(callee.clone())
                                .or_default()
                                .insert(call.caller_uid.clone());
                        }
                    }
                }
                LinkStatus::Unresolved => unresolved_total += 1,
                LinkStatus::External => {}
            }
        }
    }

    for shard in shards.values_mut() {
        for entity in &mut shard.entities {
            entity.tested_by = tested_by
                .get(&entity.uid)
                .map(|set| set.iter().filter(|c| **c != entity.uid).cloned().collect())
                .unwrap_or_default();
        }
    }

    tracing::debug!(
        "Resolved links across {} modules ({} unresolved)",
        shards.len(),
        unresolved_total
    );
}

fn resolve_dependency(
    target: &str,
    relative: bool,
    universe: &Universe,
    history: &History,
) -> (LinkStatus, Option<String>) {
    if let Some(module) = universe.module_prefix(target) {
        return (LinkStatus::Resolved, Some(module));
    }
    if let Some(previous) = longest_prefix(target, |p| history.modules.contains(p) || history.dangling.contains(p)) {
        return (LinkStatus::Unresolved, Some(previous));
    }
    if relative {
        return (LinkStatus::Unresolved, Some(target.to_string()));
    }
    (LinkStatus::External, None)
}

/// A uid the callee may stand for, and whether it is internal by syntax
/// (receiver, relative binding, crate path)
struct Candidate {
    uid: String,
    internal: bool,
}

fn call_candidates(
    callee: &str,
    caller_uid: &str,
    module_uid: &str,
    lang: Lang,
    bindings: &BTreeMap<String, String>,
    relative_targets: &[String],
    universe: &Universe,
) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::new();
    let (head, rest) = match callee.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (callee, None),
    };
    let join = |base: &str| match rest {
        Some(r) => format!("{}.{}", base, r),
        None => base.to_string(),
    };

    if RECEIVERS.contains(&head) {
        if let (Some(class), Some(rest)) = (universe.enclosing_class(caller_uid), rest) {
            out.push(Candidate {
                uid: format!("{}.{}", class, rest),
                // inherited members make a miss here inconclusive
                internal: false,
            });
        }
        // `self::f` in Rust names the current module
        if lang == Lang::Rust && head == "self" {
            out.push(Candidate {
                uid: join_module(module_uid, rest.unwrap_or("")),
                internal: true,
            });
        }
        return out;
    }

    if lang == Lang::Rust {
        match head {
            "crate" => {
                out.push(Candidate {
                    uid: join_module(ROOT_MODULE_UID, rest.unwrap_or("")),
                    internal: true,
                });
                return out;
            }
            "super" => {
                out.push(Candidate {
                    uid: join_module(&parent_module(module_uid), rest.unwrap_or("")),
                    internal: true,
                });
                return out;
            }
            _ => {}
        }
    }

    // definitions local to the caller or one of its enclosing functions
    if rest.is_none() {
        let mut scope = Some(caller_uid.to_string());
        while let Some(s) = scope {
            if s == module_uid {
                break;
            }
            if universe.entities.get(&s).map(|k| k.is_callable()).unwrap_or(false) {
                out.push(Candidate {
                    uid: format!("{}.{}.{}", s, LOCAL_MARKER, callee),
                    internal: false,
                });
            }
            scope = universe.parents.get(&s).cloned();
        }
    }

    if let Some(bound) = bindings.get(head) {
        let uid = join(bound);
        let internal = relative_targets
            .iter()
            .any(|t| uid == *t || uid.starts_with(&format!("{}.", t)));
        out.push(Candidate { uid, internal });
    }

    out.push(Candidate {
        uid: join_module(module_uid, callee),
        internal: false,
    });
    out.push(Candidate {
        uid: callee.to_string(),
        internal: false,
    });
    out
}

fn settle_call(candidates: &[Candidate], universe: &Universe, history: &History) -> (LinkStatus, Option<String>) {
    if let Some(found) = candidates.iter().find(|c| universe.exists(&c.uid)) {
        return (LinkStatus::Resolved, Some(found.uid.clone()));
    }
    if let Some(known) = candidates.iter().find(|c| history.knows(&c.uid)) {
        return (LinkStatus::Unresolved, Some(known.uid.clone()));
    }
    if let Some(internal) = candidates.iter().find(|c| c.internal) {
        return (LinkStatus::Unresolved, Some(internal.uid.clone()));
    }
    (LinkStatus::External, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{build_shard, BuildContext};
    use crate::parsing::parse_source;

    fn shards(files: &[(&str, &str)]) -> BTreeMap<String, ModuleShard> {
        let ctx = BuildContext::offline();
        files
            .iter()
            .map(|(path, source)| {
                let parsed = parse_source(path, source.as_bytes(), &["src".to_string()]).unwrap();
                let shard = build_shard(&parsed, "h", &ctx);
                (shard.uid.clone(), shard)
            })
            .collect()
    }

    fn call<'a>(shard: &'a ModuleShard, caller: &str, callee: &str) -> &'a crate::schema::CallEdge {
        shard
            .calls
            .iter()
            .find(|c| c.caller_uid == caller && c.callee == callee)
            .unwrap()
    }

    #[test]
    fn test_imports_and_calls_resolve() {
        let mut set = shards(&[
            ("src/app/a.py", "from app.b import helper\nimport os\n\ndef run():\n    helper()\n    os.getcwd()\n    local()\n\ndef local():\n    pass\n"),
            ("src/app/b.py", "def helper():\n    pass\n"),
        ]);
        resolve_links(&mut set, &History::default());
        let a = &set["app.a"];

        assert_eq!(a.dependencies[0].status, LinkStatus::Resolved);
        assert_eq!(a.dependencies[0].uid.as_deref(), Some("app.b"));
        assert_eq!(a.dependencies[1].status, LinkStatus::External);

        let helper = call(a, "app.a.run", "helper");
        assert_eq!(helper.status, LinkStatus::Resolved);
        assert_eq!(helper.callee_uid.as_deref(), Some("app.b.helper"));
        assert_eq!(call(a, "app.a.run", "os.getcwd").status, LinkStatus::External);
        assert_eq!(call(a, "app.a.run", "local").callee_uid.as_deref(), Some("app.a.local"));
    }

    #[test]
    fn test_self_calls_and_local_functions() {
        let mut set = shards(&[(
            "m.py",
            "class Repo:\n    def save(self):\n        self.flush()\n        def inner():\n            pass\n        inner()\n\n    def flush(self):\n        pass\n",
        )]);
        resolve_links(&mut set, &History::default());
        let m = &set["m"];
        assert_eq!(call(m, "m.Repo.save", "self.flush").callee_uid.as_deref(), Some("m.Repo.flush"));
        assert_eq!(
            call(m, "m.Repo.save", "inner").callee_uid.as_deref(),
            Some("m.Repo.save.<local>.inner")
        );
    }

    #[test]
    fn test_deleted_module_marks_links_unresolved() {
        let files = [
            ("src/a.py", "from b import helper\n\ndef run():\n    helper()\n"),
            ("src/b.py", "def helper():\n    pass\n"),
        ];
        let mut before = shards(&files);
        resolve_links(&mut before, &History::default());

        let mut history = History::default();
        history.modules.extend(before.keys().cloned());
        history
            .entities
            .extend(before.values().flat_map(|s| s.entities.iter().map(|e| e.uid.clone())));

        let mut after = shards(&files[..1]);
        resolve_links(&mut after, &history);
        let a = &after["a"];
        assert_eq!(a.dependencies[0].status, LinkStatus::Unresolved);
        assert_eq!(a.dependencies[0].uid.as_deref(), Some("b"));
        let helper = call(a, "a.run", "helper");
        assert_eq!(helper.status, LinkStatus::Unresolved);
        assert_eq!(helper.callee_uid.as_deref(), Some("b.helper"));
    }

    #[test]
    fn test_previously_dangling_module_stays_unresolved() {
        let mut set = shards(&[("src/a.py", "from b import helper\n\ndef run():\n    helper()\n")]);
        let mut history = History::default();
        history.dangling.extend(["b".to_string(), "b.helper".to_string()]);
        resolve_links(&mut set, &history);
        let a = &set["a"];
        assert_eq!(a.dependencies[0].status, LinkStatus::Unresolved);
        assert_eq!(a.dependencies[0].uid.as_deref(), Some("b"));
        assert_eq!(call(a, "a.run", "helper").status, LinkStatus::Unresolved);
    }

    #[test]
    fn test_entity_shadowed_by_module_moves_to_next_ordinal() {
        let mut set = shards(&[
            (
                "src/pkg/__init__.py",
                "def util():\n    def inner():\n        pass\n    inner()\n\ndef util():\n    pass\n",
            ),
            ("src/pkg/util.py", "def helper():\n    pass\n"),
        ]);
        assert_eq!(separate_entity_uids(&mut set), 3);
        let pkg = &set["pkg"];
        let uids: BTreeSet<&str> = pkg.entities.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, BTreeSet::from(["pkg.util#2", "pkg.util#2.<local>.inner", "pkg.util#3"]));
        assert!(pkg.calls.iter().all(|c| c.caller_uid != "pkg.util"));
        assert_eq!(pkg.children, vec!["pkg.util#2", "pkg.util#3"]);
        let first = pkg.entity("pkg.util#2").unwrap();
        assert_eq!(first.legacy_id, legacy_id("pkg.util#2"));
        assert_eq!(first.uid_components, uid_components("pkg.util#2"));
        assert_eq!(first.children, vec!["pkg.util#2.<local>.inner"]);

        let modules: BTreeSet<String> = set.keys().cloned().collect();
        assert!(!separation_is_stale(pkg, &modules));
        assert!(separation_is_stale(pkg, &BTreeSet::from(["pkg".to_string()])));
        // running again changes nothing
        assert_eq!(separate_entity_uids(&mut set), 0);
    }

    #[test]
    fn test_relative_import_of_missing_module_is_unresolved() {
        let mut set = shards(&[("src/pkg/a.py", "from .gone import thing\n")]);
        resolve_links(&mut set, &History::default());
        let dep = &set["pkg.a"].dependencies[0];
        assert_eq!(dep.status, LinkStatus::Unresolved);
        assert_eq!(dep.uid.as_deref(), Some("pkg.gone.thing"));
    }

    #[test]
    fn test_tested_by_comes_from_test_callers() {
        let mut set = shards(&[
            ("src/calc.py", "def add(a, b):\n    return a + b\n"),
            ("tests/test_calc.py", "from calc import add\n\ndef test_add():\n    assert add(1, 2) == 3\n"),
        ]);
        resolve_links(&mut set, &History::default());
        let add = set["calc"].entity("calc.add").unwrap();
        assert_eq!(add.tested_by, vec!["tests.test_calc.test_add"]);
    }

    #[test]
    fn test_rust_crate_paths() {
        let mut set = shards(&[
            ("src/lib.rs", "mod util;\n\npub fn run() {\n    crate::util::load();\n}\n"),
            ("src/util.rs", "pub fn load() {}\n"),
        ]);
        resolve_links(&mut set, &History::default());
        let root = &set[ROOT_MODULE_UID];
        assert_eq!(root.dependencies[0].uid.as_deref(), Some("util"));
        assert_eq!(
            call(root, "__root__.run", "crate.util.load").callee_uid.as_deref(),
            Some("util.load")
        );
    }
}
