//! Referential checks: uids are unique and every link points somewhere real

use std::collections::{BTreeMap, BTreeSet};

use super::{escape_pointer, Check, Finding, Location, Snapshot};
use crate::cache::StructDir;
use crate::schema::{IndexFile, LinkStatus, ModuleShard};
use crate::uid::{is_within, legacy_id, uid_components};

pub fn check(snapshot: &Snapshot) -> Vec<Finding> {
    let Some(index) = &snapshot.index else {
        return Vec::new();
    };
    let mut findings = Vec::new();

    let shards: BTreeMap<&str, (&str, &ModuleShard)> = snapshot
        .shards
        .iter()
        .filter_map(|(key, doc)| doc.parsed.as_ref().map(|s| (key.as_str(), (doc.rel_path.as_str(), s))))
        .collect();

    let known = known_uids(index, &shards, &mut findings);

    for (key, (rel_path, shard)) in &shards {
        check_shard(key, rel_path, shard, index, &known, &mut findings);
    }
    check_index_links(index, &known, &mut findings);
    check_orphans(snapshot, &mut findings);
    findings
}

/// Every module and entity uid, reporting duplicates along the way
fn known_uids(
    index: &IndexFile,
    shards: &BTreeMap<&str, (&str, &ModuleShard)>,
    findings: &mut Vec<Finding>,
) -> BTreeSet<String> {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for key in index.modules.keys() {
        owners.insert(key.as_str(), StructDir::INDEX);
    }
    for (rel_path, shard) in shards.values() {
        for entity in &shard.entities {
            if let Some(previous) = owners.insert(entity.uid.as_str(), rel_path) {
                findings.push(Finding::error(
                    Check::Referential,
                    Location::file(*rel_path).uid(entity.uid.clone()),
                    format!("duplicate uid {} (also defined in {})", entity.uid, previous),
                ));
            }
        }
    }
    owners.keys().map(|k| k.to_string()).collect()
}

fn check_shard(
    key: &str,
    rel_path: &str,
    shard: &ModuleShard,
    index: &IndexFile,
    known: &BTreeSet<String>,
    findings: &mut Vec<Finding>,
) {
    let at = |pointer: String| Location::file(rel_path).at(pointer).uid(shard.uid.clone());

    if shard.uid != key {
        findings.push(Finding::error(
            Check::Referential,
            at("/uid".into()),
            format!("shard uid {} does not match index key {}", shard.uid, key),
        ));
    }
    if shard.legacy_id != legacy_id(&shard.uid) {
        findings.push(Finding::error(
            Check::Referential,
            at("/legacy_id".into()),
            format!("legacy_id of {} is not derived from its uid", shard.uid),
        ));
    }

    if let Some(entry) = index.modules.get(key) {
        if entry.content_hash != shard.content_hash {
            findings.push(Finding::error(
                Check::Referential,
                at("/content_hash".into()),
                format!("content hash of {} differs from the index entry", shard.uid),
            ));
        }
        let listed: Vec<&str> = shard.entities.iter().map(|e| e.uid.as_str()).collect();
        let indexed: Vec<&str> = entry.entities.iter().map(String::as_str).collect();
        if listed != indexed {
            findings.push(Finding::error(
                Check::Referential,
                Location::file(StructDir::INDEX)
                    .at(format!("/modules/{}/entities", escape_pointer(key)))
                    .uid(key.to_string()),
                format!("entity list of {} differs between index and shard", key),
            ));
        }
    }

    for (i, entity) in shard.entities.iter().enumerate() {
        let pointer = |field: &str| format!("/entities/{}/{}", i, field);
        let at_entity = |field: &str| Location::file(rel_path).at(pointer(field)).uid(entity.uid.clone());

        if !is_within(&entity.uid, &shard.uid) || entity.uid == shard.uid {
            findings.push(Finding::error(
                Check::Referential,
                at_entity("uid"),
                format!("entity {} is not inside module {}", entity.uid, shard.uid),
            ));
        }
        if entity.legacy_id != legacy_id(&entity.uid) {
            findings.push(Finding::error(
                Check::Referential,
                at_entity("legacy_id"),
                format!("legacy_id of {} is not derived from its uid", entity.uid),
            ));
        }
        if entity.uid_components != uid_components(&entity.uid) {
            findings.push(Finding::error(
                Check::Referential,
                at_entity("uid_components"),
                format!("uid_components of {} do not match its uid", entity.uid),
            ));
        }
        for (j, child) in entity.children.iter().enumerate() {
            if !known.contains(child) {
                findings.push(Finding::error(
                    Check::Referential,
                    Location::file(rel_path)
                        .at(format!("/entities/{}/children/{}", i, j))
                        .uid(entity.uid.clone()),
                    format!("child {} of {} does not exist", child, entity.uid),
                ));
            }
        }
        for (j, tester) in entity.tested_by.iter().enumerate() {
            if !known.contains(tester) {
                findings.push(Finding::error(
                    Check::Referential,
                    Location::file(rel_path)
                        .at(format!("/entities/{}/tested_by/{}", i, j))
                        .uid(entity.uid.clone()),
                    format!("test {} recorded for {} does not exist", tester, entity.uid),
                ));
            }
        }
    }

    for (j, child) in shard.children.iter().enumerate() {
        if !known.contains(child) {
            findings.push(Finding::error(
                Check::Referential,
                at(format!("/children/{}", j)),
                format!("child {} of {} does not exist", child, shard.uid),
            ));
        }
    }

    for (j, dep) in shard.dependencies.iter().enumerate() {
        check_link(
            dep.status,
            dep.uid.as_deref(),
            &dep.target,
            at(format!("/dependencies/{}", j)),
            known,
            findings,
        );
    }
    for (j, call) in shard.calls.iter().enumerate() {
        if !known.contains(&call.caller_uid) {
            findings.push(Finding::error(
                Check::Referential,
                at(format!("/calls/{}/caller_uid", j)),
                format!("caller {} does not exist", call.caller_uid),
            ));
        }
        check_link(
            call.status,
            call.callee_uid.as_deref(),
            &call.callee,
            at(format!("/calls/{}", j)),
            known,
            findings,
        );
    }
}

/// Resolved links must hit an existing uid; unresolved ones are reported
/// so dangling references stay visible
fn check_link(
    status: LinkStatus,
    uid: Option<&str>,
    written: &str,
    location: Location,
    known: &BTreeSet<String>,
    findings: &mut Vec<Finding>,
) {
    match (status, uid) {
        (LinkStatus::Resolved, Some(target)) if known.contains(target) => {}
        (LinkStatus::Resolved, Some(target)) => findings.push(Finding::error(
            Check::Referential,
            location,
            format!("resolved reference {} points to a missing uid", target),
        )),
        (LinkStatus::Resolved, None) => findings.push(Finding::error(
            Check::Referential,
            location,
            format!("resolved reference {} carries no uid", written),
        )),
        (LinkStatus::Unresolved, Some(target)) => findings.push(Finding::warning(
            Check::Referential,
            location,
            format!("unresolved reference to {}", target),
        )),
        (LinkStatus::Unresolved, None) => findings.push(Finding::error(
            Check::Referential,
            location,
            format!("unresolved reference {} carries no uid", written),
        )),
        (LinkStatus::External, _) => {}
    }
}

fn check_index_links(index: &IndexFile, known: &BTreeSet<String>, findings: &mut Vec<Finding>) {
    for (key, entry) in &index.modules {
        let at = |field: &str, j: usize| {
            Location::file(StructDir::INDEX)
                .at(format!("/modules/{}/{}/{}", escape_pointer(key), field, j))
                .uid(key.clone())
        };
        if entry.uid != *key {
            findings.push(Finding::error(
                Check::Referential,
                Location::file(StructDir::INDEX)
                    .at(format!("/modules/{}/uid", escape_pointer(key)))
                    .uid(key.clone()),
                format!("index entry uid {} does not match its key {}", entry.uid, key),
            ));
        }
        for (j, dep) in entry.dependencies.iter().enumerate() {
            match index.modules.get(dep) {
                None => findings.push(Finding::error(
                    Check::Referential,
                    at("dependencies", j),
                    format!("dependency {} of {} is not an indexed module", dep, key),
                )),
                Some(target) if !target.dependents.contains(key) => findings.push(Finding::error(
                    Check::Referential,
                    at("dependencies", j),
                    format!("{} does not list {} among its dependents", dep, key),
                )),
                Some(_) => {}
            }
        }
        for (j, user) in entry.dependents.iter().enumerate() {
            let reciprocal = index
                .modules
                .get(user)
                .map(|u| u.dependencies.contains(key))
                .unwrap_or(false);
            if !reciprocal {
                findings.push(Finding::error(
                    Check::Referential,
                    at("dependents", j),
                    format!("dependent {} of {} does not depend on it", user, key),
                ));
            }
        }
        for (j, target) in entry.unresolved.iter().enumerate() {
            if known.contains(target) {
                findings.push(Finding::warning(
                    Check::Referential,
                    at("unresolved", j),
                    format!("{} is listed as unresolved but exists", target),
                ));
            }
        }
    }
}

fn check_orphans(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let referenced: BTreeSet<&str> = snapshot
        .index_raw
        .as_ref()
        .and_then(|v| v.get("modules"))
        .and_then(|m| m.as_object())
        .map(|modules| {
            modules
                .values()
                .filter_map(|entry| entry.get("shard_path").and_then(|p| p.as_str()))
                .collect()
        })
        .unwrap_or_default();
    for file in &snapshot.shard_files {
        if !referenced.contains(file.as_str()) {
            findings.push(Finding::warning(
                Check::Referential,
                Location::file(file.clone()),
                format!("{} is not referenced by the index", file),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StructConfig;
    use crate::validate::Severity;
    use crate::indexing::{rebuild, RebuildOptions};
    use std::fs;
    use tempfile::TempDir;

    fn generate(files: &[(&str, &str)]) -> (TempDir, StructDir) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("repo");
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let out = temp.path().join("struct");
        let options = RebuildOptions {
            root,
            out: out.clone(),
            incremental: false,
            config: StructConfig::default(),
            generator: None,
        };
        rebuild(&options, None).unwrap();
        (temp, StructDir::new(out))
    }

    fn errors(findings: &[Finding]) -> Vec<&Finding> {
        findings.iter().filter(|f| f.severity == Severity::Error).collect()
    }

    #[test]
    fn test_fresh_build_has_no_referential_errors() {
        let (_temp, dir) = generate(&[
            ("app/models.py", "class User:\n    def save(self):\n        pass\n"),
            ("app/views.py", "from app.models import User\n\ndef show():\n    User().save()\n"),
        ]);
        let findings = check(&Snapshot::load(&dir));
        assert!(errors(&findings).is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_dangling_resolved_link_is_an_error() {
        let (_temp, dir) = generate(&[
            ("a.py", "import b\n\ndef run():\n    b.helper()\n"),
            ("b.py", "def helper():\n    pass\n"),
        ]);
        let index: IndexFile = serde_json::from_slice(&fs::read(dir.index_path()).unwrap()).unwrap();
        let rel = index.modules["a"].shard_path.clone();
        let shard_path = dir.resolve(&rel);
        let text = fs::read_to_string(&shard_path).unwrap();
        fs::write(&shard_path, text.replace("\"b.helper\"", "\"b.vanished\"")).unwrap();

        let findings = check(&Snapshot::load(&dir));
        let dangling: Vec<_> = errors(&findings)
            .into_iter()
            .filter(|f| f.message.contains("b.vanished"))
            .collect();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].location.file, rel);
        assert!(dangling[0].location.pointer.as_deref().unwrap().starts_with("/calls/"));
    }

    #[test]
    fn test_orphan_shard_file_is_a_warning() {
        let (_temp, dir) = generate(&[("a.py", "x = 1\n")]);
        fs::write(dir.resolve("modules/stale.json"), "{}").unwrap();
        let findings = check(&Snapshot::load(&dir));
        let orphan = findings
            .iter()
            .find(|f| f.location.file == "modules/stale.json")
            .unwrap();
        assert_eq!(orphan.severity, Severity::Warning);
    }
}
