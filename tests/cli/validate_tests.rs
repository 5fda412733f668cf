//! Tests for the `validate` CLI command

use crate::common::{assert_contains, assert_valid_json, findings_with_severity, TestRepo};

#[test]
fn test_validate_fresh_structure_passes() {
    let repo = TestRepo::new();
    repo.with_python_package();
    repo.generate(false);

    let output = repo.run_cli_success(&["validate", "--level", "standard"]);
    assert_contains(&output, "PASSED", "text verdict");
    assert_contains(&output, "enterprise", "level table lists every level");
}

#[test]
fn test_validate_json_report_shape() {
    let repo = TestRepo::new();
    repo.with_python_package();
    repo.generate(false);

    let output = repo.run_cli_success(&["validate", "--struct-dir", "struct", "--level", "basic", "-f", "json"]);
    let json = assert_valid_json(&output, "validate json");
    assert_eq!(json["passed"], true);
    assert_eq!(json["requested"], "basic");
    assert_eq!(json["levels"].as_array().unwrap().len(), 4);
    assert!(json["population"].as_u64().unwrap() > 4);
}

#[test]
fn test_validate_broken_shard_exits_1_with_report() {
    let repo = TestRepo::new();
    repo.with_python_package();
    repo.generate(false);
    let shard_path = repo.shard_path("shop.pricing");
    let mut shard = repo.read_struct_json(&shard_path);
    shard.as_object_mut().unwrap().remove("entities");
    repo.write_struct_json(&shard_path, &shard);

    let (code, stdout, stderr) = repo.run_cli_status(&["validate", "--level", "basic", "-f", "json"]);
    assert_eq!(code, 1, "stderr: {}", stderr);
    let json = assert_valid_json(&stdout, "failing report");
    assert_eq!(json["passed"], false);
    let errors = findings_with_severity(&json, "error");
    assert!(errors.iter().any(|f| {
        f["location"]["file"] == shard_path.as_str()
            && f["message"].as_str().unwrap().contains("entities")
    }));
}

#[test]
fn test_validate_missing_index_fails() {
    let repo = TestRepo::new();
    let (code, stdout, _stderr) = repo.run_cli_status(&["validate", "--struct-dir", "nowhere"]);
    assert_eq!(code, 1);
    assert_contains(&stdout, "index.json", "missing index is reported");
}
