//! Tests for the `generate` CLI command

use crate::common::{assert_contains, assert_valid_json, TestRepo};

#[test]
fn test_generate_writes_structure_directory() {
    let repo = TestRepo::new();
    repo.with_python_package();

    let output = repo.run_cli_success(&["generate", "--root", "."]);
    assert_contains(&output, "modules: 4", "generate summary");
    assert!(repo.struct_dir().join("index.json").is_file());
    assert!(repo.struct_dir().join(repo.shard_path("shop.models")).is_file());
}

#[test]
fn test_generate_json_output() {
    let repo = TestRepo::new();
    repo.with_independent_modules();

    let output = repo.run_cli_success(&["generate", "--root", ".", "--format", "json"]);
    let json = assert_valid_json(&output, "generate json");
    assert_eq!(json["modules"], 3);
    assert_eq!(json["files_failed"], 0);
    assert_eq!(json["added"], 3);
}

#[test]
fn test_generate_custom_out_dir() {
    let repo = TestRepo::new();
    repo.with_independent_modules();

    repo.run_cli_success(&["generate", "--root", ".", "--out", "build/structure"]);
    assert!(repo.path().join("build/structure/index.json").is_file());
}

#[test]
fn test_incremental_generate_reports_reuse() {
    let repo = TestRepo::new();
    repo.with_independent_modules();
    repo.run_cli_success(&["generate", "--root", "."]);
    repo.add_file("alpha.py", "def first():\n    return 10\n");

    let output = repo.run_cli_success(&["generate", "--root", ".", "--incremental", "-f", "json"]);
    let json = assert_valid_json(&output, "incremental generate");
    assert_eq!(json["files_reused"], 2);
    assert_eq!(json["files_processed"], 1);
    assert_eq!(json["changed"], 1);
}

#[test]
fn test_all_files_failing_exits_2() {
    let repo = TestRepo::new();
    repo.add_file("broken.py", "def broken(:\n");

    let (code, _stdout, stderr) = repo.run_cli_status(&["generate", "--root", "."]);
    assert_eq!(code, 2, "stderr: {}", stderr);
    assert_contains(&stderr, "failed to parse", "fatal parse message");
}

#[test]
fn test_missing_root_exits_3() {
    let repo = TestRepo::new();
    let (code, _stdout, _stderr) = repo.run_cli_status(&["generate", "--root", "does-not-exist"]);
    assert_eq!(code, 3);
}

#[test]
fn test_generate_with_failing_validation_exits_1() {
    let repo = TestRepo::new();
    repo.add_file(
        "undocumented.py",
        "def load_a():\n    return 1\n\ndef load_b():\n    return 2\n\ndef load_c():\n    return 3\n\n\
         def load_d():\n    return 4\n\ndef load_e():\n    return 5\n",
    );

    let (code, stdout, _stderr) = repo.run_cli_status(&[
        "generate",
        "--root",
        ".",
        "--validate-level",
        "enterprise",
        "--no-summaries",
    ]);
    assert_eq!(code, 1);
    assert_contains(&stdout, "FAILED", "validation verdict is printed");
    assert!(repo.struct_dir().join("index.json").is_file());
}

#[test]
fn test_generate_with_passing_validation_exits_0() {
    let repo = TestRepo::new();
    repo.with_python_package();
    let output = repo.run_cli_success(&["generate", "--root", ".", "--validate-level", "basic"]);
    assert_contains(&output, "PASSED", "validation verdict is printed");
}
