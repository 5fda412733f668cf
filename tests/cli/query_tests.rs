//! Tests for the `query` CLI command

use codestruct::query::estimate_tokens;

use crate::common::{assert_contains, assert_valid_json, TestRepo};

fn indexed_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.with_python_package();
    repo.generate(false);
    repo
}

#[test]
fn test_query_by_uid_prints_context() {
    let repo = indexed_repo();
    let output = repo.run_cli_success(&["query", "--uid", "shop.pricing"]);
    assert_contains(&output, "## module shop.pricing", "seed module block");
    assert_contains(&output, "shop.pricing.discounted_total", "seed entities");
}

#[test]
fn test_query_output_respects_budget() {
    let repo = indexed_repo();
    for budget in ["150", "400", "1000"] {
        let output = repo.run_cli_success(&["query", "--uid", "shop.models", "--depth", "3", "--max-tokens", budget]);
        let limit: usize = budget.parse().unwrap();
        assert!(estimate_tokens(&output) <= limit, "{} tokens over {}", estimate_tokens(&output), limit);
    }
    for format in ["json", "toon"] {
        for budget in ["400", "1000"] {
            let output = repo.run_cli_success(&[
                "query", "--uid", "shop.models", "--depth", "3", "--max-tokens", budget, "-f", format,
            ]);
            let limit: usize = budget.parse().unwrap();
            assert!(
                estimate_tokens(&output) <= limit,
                "{} output of {} tokens over {}",
                format,
                estimate_tokens(&output),
                limit
            );
        }
    }
}

#[test]
fn test_query_json_does_not_repeat_block_text() {
    let repo = indexed_repo();
    let output = repo.run_cli_success(&["query", "--uid", "shop.pricing", "-f", "json"]);
    let json = assert_valid_json(&output, "query json");
    assert!(json["text"].as_str().unwrap().contains("shop.pricing"));
    for block in json["blocks"].as_array().unwrap() {
        assert!(block.get("text").is_none(), "block repeats its text: {}", block);
    }
}

#[test]
fn test_query_budget_too_small_is_reported() {
    let repo = indexed_repo();
    let (code, stdout, stderr) = repo.run_cli_status(&["query", "--uid", "shop.models", "--max-tokens", "1"]);
    assert_eq!(code, 4);
    assert!(stdout.is_empty());
    assert_contains(&stderr, "raise --max-tokens", "budget message");
    assert!(!stderr.contains("matched nothing"), "{}", stderr);
}

#[test]
fn test_query_json_output() {
    let repo = indexed_repo();
    let output = repo.run_cli_success(&["query", "--uid", "shop.models.Order", "-f", "json"]);
    let json = assert_valid_json(&output, "query json");
    assert_eq!(json["included"][0], "shop.models.Order");
    assert!(json["tokens_used"].as_u64().unwrap() <= json["max_tokens"].as_u64().unwrap());
}

#[test]
fn test_query_by_tag() {
    let repo = indexed_repo();
    let output = repo.run_cli_success(&["query", "--tags", "test", "-f", "json"]);
    let json = assert_valid_json(&output, "tag query");
    let included: Vec<&str> = json["included"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(included.contains(&"tests.test_pricing"));
    assert!(!included.contains(&"shop.models"));
}

#[test]
fn test_query_without_matches_exits_4() {
    let repo = indexed_repo();
    let (code, stdout, _stderr) = repo.run_cli_status(&["query", "--text", "zzzqqqxxx"]);
    assert_eq!(code, 4);
    assert!(stdout.is_empty());
}

#[test]
fn test_query_without_index_exits_3() {
    let repo = TestRepo::new();
    let (code, _stdout, stderr) = repo.run_cli_status(&["query", "--uid", "anything"]);
    assert_eq!(code, 3);
    assert_contains(&stderr, "No index found", "missing index message");
}
