//! Custom assertions for integration tests

use serde_json::Value;

/// Assert that output is valid JSON and return parsed value
pub fn assert_valid_json(output: &str, context: &str) -> Value {
    serde_json::from_str(output).unwrap_or_else(|e| {
        panic!(
            "Expected valid JSON ({}): {}\nOutput:\n{}",
            context, e, output
        )
    })
}

/// Assert that output contains a substring
pub fn assert_contains(output: &str, needle: &str, context: &str) {
    assert!(
        output.contains(needle),
        "Expected output to contain '{}' ({})\nOutput:\n{}",
        needle,
        context,
        output
    );
}

/// Assert that output does not contain a substring
pub fn assert_not_contains(output: &str, needle: &str, context: &str) {
    assert!(
        !output.contains(needle),
        "Expected output NOT to contain '{}' ({})",
        needle,
        context
    );
}

/// Uids of every module in an index document
pub fn index_module_uids(index: &Value) -> Vec<String> {
    index["modules"]
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

/// Findings of a JSON validation report with the given severity
pub fn findings_with_severity<'a>(report: &'a Value, severity: &str) -> Vec<&'a Value> {
    report["findings"]
        .as_array()
        .map(|all| all.iter().filter(|f| f["severity"] == severity).collect())
        .unwrap_or_default()
}
