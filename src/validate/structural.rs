//! Structural checks: every document conforms to its JSON Schema
//!
//! Schemas come from the `schema.json` written next to the index, falling
//! back to the built-in document when it is absent or unusable. Only the
//! keyword subset the generated schemas use is interpreted; unknown
//! keywords (`format`, `title`, `description`, ...) are ignored.

use serde_json::{Map, Value};

use super::{escape_pointer, Check, Finding, Location, Snapshot};
use crate::cache::StructDir;
use crate::schema::schema_document;

/// Nesting bound for `$ref` chains
const MAX_REF_DEPTH: usize = 32;

pub fn check(snapshot: &Snapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    let schemas = match &snapshot.schema {
        Some(doc) if has_parts(doc) => doc.clone(),
        Some(_) => {
            findings.push(Finding::warning(
                Check::Structural,
                Location::file(StructDir::SCHEMA),
                "schema.json lacks index, shard or metadata schemas; using built-in schemas",
            ));
            schema_document()
        }
        None => schema_document(),
    };

    if let Some(index) = &snapshot.index_raw {
        validate_document(&schemas["index"], index, StructDir::INDEX, &mut findings);
    }
    for doc in snapshot.shards.values() {
        validate_document(&schemas["shard"], &doc.raw, &doc.rel_path, &mut findings);
    }
    if let Some(metadata) = &snapshot.metadata_raw {
        validate_document(&schemas["metadata"], metadata, StructDir::METADATA, &mut findings);
    }
    findings
}

fn has_parts(doc: &Value) -> bool {
    ["index", "shard", "metadata"]
        .iter()
        .all(|part| doc.get(part).map(Value::is_object).unwrap_or(false))
}

fn validate_document(schema: &Value, value: &Value, file: &str, findings: &mut Vec<Finding>) {
    let validator = SchemaWalker { root: schema };
    let mut violations = Vec::new();
    validator.validate(schema, value, "", 0, &mut violations);
    let uid = value.get("uid").and_then(Value::as_str);
    for violation in violations {
        let mut location = Location::file(file).at(violation.pointer);
        if let Some(uid) = uid {
            location = location.uid(uid);
        }
        findings.push(Finding::error(Check::Structural, location, violation.message));
    }
}

// ============================================================================
// Schema interpretation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Violation {
    pointer: String,
    message: String,
}

struct SchemaWalker<'a> {
    root: &'a Value,
}

impl<'a> SchemaWalker<'a> {
    fn validate(&self, schema: &'a Value, value: &Value, pointer: &str, depth: usize, out: &mut Vec<Violation>) {
        let schema = match schema {
            Value::Bool(true) => return,
            Value::Bool(false) => {
                out.push(violation(pointer, "value is not allowed here"));
                return;
            }
            Value::Object(map) => map,
            _ => return,
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            if depth >= MAX_REF_DEPTH {
                return;
            }
            match self.lookup(reference) {
                Some(target) => self.validate(target, value, pointer, depth + 1, out),
                None => out.push(violation(pointer, &format!("unknown schema reference {}", reference))),
            }
        }

        if let Some(Value::Array(branches)) = schema.get("allOf") {
            for branch in branches {
                self.validate(branch, value, pointer, depth + 1, out);
            }
        }
        for keyword in ["anyOf", "oneOf"] {
            if let Some(Value::Array(branches)) = schema.get(keyword) {
                self.any_branch(branches, value, pointer, depth, out);
            }
        }

        if let Some(expected) = schema.get("const") {
            if expected != value {
                out.push(violation(pointer, &format!("expected {}", expected)));
            }
        }
        if let Some(Value::Array(allowed)) = schema.get("enum") {
            if !allowed.contains(value) {
                out.push(violation(pointer, &format!("{} is not one of the allowed values", value)));
            }
        }

        if let Some(types) = schema.get("type") {
            if !type_matches(types, value) {
                out.push(violation(
                    pointer,
                    &format!("expected {}, found {}", describe_types(types), type_name(value)),
                ));
                return;
            }
        }

        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
            if let Some(n) = value.as_f64() {
                if n < minimum {
                    out.push(violation(pointer, &format!("{} is below the minimum {}", n, minimum)));
                }
            }
        }

        match value {
            Value::Object(object) => self.validate_object(schema, object, pointer, depth, out),
            Value::Array(items) => {
                if let Some(item_schema) = schema.get("items") {
                    for (i, item) in items.iter().enumerate() {
                        self.validate(item_schema, item, &format!("{}/{}", pointer, i), depth + 1, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn validate_object(
        &self,
        schema: &'a Map<String, Value>,
        object: &Map<String, Value>,
        pointer: &str,
        depth: usize,
        out: &mut Vec<Violation>,
    ) {
        if let Some(Value::Array(required)) = schema.get("required") {
            for field in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(field) {
                    out.push(violation(pointer, &format!("missing required field `{}`", field)));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let additional = schema.get("additionalProperties");
        for (key, child) in object {
            let child_pointer = format!("{}/{}", pointer, escape_pointer(key));
            match properties.and_then(|p| p.get(key)) {
                Some(property) => self.validate(property, child, &child_pointer, depth + 1, out),
                None => match additional {
                    Some(Value::Bool(false)) => {
                        out.push(violation(&child_pointer, &format!("unexpected field `{}`", key)));
                    }
                    Some(extra) if extra.is_object() => {
                        self.validate(extra, child, &child_pointer, depth + 1, out)
                    }
                    _ => {}
                },
            }
        }
    }

    /// Passes when some branch passes; otherwise reports the closest branch
    fn any_branch(&self, branches: &'a [Value], value: &Value, pointer: &str, depth: usize, out: &mut Vec<Violation>) {
        let mut best: Option<Vec<Violation>> = None;
        for branch in branches {
            let mut attempt = Vec::new();
            self.validate(branch, value, pointer, depth + 1, &mut attempt);
            if attempt.is_empty() {
                return;
            }
            if best.as_ref().map(|b| attempt.len() < b.len()).unwrap_or(true) {
                best = Some(attempt);
            }
        }
        if let Some(best) = best {
            out.extend(best);
        }
    }

    /// Resolve a local `#/...` reference
    fn lookup(&self, reference: &str) -> Option<&'a Value> {
        let pointer = reference.strip_prefix('#')?;
        if pointer.is_empty() {
            return Some(self.root);
        }
        self.root.pointer(pointer)
    }
}

fn violation(pointer: &str, message: &str) -> Violation {
    Violation {
        pointer: if pointer.is_empty() { "/".to_string() } else { pointer.to_string() },
        message: message.to_string(),
    }
}

fn type_matches(types: &Value, value: &Value) -> bool {
    match types {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
        }
        _ => true,
    }
}

fn describe_types(types: &Value) -> String {
    match types {
        Value::String(t) => t.clone(),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn violations(schema: &Value, value: &Value) -> Vec<Violation> {
        let walker = SchemaWalker { root: schema };
        let mut out = Vec::new();
        walker.validate(schema, value, "", 0, &mut out);
        out
    }

    #[test]
    fn test_required_field_reported_with_pointer() {
        let schema = json!({
            "type": "object",
            "required": ["uid"],
            "properties": {
                "inner": {"type": "object", "required": ["name"]}
            }
        });
        let found = violations(&schema, &json!({"inner": {}}));
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|v| v.pointer == "/" && v.message.contains("`uid`")));
        assert!(found.iter().any(|v| v.pointer == "/inner" && v.message.contains("`name`")));
    }

    #[test]
    fn test_refs_and_nullable_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "span": {"$ref": "#/$defs/Span"},
                "uid": {"type": ["string", "null"]}
            },
            "$defs": {
                "Span": {"type": "object", "properties": {"start": {"type": "integer", "minimum": 0}}}
            }
        });
        assert!(violations(&schema, &json!({"span": {"start": 3}, "uid": null})).is_empty());
        let found = violations(&schema, &json!({"span": {"start": -1}, "uid": 7}));
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|v| v.pointer == "/span/start"));
        assert!(found.iter().any(|v| v.pointer == "/uid"));
    }

    #[test]
    fn test_one_of_accepts_any_matching_branch() {
        let schema = json!({
            "oneOf": [
                {"type": "string", "const": "resolved"},
                {"type": "string", "const": "external"}
            ]
        });
        assert!(violations(&schema, &json!("external")).is_empty());
        assert_eq!(violations(&schema, &json!("dangling")).len(), 1);
    }

    #[test]
    fn test_map_values_follow_additional_properties() {
        let schema = json!({
            "type": "object",
            "additionalProperties": {"type": "string"}
        });
        let found = violations(&schema, &json!({"a/b": 1}));
        assert_eq!(found[0].pointer, "/a~1b");
    }

    #[test]
    fn test_builtin_schema_accepts_generated_shard_fields() {
        let doc = schema_document();
        let found = violations(&doc["shard"], &json!({"uid": "a"}));
        assert!(found.iter().any(|v| v.message.contains("`content_hash`")));
    }
}
