//! Generic Structural Extractor
//!
//! One walk over a tree-sitter tree, driven by a `LangGrammar`. The walk is
//! iterative (explicit stack plus a scope arena) so deeply nested sources
//! cannot overflow the call stack.
//!
//! # Usage
//!
//! ```ignore
//! use crate::detectors::generic::extract_with_grammar;
//!
//! let raw = extract_with_grammar(tree.root_node(), source, lang.grammar(), &ctx);
//! ```

use std::collections::BTreeSet;

use ahash::AHashSet;
use tree_sitter::Node;

use crate::detectors::common::{
    count_code_lines, get_node_text, header_text, named_children, normalize_callee,
    normalize_whitespace, visit_pruned,
};
use crate::detectors::grammar::LangGrammar;
use crate::detectors::{FileContext, MetricInput, RawCall, RawEntity, RawFile};
use crate::schema::{EntityKind, LineSpan};
use crate::uid::LOCAL_MARKER;

// =============================================================================
// Main Entry Point
// =============================================================================

/// Where definitions found under a node belong
#[derive(Debug, Clone)]
struct Scope {
    owner: Option<usize>,
    owner_kind: Option<EntityKind>,
    path: Vec<String>,
    impl_target: Option<String>,
}

impl Scope {
    fn module() -> Self {
        Self {
            owner: None,
            owner_kind: None,
            path: Vec::new(),
            impl_target: None,
        }
    }
}

/// Extract entities, calls, imports and metric inputs from a parsed file
pub fn extract_with_grammar(
    root: Node,
    source: &str,
    grammar: &LangGrammar,
    ctx: &FileContext,
) -> RawFile {
    let mut scopes: Vec<Scope> = vec![Scope::module()];
    let mut entities: Vec<RawEntity> = Vec::new();
    let mut calls: Vec<RawCall> = Vec::new();
    let mut seen_calls: AHashSet<(Option<usize>, String)> = AHashSet::new();

    let mut stack: Vec<(Node, usize)> = named_and_unnamed_children(&root)
        .into_iter()
        .rev()
        .map(|c| (c, 0))
        .collect();

    while let Some((node, sid)) = stack.pop() {
        let kind = node.kind();

        if let Some(field) = grammar.callee_field(kind) {
            let callee = node
                .child_by_field_name(field)
                .and_then(|f| normalize_callee(&get_node_text(&f, source)));
            if let Some(callee) = callee {
                let caller = scopes[sid].owner;
                if seen_calls.insert((caller, callee.clone())) {
                    calls.push(RawCall { caller, callee });
                }
            }
        }

        let child_sid = if let Some(entity) = build_entity(node, &scopes[sid], grammar, source) {
            let idx = entities.len();
            let entity_kind = entity.kind;
            entities.push(entity);
            let path = if entity_kind.is_callable() {
                vec![LOCAL_MARKER.to_string()]
            } else {
                Vec::new()
            };
            scopes.push(Scope {
                owner: Some(idx),
                owner_kind: Some(entity_kind),
                path,
                impl_target: None,
            });
            scopes.len() - 1
        } else if grammar.namespace_nodes.contains(&kind) && node.child_by_field_name("body").is_some() {
            let mut scope = scopes[sid].clone();
            if let Some(name) = node.child_by_field_name(grammar.name_field) {
                scope.path.push(get_node_text(&name, source));
            }
            scopes.push(scope);
            scopes.len() - 1
        } else if grammar.impl_nodes.contains(&kind) {
            let mut scope = scopes[sid].clone();
            scope.impl_target = node
                .child_by_field_name("type")
                .map(|t| base_type_name(t, source));
            scopes.push(scope);
            scopes.len() - 1
        } else {
            sid
        };

        for child in named_and_unnamed_children(&node).into_iter().rev() {
            stack.push((child, child_sid));
        }
    }

    attach_impl_methods(&mut entities);

    RawFile {
        lang: ctx.lang,
        module_docstring: (grammar.module_docstring)(root, source),
        entities,
        calls,
        imports: (grammar.imports)(root, source, ctx),
        module_metrics: measure(root, source, grammar, false),
    }
}

fn named_and_unnamed_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

// =============================================================================
// Entity Construction
// =============================================================================

/// Whether `node` would become an entity (used to keep nested definitions
/// out of their parent's metrics)
fn is_entity_node(node: &Node, grammar: &LangGrammar, source: &str) -> bool {
    let kind = node.kind();
    if grammar.class_flavour(kind).is_some() {
        return node.child_by_field_name(grammar.name_field).is_some();
    }
    grammar.is_function_node(kind) && (grammar.function_name)(*node, source).is_some()
}

fn build_entity(
    node: Node,
    scope: &Scope,
    grammar: &LangGrammar,
    source: &str,
) -> Option<RawEntity> {
    let node_kind = node.kind();
    let (kind, name, flavour) = if let Some(flavour) = grammar.class_flavour(node_kind) {
        let name = node
            .child_by_field_name(grammar.name_field)
            .map(|n| get_node_text(&n, source))?;
        (EntityKind::Class, name, flavour)
    } else if grammar.is_function_node(node_kind) {
        let name = (grammar.function_name)(node, source)?;
        let directly_in_class =
            scope.owner_kind == Some(EntityKind::Class) && scope.path.is_empty();
        let kind = if directly_in_class || scope.impl_target.is_some() {
            EntityKind::Method
        } else {
            EntityKind::Function
        };
        (kind, name, None)
    } else {
        return None;
    };
    if name.is_empty() {
        return None;
    }

    // Declarator-bound functions (`const f = () => ...`) keep their parts on the value
    let func = if kind.is_callable() {
        node.child_by_field_name("value").unwrap_or(node)
    } else {
        node
    };
    let body = func.child_by_field_name(grammar.body_field);
    let params = func
        .child_by_field_name(grammar.params_field)
        .or_else(|| func.child_by_field_name("parameter"));
    let outer = outermost_wrapper(node, grammar);

    let mut path = scope.path.clone();
    if kind.is_callable() {
        if let Some(target) = &scope.impl_target {
            path.push(target.clone());
        }
    }

    let mut modifiers = collect_modifiers(node, func, grammar, source);
    if let Some(flavour) = flavour {
        modifiers.insert(flavour.to_string());
    }

    let snippet = source
        .get(outer.start_byte()..node.end_byte())
        .unwrap_or("")
        .to_string();
    let mut metric_input = measure(node, source, grammar, true);
    metric_input.loc = count_code_lines(&snippet, grammar.line_comment_prefixes);

    Some(RawEntity {
        kind,
        name,
        parent: scope.owner,
        path,
        lines: LineSpan {
            start: outer.start_position().row as u32 + 1,
            end: node.end_position().row as u32 + 1,
        },
        signature: header_text(&node, body.as_ref(), source),
        parameters: parameter_names(params, kind, grammar, source),
        docstring: (grammar.docstring)(outer, node, body, source),
        decorators: collect_decorators(node, outer, grammar, source),
        modifiers,
        exported: (grammar.is_exported)(node, outer, source),
        impl_target: if kind.is_callable() {
            scope.impl_target.clone()
        } else {
            None
        },
        metric_input,
        snippet,
    })
}

/// Climb through wrapper nodes (decorators, `export`, `const` declarations)
fn outermost_wrapper<'t>(node: Node<'t>, grammar: &LangGrammar) -> Node<'t> {
    let mut outer = node;
    while let Some(parent) = outer.parent() {
        if grammar.wrapper_nodes.contains(&parent.kind()) {
            outer = parent;
        } else {
            break;
        }
    }
    outer
}

/// `Foo` for `Foo`, `Foo<T>` and `crate::x::Foo`
fn base_type_name(node: Node, source: &str) -> String {
    match node.kind() {
        "generic_type" => node
            .child_by_field_name("type")
            .map(|t| base_type_name(t, source))
            .unwrap_or_else(|| get_node_text(&node, source)),
        "scoped_type_identifier" => node
            .child_by_field_name("name")
            .map(|t| get_node_text(&t, source))
            .unwrap_or_else(|| get_node_text(&node, source)),
        _ => get_node_text(&node, source),
    }
}

fn parameter_names(
    params: Option<Node>,
    kind: EntityKind,
    grammar: &LangGrammar,
    source: &str,
) -> Vec<String> {
    let Some(params) = params else {
        return Vec::new();
    };
    if params.kind() == "identifier" {
        return vec![get_node_text(&params, source)];
    }
    named_children(&params)
        .into_iter()
        .filter(|c| {
            let k = c.kind();
            !grammar.comment_nodes.contains(&k)
                && !grammar.receiver_nodes.contains(&k)
                && !grammar.decorator_nodes.contains(&k)
                && !matches!(k, "keyword_separator" | "positional_separator")
        })
        .map(|c| parameter_name(c, source))
        .filter(|name| !(kind == EntityKind::Method && grammar.receiver_names.contains(&name.as_str())))
        .collect()
}

fn parameter_name(node: Node, source: &str) -> String {
    if node.kind() == "identifier" {
        return get_node_text(&node, source);
    }
    for field in ["name", "pattern", "left"] {
        if let Some(inner) = node.child_by_field_name(field) {
            return parameter_name(inner, source);
        }
    }
    match node.named_child(0) {
        Some(first) if first.kind() == "identifier" => get_node_text(&first, source),
        _ => normalize_whitespace(&get_node_text(&node, source)),
    }
}

fn collect_decorators(node: Node, outer: Node, grammar: &LangGrammar, source: &str) -> Vec<String> {
    let mut found: Vec<Node> = Vec::new();

    // Preceding siblings (Rust attributes, TS member decorators)
    let mut preceding = Vec::new();
    let mut prev = outer.prev_named_sibling();
    while let Some(p) = prev {
        if grammar.decorator_nodes.contains(&p.kind()) {
            preceding.push(p);
        } else if !grammar.comment_nodes.contains(&p.kind()) {
            break;
        }
        prev = p.prev_named_sibling();
    }
    found.extend(preceding.into_iter().rev());

    let mut holders = vec![outer];
    if node.id() != outer.id() {
        holders.push(node);
    }
    for holder in holders {
        found.extend(
            named_children(&holder)
                .into_iter()
                .filter(|c| grammar.decorator_nodes.contains(&c.kind())),
        );
    }

    found
        .iter()
        .map(|d| decorator_name(&get_node_text(d, source)))
        .filter(|d| !d.is_empty())
        .collect()
}

/// `@app.route("/x")` -> `app.route`, `#[tokio::test]` -> `tokio::test`
fn decorator_name(text: &str) -> String {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("#[")
        .and_then(|t| t.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('@'))
        .unwrap_or(trimmed);
    let name = inner.split('(').next().unwrap_or(inner);
    name.trim().to_string()
}

fn collect_modifiers(node: Node, func: Node, grammar: &LangGrammar, source: &str) -> BTreeSet<String> {
    let mut modifiers = BTreeSet::new();
    let mut holders = vec![node];
    if func.id() != node.id() {
        holders.push(func);
    }
    for holder in holders {
        let mut cursor = holder.walk();
        for child in holder.children(&mut cursor) {
            match child.kind() {
                "function_modifiers" => {
                    let mut inner = child.walk();
                    for token in child.children(&mut inner) {
                        if grammar.modifier_tokens.contains(&token.kind()) {
                            modifiers.insert(token.kind().to_string());
                        }
                    }
                }
                "accessibility_modifier" => {
                    modifiers.insert(get_node_text(&child, source));
                }
                "*" if grammar.modifier_tokens.contains(&"*") => {
                    modifiers.insert("generator".to_string());
                }
                k if !child.is_named() && grammar.modifier_tokens.contains(&k) => {
                    modifiers.insert(k.to_string());
                }
                _ => {}
            }
        }
    }
    if node.kind().starts_with("generator_function") {
        modifiers.insert("generator".to_string());
    }
    modifiers
}

/// Re-home Rust `impl` methods under the struct/enum/trait they implement
/// when that type is declared in the same file and scope
fn attach_impl_methods(entities: &mut [RawEntity]) {
    for i in 0..entities.len() {
        let Some(target) = entities[i].impl_target.clone() else {
            continue;
        };
        let ns_len = entities[i].path.len().saturating_sub(1);
        let namespace = entities[i].path[..ns_len].to_vec();
        let parent = entities[i].parent;
        let owner = entities.iter().position(|e| {
            e.kind == EntityKind::Class && e.name == target && e.path == namespace && e.parent == parent
        });
        if let Some(j) = owner {
            entities[i].parent = Some(j);
            entities[i].path.clear();
        }
    }
}

// =============================================================================
// Metric Inputs
// =============================================================================

/// Count decision points and leaf tokens under `node`. With `prune_nested`
/// set, nested definitions are skipped so each entity is measured on its own.
fn measure(node: Node, source: &str, grammar: &LangGrammar, prune_nested: bool) -> MetricInput {
    let mut decisions = 0u32;
    let mut tokens = 0u32;
    let mut distinct: AHashSet<String> = AHashSet::new();

    visit_pruned(
        &node,
        |n| {
            let kind = n.kind();
            if grammar.decision_nodes.contains(&kind) {
                decisions += 1;
            } else if grammar.boolean_nodes.contains(&kind) {
                let op = n
                    .child_by_field_name("operator")
                    .map(|o| get_node_text(&o, source))
                    .unwrap_or_default();
                if grammar.logical_operators.contains(&op.as_str()) {
                    decisions += 1;
                }
            }
            if n.child_count() == 0 && !grammar.comment_nodes.contains(&kind) {
                tokens += 1;
                distinct.insert(get_node_text(n, source));
            }
        },
        |n| prune_nested && is_entity_node(n, grammar, source),
    );

    MetricInput {
        loc: count_code_lines(
            source.get(node.start_byte()..node.end_byte()).unwrap_or(""),
            grammar.line_comment_prefixes,
        ),
        decisions,
        tokens,
        distinct_tokens: distinct.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorator_name() {
        assert_eq!(decorator_name("@property"), "property");
        assert_eq!(decorator_name("@app.route(\"/x\")"), "app.route");
        assert_eq!(decorator_name("#[test]"), "test");
        assert_eq!(decorator_name("#[tokio::test]"), "tokio::test");
        assert_eq!(decorator_name("#[cfg(test)]"), "cfg");
    }
}
