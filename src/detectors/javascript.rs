//! JavaScript / TypeScript language hooks
//!
//! Shared by `.js`, `.jsx`, `.ts` and `.tsx`. Functions bound to a
//! declarator or class field (`const f = () => {}`) are named after the
//! binding; anonymous callbacks never become entities.

use tree_sitter::Node;

use crate::detectors::common::{clean_block_comment, first_paragraph, get_node_text, named_children, visit_all};
use crate::detectors::{FileContext, RawImport};
use crate::uid::module_uid_with;

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

pub fn function_name(node: Node, source: &str) -> Option<String> {
    let text = |field: &str| node.child_by_field_name(field).map(|n| get_node_text(&n, source));
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => text("name"),
        "method_definition" => {
            let in_class = node.parent().map(|p| p.kind() == "class_body").unwrap_or(false);
            let name = text("name")?;
            // computed keys (`[Symbol.iterator]()`) have no stable name
            (in_class && !name.starts_with('[')).then_some(name)
        }
        "variable_declarator" | "field_definition" | "public_field_definition" => {
            let value = node.child_by_field_name("value")?;
            if !FUNCTION_VALUES.contains(&value.kind()) {
                return None;
            }
            let name_node = node
                .child_by_field_name("name")
                .or_else(|| node.child_by_field_name("property"))?;
            matches!(
                name_node.kind(),
                "identifier" | "property_identifier" | "private_property_identifier"
            )
            .then(|| get_node_text(&name_node, source))
        }
        _ => None,
    }
}

/// `/** ... */` block directly above the definition (decorators in between are skipped)
pub fn docstring(outer: Node, _def: Node, _body: Option<Node>, source: &str) -> Option<String> {
    let mut prev = outer.prev_sibling();
    while let Some(p) = prev {
        if p.kind() == "decorator" {
            prev = p.prev_sibling();
        } else {
            break;
        }
    }
    let comment = prev.filter(|p| p.kind() == "comment")?;
    let text = get_node_text(&comment, source);
    if !text.starts_with("/**") {
        return None;
    }
    first_paragraph(&clean_block_comment(&text))
}

/// Leading `/** ... */` block of the file, separated from the first statement by a blank line
pub fn module_docstring(root: Node, source: &str) -> Option<String> {
    let children = named_children(&root);
    let mut iter = children.iter().skip_while(|c| c.kind() == "hash_bang_line");
    let first = iter.next()?;
    if first.kind() != "comment" {
        return None;
    }
    let text = get_node_text(first, source);
    if !text.starts_with("/**") {
        return None;
    }
    let detached = iter
        .next()
        .map(|next| next.start_position().row > first.end_position().row + 1)
        .unwrap_or(true);
    if !detached {
        return None;
    }
    first_paragraph(&clean_block_comment(&text))
}

pub fn imports(root: Node, source: &str, ctx: &FileContext) -> Vec<RawImport> {
    let mut out = Vec::new();
    visit_all(&root, |node| match node.kind() {
        "import_statement" => {
            if let Some(import) = es_import(*node, source, ctx) {
                out.push(import);
            }
        }
        "export_statement" => {
            if let Some(spec) = node.child_by_field_name("source") {
                let (target, relative) = resolve_specifier(&string_value(&spec, source), ctx);
                out.push(RawImport::new(target, relative));
            }
        }
        "variable_declarator" => {
            if let Some(import) = require_import(*node, source, ctx) {
                out.push(import);
            }
        }
        _ => {}
    });
    out
}

fn es_import(node: Node, source: &str, ctx: &FileContext) -> Option<RawImport> {
    let spec = node.child_by_field_name("source")?;
    let (target, relative) = resolve_specifier(&string_value(&spec, source), ctx);
    let mut import = RawImport::new(target.clone(), relative);

    let clause = named_children(&node)
        .into_iter()
        .find(|c| c.kind() == "import_clause");
    if let Some(clause) = clause {
        for part in named_children(&clause) {
            match part.kind() {
                "identifier" => {
                    import = import.bind(get_node_text(&part, source), target.clone());
                }
                "namespace_import" => {
                    if let Some(id) = named_children(&part).into_iter().find(|c| c.kind() == "identifier") {
                        import = import.bind(get_node_text(&id, source), target.clone());
                    }
                }
                "named_imports" => {
                    for spec in named_children(&part).into_iter().filter(|c| c.kind() == "import_specifier") {
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let name = get_node_text(&name, source);
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| get_node_text(&a, source))
                            .unwrap_or_else(|| name.clone());
                        import = import.bind(local, format!("{}.{}", target, name));
                    }
                }
                _ => {}
            }
        }
    }
    Some(import)
}

/// `const x = require("./x")` and `const { a, b: c } = require("./x")`
fn require_import(node: Node, source: &str, ctx: &FileContext) -> Option<RawImport> {
    let call = node.child_by_field_name("value").filter(|v| v.kind() == "call_expression")?;
    let callee = call.child_by_field_name("function")?;
    if get_node_text(&callee, source) != "require" {
        return None;
    }
    let args = call.child_by_field_name("arguments")?;
    let spec = args.named_child(0).filter(|a| a.kind() == "string")?;
    let (target, relative) = resolve_specifier(&string_value(&spec, source), ctx);
    let mut import = RawImport::new(target.clone(), relative);

    let name = node.child_by_field_name("name")?;
    match name.kind() {
        "identifier" => import = import.bind(get_node_text(&name, source), target.clone()),
        "object_pattern" => {
            for prop in named_children(&name) {
                match prop.kind() {
                    "shorthand_property_identifier_pattern" => {
                        let local = get_node_text(&prop, source);
                        import = import.bind(local.clone(), format!("{}.{}", target, local));
                    }
                    "pair_pattern" => {
                        let key = prop.child_by_field_name("key").map(|k| get_node_text(&k, source));
                        let value = prop.child_by_field_name("value").map(|v| get_node_text(&v, source));
                        if let (Some(key), Some(value)) = (key, value) {
                            import = import.bind(value, format!("{}.{}", target, key));
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    Some(import)
}

fn string_value(node: &Node, source: &str) -> String {
    get_node_text(node, source)
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// Map an import specifier to a dotted target. `./` and `../` specifiers are
/// resolved against the importing file and become module uids.
fn resolve_specifier(spec: &str, ctx: &FileContext) -> (String, bool) {
    let relative = spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../");
    if !relative {
        return (spec.trim_start_matches('@').replace('/', "."), false);
    }

    let mut parts: Vec<&str> = ctx.rel_path.split('/').collect();
    parts.pop();
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    let path = parts.join("/");
    (module_uid_with(&path, ctx.source_roots, Some(ctx.lang)), true)
}
