//! Python language hooks
//!
//! Docstrings are the first string statement of a body; imports cover
//! `import a.b as c`, `from .x import y` and wildcard imports.

use tree_sitter::Node;

use crate::detectors::common::{first_paragraph, get_node_text, named_children, visit_all};
use crate::detectors::{FileContext, RawImport};
use crate::uid::python_relative_target;

pub fn function_name(node: Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| get_node_text(&n, source))
}

pub fn docstring(_outer: Node, _def: Node, body: Option<Node>, source: &str) -> Option<String> {
    leading_string(body?, source)
}

pub fn module_docstring(root: Node, source: &str) -> Option<String> {
    leading_string(root, source)
}

/// Docstring of a block: its first statement, if that is a bare string
fn leading_string(block: Node, source: &str) -> Option<String> {
    let first = named_children(&block)
        .into_iter()
        .find(|c| c.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0).filter(|s| s.kind() == "string")?;
    let lines = clean_string_literal(&get_node_text(&string, source));
    first_paragraph(&lines)
}

/// Strip prefix letters and quotes from a Python string literal
fn clean_string_literal(text: &str) -> Vec<String> {
    let unprefixed = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| {
            unprefixed
                .strip_prefix(q)
                .map(|rest| rest.strip_suffix(q).unwrap_or(rest))
        })
        .unwrap_or(unprefixed);
    inner.lines().map(|l| l.trim().to_string()).collect()
}

pub fn imports(root: Node, source: &str, ctx: &FileContext) -> Vec<RawImport> {
    let mut out = Vec::new();
    visit_all(&root, |node| match node.kind() {
        "import_statement" => {
            for child in named_children(node) {
                match child.kind() {
                    "dotted_name" => {
                        let target = get_node_text(&child, source);
                        let head = target.split('.').next().unwrap_or(&target).to_string();
                        out.push(RawImport::new(target.clone(), false).bind(head.clone(), head));
                    }
                    "aliased_import" => {
                        let name = child.child_by_field_name("name").map(|n| get_node_text(&n, source));
                        let alias = child.child_by_field_name("alias").map(|n| get_node_text(&n, source));
                        if let (Some(name), Some(alias)) = (name, alias) {
                            out.push(RawImport::new(name.clone(), false).bind(alias, name));
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => out.extend(from_import(*node, source, ctx)),
        _ => {}
    });
    out
}

fn from_import(node: Node, source: &str, ctx: &FileContext) -> Vec<RawImport> {
    let Some(module) = node.child_by_field_name("module_name") else {
        return Vec::new();
    };
    let (base, relative) = if module.kind() == "relative_import" {
        let mut level = 0;
        let mut rest = None;
        for part in named_children(&module) {
            match part.kind() {
                "import_prefix" => level = get_node_text(&part, source).matches('.').count(),
                "dotted_name" => rest = Some(get_node_text(&part, source)),
                _ => {}
            }
        }
        (
            python_relative_target(ctx.module_uid, ctx.is_package, level.max(1), rest.as_deref()),
            true,
        )
    } else {
        (get_node_text(&module, source), false)
    };

    let mut cursor = node.walk();
    let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
    if names.is_empty() {
        // `from x import *`
        return vec![RawImport::new(base, relative)];
    }

    names
        .into_iter()
        .filter_map(|n| {
            let (imported, local) = match n.kind() {
                "aliased_import" => (
                    n.child_by_field_name("name").map(|x| get_node_text(&x, source))?,
                    n.child_by_field_name("alias").map(|x| get_node_text(&x, source))?,
                ),
                _ => {
                    let name = get_node_text(&n, source);
                    (name.clone(), name)
                }
            };
            let full = crate::uid::join_module(&base, &imported);
            Some(RawImport::new(full.clone(), relative).bind(local, full))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::generic::extract_with_grammar;
    use crate::detectors::RawFile;
    use crate::lang::Lang;
    use crate::schema::EntityKind;
    use tree_sitter::Parser;

    fn extract(source: &str, rel_path: &str, module_uid: &str) -> RawFile {
        let mut parser = Parser::new();
        parser.set_language(&Lang::Python.tree_sitter_language()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        let roots = vec!["src".to_string()];
        let ctx = FileContext {
            rel_path,
            module_uid,
            is_package: crate::uid::is_package_file(rel_path),
            lang: Lang::Python,
            source_roots: &roots,
        };
        extract_with_grammar(tree.root_node(), source, Lang::Python.grammar(), &ctx)
    }

    #[test]
    fn test_classes_methods_and_nested_functions() {
        let source = r#""""Billing helpers."""

class Invoice:
    """An invoice."""

    def total(self, tax):
        return self.net * tax

def outer(a, b=1):
    def inner():
        return a
    return inner()
"#;
        let raw = extract(source, "src/billing.py", "billing");
        assert_eq!(raw.module_docstring.as_deref(), Some("Billing helpers."));

        let names: Vec<_> = raw.entities.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("Invoice", EntityKind::Class),
                ("total", EntityKind::Method),
                ("outer", EntityKind::Function),
                ("inner", EntityKind::Function),
            ]
        );

        let total = &raw.entities[1];
        assert_eq!(total.parent, Some(0));
        assert_eq!(total.parameters, vec!["tax"]);
        assert_eq!(raw.entities[0].docstring.as_deref(), Some("An invoice."));

        let inner = &raw.entities[3];
        assert_eq!(inner.parent, Some(2));
        assert_eq!(inner.path, vec!["<local>"]);
        assert_eq!(raw.entities[2].parameters, vec!["a", "b"]);
    }

    #[test]
    fn test_complexity_inputs_skip_nested_definitions() {
        let source = "def f(x):\n    if x and x > 1:\n        return 1\n    def g():\n        if x:\n            return 2\n    return 0\n";
        let raw = extract(source, "f.py", "f");
        // `if` plus `and`; the nested `if` belongs to g
        assert_eq!(raw.entities[0].metric_input.decisions, 2);
        assert_eq!(raw.entities[1].metric_input.decisions, 1);
    }

    #[test]
    fn test_decorators_and_async() {
        let source = "class A:\n    @property\n    def name(self):\n        return 1\n\n    @staticmethod\n    async def make():\n        pass\n";
        let raw = extract(source, "a.py", "a");
        assert_eq!(raw.entities[1].decorators, vec!["property"]);
        assert_eq!(raw.entities[2].decorators, vec!["staticmethod"]);
        assert!(raw.entities[2].modifiers.contains("async"));
        assert_eq!(raw.entities[1].lines.start, 2);
    }

    #[test]
    fn test_calls_are_attributed_to_innermost_entity() {
        let source = "import os\n\ndef f():\n    os.path.join('a')\n    g()\n\ng()\n";
        let raw = extract(source, "m.py", "m");
        let callees: Vec<_> = raw
            .calls
            .iter()
            .map(|c| (c.caller, c.callee.as_str()))
            .collect();
        assert!(callees.contains(&(Some(0), "os.path.join")));
        assert!(callees.contains(&(Some(0), "g")));
        assert!(callees.contains(&(None, "g")));
    }

    #[test]
    fn test_imports_absolute_relative_and_aliased() {
        let source = "import os.path\nimport numpy as np\nfrom .models import User as U, Order\nfrom .. import config\nfrom pkg.util import *\n";
        let raw = extract(source, "src/pkg/api/views.py", "pkg.api.views");
        let targets: Vec<_> = raw
            .imports
            .iter()
            .map(|i| (i.target.as_str(), i.relative))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("os.path", false),
                ("numpy", false),
                ("pkg.api.models.User", true),
                ("pkg.api.models.Order", true),
                ("pkg.config", true),
                ("pkg.util", false),
            ]
        );
        assert_eq!(raw.imports[0].bindings, vec![("os".to_string(), "os".to_string())]);
        assert_eq!(
            raw.imports[2].bindings,
            vec![("U".to_string(), "pkg.api.models.User".to_string())]
        );
    }

    #[test]
    fn test_private_names_are_not_exported() {
        let raw = extract("def _hidden():\n    pass\n\ndef __init__():\n    pass\n", "m.py", "m");
        assert!(!raw.entities[0].exported);
        assert!(raw.entities[1].exported);
    }
}
