//! Rust language hooks
//!
//! `use` trees are flattened into one import per leaf path. `crate::`,
//! `self::` and `super::` paths and out-of-line `mod foo;` declarations are
//! resolved to module uids and marked relative.

use tree_sitter::Node;

use crate::detectors::common::{clean_block_comment, first_paragraph, get_node_text, named_children, visit_all};
use crate::detectors::{FileContext, RawImport};
use crate::uid::{join_module, parent_module, ROOT_MODULE_UID};

pub fn function_name(node: Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| get_node_text(&n, source))
}

/// `///` lines (or a `/** */` block) above the item, attributes in between skipped
pub fn docstring(outer: Node, _def: Node, _body: Option<Node>, source: &str) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut prev = outer.prev_sibling();
    while let Some(p) = prev {
        match p.kind() {
            "attribute_item" => {}
            "line_comment" => {
                let text = get_node_text(&p, source);
                match outer_doc_line(&text) {
                    Some(line) => lines.push(line),
                    None => break,
                }
            }
            "block_comment" => {
                let text = get_node_text(&p, source);
                if text.starts_with("/**") && !text.starts_with("/***") {
                    lines.extend(clean_block_comment(&text).into_iter().rev());
                }
                break;
            }
            _ => break,
        }
        prev = p.prev_sibling();
    }
    lines.reverse();
    first_paragraph(&lines)
}

fn outer_doc_line(text: &str) -> Option<String> {
    let trimmed = text.trim_end();
    if trimmed.starts_with("////") {
        return None;
    }
    trimmed
        .strip_prefix("///")
        .map(|rest| rest.trim().to_string())
}

/// Leading `//!` lines or `/*! */` block of the file
pub fn module_docstring(root: Node, source: &str) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    for child in named_children(&root) {
        let text = get_node_text(&child, source);
        match child.kind() {
            "line_comment" => match text.trim_end().strip_prefix("//!") {
                Some(rest) => lines.push(rest.trim().to_string()),
                None => break,
            },
            "block_comment" if text.starts_with("/*!") => {
                let inner = text.trim_start_matches("/*!");
                lines.extend(clean_block_comment(&format!("/*{}", inner)));
                break;
            }
            _ => break,
        }
    }
    first_paragraph(&lines)
}

// ============================================================================
// Imports
// ============================================================================

/// One flattened leaf of a `use` tree
struct UseLeaf {
    path: Vec<String>,
    alias: Option<String>,
    wildcard: bool,
}

pub fn imports(root: Node, source: &str, ctx: &FileContext) -> Vec<RawImport> {
    let mut out = Vec::new();
    visit_all(&root, |node| match node.kind() {
        "use_declaration" => {
            let Some(argument) = node.child_by_field_name("argument") else {
                return;
            };
            let mut leaves = Vec::new();
            expand_use(argument, &[], source, &mut leaves);
            out.extend(leaves.into_iter().filter_map(|leaf| leaf_import(leaf, ctx)));
        }
        "mod_item" if node.child_by_field_name("body").is_none() => {
            if let Some(name) = node.child_by_field_name("name") {
                let name = get_node_text(&name, source);
                let target = join_module(&child_module_base(ctx), &name);
                out.push(RawImport::new(target.clone(), true).bind(name, target));
            }
        }
        _ => {}
    });
    out
}

fn split_path(text: &str) -> Vec<String> {
    text.split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn expand_use(node: Node, prefix: &[String], source: &str, out: &mut Vec<UseLeaf>) {
    let with_prefix = |segments: Vec<String>| {
        let mut path = prefix.to_vec();
        path.extend(segments);
        path
    };
    match node.kind() {
        "use_as_clause" => {
            let path = node
                .child_by_field_name("path")
                .map(|p| split_path(&get_node_text(&p, source)))
                .unwrap_or_default();
            let alias = node.child_by_field_name("alias").map(|a| get_node_text(&a, source));
            out.push(UseLeaf {
                path: with_prefix(path),
                alias,
                wildcard: false,
            });
        }
        "scoped_use_list" => {
            let inner_prefix = node
                .child_by_field_name("path")
                .map(|p| with_prefix(split_path(&get_node_text(&p, source))))
                .unwrap_or_else(|| prefix.to_vec());
            if let Some(list) = node.child_by_field_name("list") {
                expand_use(list, &inner_prefix, source, out);
            }
        }
        "use_list" => {
            for item in named_children(&node) {
                expand_use(item, prefix, source, out);
            }
        }
        "use_wildcard" => {
            let text = get_node_text(&node, source);
            let path = split_path(text.trim_end_matches('*'));
            out.push(UseLeaf {
                path: with_prefix(path),
                alias: None,
                wildcard: true,
            });
        }
        "self" if !prefix.is_empty() => out.push(UseLeaf {
            path: prefix.to_vec(),
            alias: None,
            wildcard: false,
        }),
        "line_comment" | "block_comment" => {}
        _ => out.push(UseLeaf {
            path: with_prefix(split_path(&get_node_text(&node, source))),
            alias: None,
            wildcard: false,
        }),
    }
}

fn leaf_import(leaf: UseLeaf, ctx: &FileContext) -> Option<RawImport> {
    let (head, rest) = leaf.path.split_first()?;
    let (base, rest, relative): (String, &[String], bool) = match head.as_str() {
        "crate" => (ROOT_MODULE_UID.to_string(), rest, true),
        "self" => (ctx.module_uid.to_string(), rest, true),
        "super" => {
            let mut base = parent_module(ctx.module_uid);
            let mut rest = rest;
            while let Some((next, tail)) = rest.split_first() {
                if next != "super" {
                    break;
                }
                base = parent_module(&base);
                rest = tail;
            }
            (base, rest, true)
        }
        _ => (String::new(), leaf.path.as_slice(), false),
    };

    let target = if relative {
        join_module(&base, &rest.join("."))
    } else {
        rest.join(".")
    };
    if target.is_empty() {
        return None;
    }

    let import = RawImport::new(target.clone(), relative);
    if leaf.wildcard {
        return Some(import);
    }
    let local = leaf
        .alias
        .or_else(|| leaf.path.last().cloned())
        .filter(|l| l != "_" && l != "crate" && l != "self" && l != "super")?;
    Some(import.bind(local, target))
}

/// Module that `mod foo;` declarations in this file are children of.
/// `main.rs` at a source root is a crate root like `lib.rs`.
fn child_module_base(ctx: &FileContext) -> String {
    let file_name = ctx.rel_path.rsplit('/').next().unwrap_or(ctx.rel_path);
    if file_name == "main.rs" && !ctx.module_uid.contains('.') {
        ROOT_MODULE_UID.to_string()
    } else {
        ctx.module_uid.to_string()
    }
}
