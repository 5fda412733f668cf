//! Common utilities shared across all language detectors
//!
//! This module provides helper functions for AST traversal, text extraction
//! and documentation cleanup that are language-agnostic.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

/// Longest docstring excerpt kept as a summary
pub const MAX_DOC_CHARS: usize = 240;

static CALLEE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$").ok()
});

// ============================================================================
// Text Extraction
// ============================================================================

/// Get text content of a node
pub fn get_node_text(node: &Node, source: &str) -> String {
    node.utf8_text(source.as_bytes())
        .unwrap_or("")
        .to_string()
}

/// Get text content of a node, normalized to single line (collapse whitespace)
pub fn get_node_text_normalized(node: &Node, source: &str) -> String {
    normalize_whitespace(&get_node_text(node, source))
}

/// Normalize whitespace: collapse multiple spaces/newlines to single space
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` bytes without splitting a character
pub fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Declaration header: text from the start of `decl` up to its body,
/// whitespace-collapsed, without the trailing `:` / `{` / `;`
pub fn header_text(decl: &Node, body: Option<&Node>, source: &str) -> String {
    let start = decl.start_byte();
    let end = body
        .map(|b| b.start_byte())
        .filter(|&e| e > start)
        .unwrap_or_else(|| decl.end_byte());
    let raw = source.get(start..end).unwrap_or("");
    normalize_whitespace(raw)
        .trim_end_matches(|c: char| c == ':' || c == '{' || c == ';' || c.is_whitespace())
        .to_string()
}

/// Normalize a callee expression to dotted form (`a::b` and `a?.b` become `a.b`).
/// Returns `None` for anything that is not a plain name chain, such as
/// `foo()()`, `items[0]()` or turbofish paths.
pub fn normalize_callee(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let dotted = compact.replace("?.", ".").replace("::", ".");
    let plain = CALLEE_PATTERN
        .as_ref()
        .map(|re| re.is_match(&dotted))
        .unwrap_or(false);
    if plain {
        Some(dotted)
    } else {
        None
    }
}

// ============================================================================
// Documentation
// ============================================================================

/// First paragraph of a cleaned doc block, joined to one line and capped
pub fn first_paragraph(lines: &[String]) -> Option<String> {
    let mut paragraph: Vec<&str> = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if paragraph.is_empty() {
                continue;
            }
            break;
        }
        paragraph.push(trimmed);
    }
    if paragraph.is_empty() {
        return None;
    }
    let joined = normalize_whitespace(&paragraph.join(" "));
    if joined.len() > MAX_DOC_CHARS {
        let cut = truncate_to_char_boundary(&joined, MAX_DOC_CHARS - 3);
        Some(format!("{}...", cut.trim_end()))
    } else {
        Some(joined)
    }
}

/// Strip `/** ... */` markers and leading `*` from a block comment
pub fn clean_block_comment(text: &str) -> Vec<String> {
    let inner = text
        .trim()
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_end_matches("*/");
    inner
        .lines()
        .map(|l| {
            let l = l.trim();
            l.strip_prefix('*').unwrap_or(l).trim().to_string()
        })
        .filter(|l| !l.starts_with('@'))
        .collect()
}

// ============================================================================
// AST Traversal
// ============================================================================

/// Visit all nodes in a tree with a visitor function (iterative to avoid stack overflow)
pub fn visit_all<F>(node: &Node, mut visitor: F)
where
    F: FnMut(&Node),
{
    let mut cursor = node.walk();
    let mut did_visit_children = false;

    loop {
        if !did_visit_children {
            visitor(&cursor.node());

            if cursor.goto_first_child() {
                did_visit_children = false;
                continue;
            }
        }

        if cursor.goto_next_sibling() {
            did_visit_children = false;
            continue;
        }

        if !cursor.goto_parent() || cursor.node().id() == node.id() {
            break;
        }
        did_visit_children = true;
    }
}

/// Visit the subtree of `node` without descending into nodes for which
/// `prune` returns true (the pruned node itself is not visited either;
/// `node` is always visited)
pub fn visit_pruned<F, P>(node: &Node, mut visitor: F, prune: P)
where
    F: FnMut(&Node),
    P: Fn(&Node) -> bool,
{
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        if current.id() != node.id() && prune(&current) {
            continue;
        }
        visitor(&current);
        let mut cursor = current.walk();
        let children: Vec<Node> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}

/// Named children of a node, collected
pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Count non-blank lines that are not comment-only
pub fn count_code_lines(text: &str, comment_prefixes: &[&str]) -> u32 {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !comment_prefixes.iter().any(|p| l.starts_with(p)))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("def  f(\n    a,\n    b)"), "def f( a, b)");
    }

    #[test]
    fn test_normalize_callee() {
        assert_eq!(normalize_callee("self.save"), Some("self.save".into()));
        assert_eq!(normalize_callee("crate::util::load"), Some("crate.util.load".into()));
        assert_eq!(normalize_callee("user?.name"), Some("user.name".into()));
        assert_eq!(normalize_callee("items[0]"), None);
        assert_eq!(normalize_callee("make()"), None);
        assert_eq!(normalize_callee("Vec::<u8>::new"), None);
    }

    #[test]
    fn test_first_paragraph_stops_at_blank_line() {
        let lines: Vec<String> = vec!["", "Load the config.", "Falls back to defaults.", "", "Details."]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            first_paragraph(&lines).as_deref(),
            Some("Load the config. Falls back to defaults.")
        );
    }

    #[test]
    fn test_first_paragraph_caps_length() {
        let lines = vec!["word ".repeat(100)];
        let text = first_paragraph(&lines).unwrap();
        assert!(text.len() <= MAX_DOC_CHARS);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_clean_block_comment() {
        let lines = clean_block_comment("/**\n * Adds numbers.\n * @param a first\n */");
        assert_eq!(first_paragraph(&lines).as_deref(), Some("Adds numbers."));
    }

    #[test]
    fn test_count_code_lines() {
        let text = "def f():\n\n    # note\n    return 1\n";
        assert_eq!(count_code_lines(text, &["#"]), 2);
    }

    #[test]
    fn test_truncate_to_char_boundary() {
        assert_eq!(truncate_to_char_boundary("héllo", 2), "h");
        assert_eq!(truncate_to_char_boundary("abc", 10), "abc");
    }
}
