//! Parser Adapter entry point.
//!
//! Selects the language from the file extension, parses with tree-sitter and
//! runs the grammar-driven extractor. A file that cannot be decoded or whose
//! tree contains syntax errors yields a [`ParseError`] value and no entities;
//! callers collect these without aborting the run.
//!
//! # Example
//!
//! ```ignore
//! use codestruct::parsing::parse_source;
//!
//! let parsed = parse_source("src/util.py", b"def load():\n    pass\n", &roots)?;
//! assert_eq!(parsed.module_uid, "util");
//! ```

use crate::detectors::generic::extract_with_grammar;
use crate::detectors::{FileContext, RawFile};
use crate::lang::Lang;
use crate::schema::ParseError;
use crate::uid::{is_package_file, module_uid};

/// A successfully parsed source file
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub rel_path: String,
    pub module_uid: String,
    pub is_package: bool,
    pub raw: RawFile,
}

/// Parse one file's bytes. `rel_path` is project-relative and `/`-separated.
pub fn parse_source(rel_path: &str, bytes: &[u8], roots: &[String]) -> Result<ParsedFile, ParseError> {
    let fail = |reason: String| ParseError {
        file: rel_path.to_string(),
        reason,
    };

    let lang = Lang::from_path(std::path::Path::new(rel_path))
        .ok_or_else(|| fail("unsupported file extension".to_string()))?;
    let source = std::str::from_utf8(bytes)
        .map_err(|e| fail(format!("not valid UTF-8: {}", e)))?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|e| fail(format!("failed to load {} grammar: {:?}", lang.name(), e)))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| fail("parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(fail(first_error_location(root)));
    }

    let module_uid = module_uid(rel_path, roots);
    let is_package = is_package_file(rel_path);
    let ctx = FileContext {
        rel_path,
        module_uid: &module_uid,
        is_package,
        lang,
        source_roots: roots,
    };
    let raw = extract_with_grammar(root, source, lang.grammar(), &ctx);

    Ok(ParsedFile {
        rel_path: rel_path.to_string(),
        module_uid,
        is_package,
        raw,
    })
}

/// Human-readable position of the first ERROR or MISSING node
fn first_error_location(root: tree_sitter::Node) -> String {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return format!("syntax error at line {}, column {}", pos.row + 1, pos.column + 1);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    "syntax error".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> Vec<String> {
        vec!["src".to_string()]
    }

    #[test]
    fn test_parse_python() {
        let parsed = parse_source("src/greet.py", b"def say_hello():\n    return 'hello'\n", &roots()).unwrap();
        assert_eq!(parsed.module_uid, "greet");
        assert_eq!(parsed.raw.entities.len(), 1);
        assert_eq!(parsed.raw.entities[0].name, "say_hello");
    }

    #[test]
    fn test_parse_typescript() {
        let parsed = parse_source(
            "src/hello.ts",
            b"export function hello(): string { return 'world'; }",
            &roots(),
        )
        .unwrap();
        assert_eq!(parsed.raw.entities[0].name, "hello");
    }

    #[test]
    fn test_parse_rust_package_file() {
        let parsed = parse_source("src/net/mod.rs", b"pub fn greet() -> &'static str { \"hi\" }", &roots()).unwrap();
        assert_eq!(parsed.module_uid, "net");
        assert!(parsed.is_package);
    }

    #[test]
    fn test_syntax_error_is_a_parse_error() {
        let err = parse_source("src/bad.ts", b"function { invalid syntax", &roots()).unwrap_err();
        assert_eq!(err.file, "src/bad.ts");
        assert!(err.reason.contains("syntax error"), "{}", err.reason);
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let err = parse_source("src/bin.py", &[0x66, 0xff, 0xfe], &roots()).unwrap_err();
        assert!(err.reason.contains("UTF-8"));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(parse_source("README.md", b"# hi", &roots()).is_err());
    }
}
