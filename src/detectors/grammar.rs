//! Language Grammar Definitions
//!
//! This module defines the AST node mappings for each supported language.
//! Instead of duplicating the entity walk in each detector, we define
//! language-specific node names here and use a generic extractor.
//!
//! # Architecture
//!
//! Each language has a `LangGrammar` that maps structural concepts to
//! tree-sitter node kinds, plus a handful of hook functions for the parts
//! that cannot be expressed as a node list (imports, docstrings, names of
//! declarator-bound functions). The generic extractor in `generic.rs` uses
//! these mappings to build raw entities, calls and metric inputs.
//!
//! # Adding a New Language
//!
//! 1. Add a new `LangGrammar` constant (e.g., `GO_GRAMMAR`)
//! 2. Fill in the AST node kinds from the tree-sitter grammar
//! 3. Implement the visibility and hook functions
//! 4. Register it in `Lang::grammar`

use tree_sitter::Node;

use crate::detectors::common::get_node_text;
use crate::detectors::{javascript, python, rust, FileContext, RawImport};

/// Resolves the entity name of a function-like node, or `None` when the node
/// should not become an entity (anonymous callbacks, object-literal methods)
pub type FunctionNameFn = for<'t> fn(Node<'t>, &str) -> Option<String>;

/// Extracts the leading documentation of a definition.
/// Arguments: outermost wrapper node, definition node, body node, source.
pub type DocstringFn = for<'t> fn(Node<'t>, Node<'t>, Option<Node<'t>>, &str) -> Option<String>;

/// Extracts the module-level documentation from the root node
pub type ModuleDocFn = for<'t> fn(Node<'t>, &str) -> Option<String>;

/// Extracts and normalizes every import of a file
pub type ImportsFn = for<'t> fn(Node<'t>, &str, &FileContext) -> Vec<RawImport>;

/// Visibility rule. Arguments: definition node, outermost wrapper node, source.
pub type VisibilityFn = for<'t> fn(Node<'t>, Node<'t>, &str) -> bool;

/// Language-specific AST node mappings for structural extraction
#[derive(Debug, Clone)]
pub struct LangGrammar {
    /// Language identifier
    pub name: &'static str,

    // =========================================================================
    // Entity Detection
    // =========================================================================
    /// Function/method declaration nodes (resolved through `function_name`)
    /// e.g., ["function_definition", "method_definition", "function_item"]
    pub function_nodes: &'static [&'static str],

    /// Class-like declaration nodes with the flavour tag they carry
    /// e.g., [("struct_item", Some("struct")), ("class_definition", None)]
    pub class_nodes: &'static [(&'static str, Option<&'static str>)],

    /// Nodes that open a named namespace without being an entity (Rust inline `mod`)
    pub namespace_nodes: &'static [&'static str],

    /// Nodes that attach their functions to another type (Rust `impl`)
    pub impl_nodes: &'static [&'static str],

    /// Wrappers that belong to the definition they contain
    /// e.g., ["decorated_definition", "export_statement", "lexical_declaration"]
    pub wrapper_nodes: &'static [&'static str],

    // =========================================================================
    // Complexity
    // =========================================================================
    /// Nodes that add one decision point each
    pub decision_nodes: &'static [&'static str],

    /// Binary operator nodes checked for short-circuit operators
    pub boolean_nodes: &'static [&'static str],

    /// Short-circuit operators counted as decision points
    pub logical_operators: &'static [&'static str],

    /// Comment node kinds (ignored for token counts)
    pub comment_nodes: &'static [&'static str],

    /// Prefixes marking a comment-only source line
    pub line_comment_prefixes: &'static [&'static str],

    // =========================================================================
    // Calls and Imports
    // =========================================================================
    /// Function/method call nodes, paired with the field holding the callee
    /// e.g., [("call_expression", "function"), ("new_expression", "constructor")]
    pub call_nodes: &'static [(&'static str, &'static str)],

    /// Import statement nodes
    pub import_nodes: &'static [&'static str],

    // =========================================================================
    // Field Names for Child Access
    // =========================================================================
    /// Field name for symbol/function name
    pub name_field: &'static str,

    /// Field name for function/block body
    pub body_field: &'static str,

    /// Field name for function parameters
    pub params_field: &'static str,

    /// Parameter node kinds that denote the receiver (`&self`)
    pub receiver_nodes: &'static [&'static str],

    /// Parameter names that denote the receiver (`self`, `cls`)
    pub receiver_names: &'static [&'static str],

    /// Keyword tokens recorded as modifiers when they appear on a definition
    pub modifier_tokens: &'static [&'static str],

    /// Decorator/attribute nodes (Python decorators, Rust attributes, TS decorators)
    pub decorator_nodes: &'static [&'static str],

    // =========================================================================
    // Hooks
    // =========================================================================
    pub is_exported: VisibilityFn,
    pub function_name: FunctionNameFn,
    pub docstring: DocstringFn,
    pub module_docstring: ModuleDocFn,
    pub imports: ImportsFn,
}

impl LangGrammar {
    pub fn is_function_node(&self, kind: &str) -> bool {
        self.function_nodes.contains(&kind)
    }

    /// Flavour tag of a class-like node, `None` when the node is not class-like
    pub fn class_flavour(&self, kind: &str) -> Option<Option<&'static str>> {
        self.class_nodes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, flavour)| *flavour)
    }

    pub fn is_definition_node(&self, kind: &str) -> bool {
        self.is_function_node(kind) || self.class_flavour(kind).is_some()
    }

    /// Field holding the callee expression if `kind` is a call node
    pub fn callee_field(&self, kind: &str) -> Option<&'static str> {
        self.call_nodes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, field)| *field)
    }
}

// =============================================================================
// Visibility Checker Functions
// =============================================================================

/// Rust: has `pub` visibility modifier; trait items and trait impls follow the trait
pub fn rust_is_exported(node: Node, _outer: Node, source: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            let text = child.utf8_text(source.as_bytes()).unwrap_or("");
            return text.starts_with("pub");
        }
    }
    let container = node.parent().and_then(|list| list.parent());
    match container {
        Some(c) if c.kind() == "trait_item" => rust_is_exported(c, c, source),
        Some(c) if c.kind() == "impl_item" => c.child_by_field_name("trait").is_some(),
        _ => false,
    }
}

/// Python: no underscore prefix = public (dunder names count as public)
pub fn python_is_exported(node: Node, _outer: Node, source: &str) -> bool {
    if let Some(name_node) = node.child_by_field_name("name") {
        let name = name_node.utf8_text(source.as_bytes()).unwrap_or("");
        !name.starts_with('_') || (name.starts_with("__") && name.ends_with("__"))
    } else {
        true
    }
}

/// JavaScript/TypeScript: module members need `export`; class members are
/// public unless `#private`, `_private` or marked `private`/`protected`
pub fn js_is_exported(node: Node, outer: Node, source: &str) -> bool {
    let in_class_body = node
        .parent()
        .map(|p| p.kind() == "class_body")
        .unwrap_or(false);
    if in_class_body {
        let name = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("property"))
            .map(|n| get_node_text(&n, source))
            .unwrap_or_default();
        if name.starts_with('#') || name.starts_with('_') {
            return false;
        }
        let mut cursor = node.walk();
        let hidden = node.children(&mut cursor).any(|c| {
            c.kind() == "accessibility_modifier" && {
                let text = get_node_text(&c, source);
                text == "private" || text == "protected"
            }
        });
        return !hidden;
    }
    if outer.kind() == "export_statement" {
        return true;
    }
    outer
        .parent()
        .map(|p| p.kind() == "export_statement")
        .unwrap_or(false)
}

// =============================================================================
// Language Grammar Definitions
// =============================================================================

pub static RUST_GRAMMAR: LangGrammar = LangGrammar {
    name: "rust",
    function_nodes: &["function_item", "function_signature_item"],
    class_nodes: &[
        ("struct_item", Some("struct")),
        ("enum_item", Some("enum")),
        ("trait_item", Some("trait")),
        ("union_item", Some("struct")),
    ],
    namespace_nodes: &["mod_item"],
    impl_nodes: &["impl_item"],
    wrapper_nodes: &[],
    decision_nodes: &[
        "if_expression",
        "while_expression",
        "for_expression",
        "match_arm",
    ],
    boolean_nodes: &["binary_expression"],
    logical_operators: &["&&", "||"],
    comment_nodes: &["line_comment", "block_comment"],
    line_comment_prefixes: &["//", "/*", "*"],
    call_nodes: &[("call_expression", "function")],
    import_nodes: &["use_declaration", "mod_item"],
    name_field: "name",
    body_field: "body",
    params_field: "parameters",
    receiver_nodes: &["self_parameter"],
    receiver_names: &["self"],
    modifier_tokens: &["async", "unsafe", "const"],
    decorator_nodes: &["attribute_item"],
    is_exported: rust_is_exported,
    function_name: rust::function_name,
    docstring: rust::docstring,
    module_docstring: rust::module_docstring,
    imports: rust::imports,
};

pub static PYTHON_GRAMMAR: LangGrammar = LangGrammar {
    name: "python",
    function_nodes: &["function_definition"],
    class_nodes: &[("class_definition", None)],
    namespace_nodes: &[],
    impl_nodes: &[],
    wrapper_nodes: &["decorated_definition"],
    decision_nodes: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "conditional_expression",
        "case_clause",
        "for_in_clause",
        "if_clause",
    ],
    boolean_nodes: &["boolean_operator"],
    logical_operators: &["and", "or"],
    comment_nodes: &["comment"],
    line_comment_prefixes: &["#"],
    call_nodes: &[("call", "function")],
    import_nodes: &["import_statement", "import_from_statement"],
    name_field: "name",
    body_field: "body",
    params_field: "parameters",
    receiver_nodes: &[],
    receiver_names: &["self", "cls"],
    modifier_tokens: &["async"],
    decorator_nodes: &["decorator"],
    is_exported: python_is_exported,
    function_name: python::function_name,
    docstring: python::docstring,
    module_docstring: python::module_docstring,
    imports: python::imports,
};

pub static JAVASCRIPT_GRAMMAR: LangGrammar = LangGrammar {
    name: "javascript",
    function_nodes: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
        "variable_declarator",
        "field_definition",
    ],
    class_nodes: &[("class_declaration", None)],
    namespace_nodes: &[],
    impl_nodes: &[],
    wrapper_nodes: &["export_statement", "lexical_declaration", "variable_declaration"],
    decision_nodes: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "switch_case",
        "catch_clause",
        "ternary_expression",
    ],
    boolean_nodes: &["binary_expression"],
    logical_operators: &["&&", "||", "??"],
    comment_nodes: &["comment"],
    line_comment_prefixes: &["//", "/*", "*"],
    call_nodes: &[
        ("call_expression", "function"),
        ("new_expression", "constructor"),
    ],
    import_nodes: &["import_statement"],
    name_field: "name",
    body_field: "body",
    params_field: "parameters",
    receiver_nodes: &[],
    receiver_names: &[],
    modifier_tokens: &["async", "static", "get", "set", "*"],
    decorator_nodes: &["decorator"],
    is_exported: js_is_exported,
    function_name: javascript::function_name,
    docstring: javascript::docstring,
    module_docstring: javascript::module_docstring,
    imports: javascript::imports,
};

pub static TYPESCRIPT_GRAMMAR: LangGrammar = LangGrammar {
    name: "typescript",
    function_nodes: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
        "variable_declarator",
        "public_field_definition",
    ],
    class_nodes: &[
        ("class_declaration", None),
        ("abstract_class_declaration", Some("abstract")),
        ("interface_declaration", Some("interface")),
        ("enum_declaration", Some("enum")),
    ],
    namespace_nodes: &["internal_module"],
    impl_nodes: &[],
    wrapper_nodes: &["export_statement", "lexical_declaration", "variable_declaration"],
    decision_nodes: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "switch_case",
        "catch_clause",
        "ternary_expression",
    ],
    boolean_nodes: &["binary_expression"],
    logical_operators: &["&&", "||", "??"],
    comment_nodes: &["comment"],
    line_comment_prefixes: &["//", "/*", "*"],
    call_nodes: &[
        ("call_expression", "function"),
        ("new_expression", "constructor"),
    ],
    import_nodes: &["import_statement"],
    name_field: "name",
    body_field: "body",
    params_field: "parameters",
    receiver_nodes: &[],
    receiver_names: &["this"],
    modifier_tokens: &["async", "static", "abstract", "readonly", "get", "set", "*"],
    decorator_nodes: &["decorator"],
    is_exported: js_is_exported,
    function_name: javascript::function_name,
    docstring: javascript::docstring,
    module_docstring: javascript::module_docstring,
    imports: javascript::imports,
};

// =============================================================================
// Grammar Lookup
// =============================================================================

/// Get the grammar for a language by name
pub fn get_grammar(lang_name: &str) -> Option<&'static LangGrammar> {
    match lang_name.to_lowercase().as_str() {
        "rust" | "rs" => Some(&RUST_GRAMMAR),
        "python" | "py" => Some(&PYTHON_GRAMMAR),
        "javascript" | "js" | "jsx" => Some(&JAVASCRIPT_GRAMMAR),
        "typescript" | "ts" | "tsx" => Some(&TYPESCRIPT_GRAMMAR),
        _ => None,
    }
}
