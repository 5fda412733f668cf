//! Language detection and tree-sitter grammar loading

use std::path::Path;
use tree_sitter::Language;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detectors::grammar::{
    LangGrammar, JAVASCRIPT_GRAMMAR, PYTHON_GRAMMAR, RUST_GRAMMAR, TYPESCRIPT_GRAMMAR,
};

/// Supported programming languages
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
}

impl Lang {
    /// Detect language from file path extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Self::from_extension(ext)
    }

    /// Detect language from file extension string
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "rs" => Some(Self::Rust),
            _ => None,
        }
    }

    /// Get the canonical name of the language
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Rust => "rust",
        }
    }

    /// Get the tree-sitter Language for parsing
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// Node-kind table used by the generic extractor
    pub fn grammar(&self) -> &'static LangGrammar {
        match self {
            Self::Python => &PYTHON_GRAMMAR,
            Self::JavaScript => &JAVASCRIPT_GRAMMAR,
            Self::TypeScript | Self::Tsx => &TYPESCRIPT_GRAMMAR,
            Self::Rust => &RUST_GRAMMAR,
        }
    }

    /// File stems that stand for their enclosing directory (package-init files)
    pub fn init_stems(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["__init__"],
            Self::JavaScript | Self::TypeScript | Self::Tsx => &["index"],
            Self::Rust => &["mod", "lib"],
        }
    }

    /// Whether this file stem is a package-init file for this language
    pub fn is_init_stem(&self, stem: &str) -> bool {
        self.init_stems().contains(&stem)
    }

    /// Check whether the language shares the JavaScript/TypeScript family rules
    pub fn is_js_family(&self) -> bool {
        matches!(self, Self::JavaScript | Self::TypeScript | Self::Tsx)
    }

    /// Get common file extensions for this language
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py", "pyi"],
            Self::JavaScript => &["js", "mjs", "cjs", "jsx"],
            Self::TypeScript => &["ts", "mts", "cts"],
            Self::Tsx => &["tsx"],
            Self::Rust => &["rs"],
        }
    }

    /// All supported languages, in registry order
    pub fn all() -> &'static [Lang] {
        &[
            Self::Python,
            Self::JavaScript,
            Self::TypeScript,
            Self::Tsx,
            Self::Rust,
        ]
    }
}

/// Check whether a path has an extension handled by some language
pub fn is_supported_file(path: &Path) -> bool {
    Lang::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Lang::from_extension("py"), Some(Lang::Python));
        assert_eq!(Lang::from_extension("PY"), Some(Lang::Python));
        assert_eq!(Lang::from_extension("jsx"), Some(Lang::JavaScript));
        assert_eq!(Lang::from_extension("mts"), Some(Lang::TypeScript));
        assert_eq!(Lang::from_extension("tsx"), Some(Lang::Tsx));
        assert_eq!(Lang::from_extension("rs"), Some(Lang::Rust));
        assert_eq!(Lang::from_extension("go"), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Lang::from_path(Path::new("pkg/mod.py")), Some(Lang::Python));
        assert_eq!(Lang::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_extensions_round_trip_through_registry() {
        for lang in Lang::all() {
            for ext in lang.extensions() {
                assert_eq!(Lang::from_extension(ext), Some(*lang), "extension {}", ext);
            }
        }
    }

    #[test]
    fn test_init_stems() {
        assert!(Lang::Python.is_init_stem("__init__"));
        assert!(Lang::TypeScript.is_init_stem("index"));
        assert!(Lang::Rust.is_init_stem("mod"));
        assert!(!Lang::Python.is_init_stem("index"));
    }

    #[test]
    fn test_grammar_for_tsx_shares_typescript_table() {
        assert_eq!(Lang::Tsx.grammar().name, "typescript");
    }
}
