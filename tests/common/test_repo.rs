//! TestRepo builder for integration testing
//!
//! A repository is a temp directory holding source files; its structure
//! directory defaults to `<repo>/struct`, which discovery skips.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

use codestruct::config::StructConfig;
use codestruct::indexing::{rebuild, RebuildOptions, RebuildReport};

/// Builder for creating test repository structures
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new empty test repository
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the path to the test repository root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get path as string
    pub fn path_str(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    /// Default structure directory
    pub fn struct_dir(&self) -> PathBuf {
        self.dir.path().join("struct")
    }

    /// Add a source file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Remove a source file
    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.dir.path().join(relative_path)).expect("Failed to remove file");
        self
    }

    /// Add a Python function, with or without a docstring
    pub fn add_py_function(&self, path: &str, name: &str, body: &str) -> &Self {
        self.add_file(path, &format!("def {}():\n    {}\n", name, body))
    }

    // ========================================================================
    // PRE-BUILT REPO STRUCTURES
    // ========================================================================

    /// A small Python package with imports, methods and a test module
    pub fn with_python_package(&self) -> &Self {
        self.add_file(
            "src/shop/__init__.py",
            "\"\"\"Shop package.\"\"\"\n",
        )
        .add_file(
            "src/shop/models.py",
            r#""""Domain models."""


class Order:
    """A customer order."""

    def __init__(self, items):
        self.items = items

    def total(self):
        """Sum of item prices."""
        return sum(item.price for item in self.items)
"#,
        )
        .add_file(
            "src/shop/pricing.py",
            r#""""Price rules."""
from shop.models import Order


def discounted_total(order, rate):
    """Total after applying a discount rate."""
    if rate <= 0:
        return order.total()
    return order.total() * (1 - rate)
"#,
        )
        .add_file(
            "tests/test_pricing.py",
            r#"from shop.pricing import discounted_total
from shop.models import Order


def test_discount():
    order = Order([])
    assert discounted_total(order, 0.1) == 0
"#,
        )
    }

    /// Independent modules with no links between them
    pub fn with_independent_modules(&self) -> &Self {
        self.add_file("alpha.py", "def first():\n    return 1\n")
            .add_file("beta.py", "def second():\n    return 2\n")
            .add_file("gamma.py", "def third():\n    return 3\n")
    }

    // ========================================================================
    // LIBRARY AND CLI DRIVERS
    // ========================================================================

    /// Run a rebuild through the library with default configuration
    pub fn generate(&self, incremental: bool) -> RebuildReport {
        let options = RebuildOptions {
            root: self.path().to_path_buf(),
            out: self.struct_dir(),
            incremental,
            config: StructConfig::default(),
            generator: None,
        };
        rebuild(&options, None).expect("rebuild failed")
    }

    /// Read a file under the structure directory
    pub fn read_struct_file(&self, relative: &str) -> String {
        fs::read_to_string(self.struct_dir().join(relative))
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative, e))
    }

    /// Parse a JSON document under the structure directory
    pub fn read_struct_json(&self, relative: &str) -> Value {
        serde_json::from_str(&self.read_struct_file(relative))
            .unwrap_or_else(|e| panic!("{} is not JSON: {}", relative, e))
    }

    /// Shard path of a module as recorded in the committed index
    pub fn shard_path(&self, uid: &str) -> String {
        let index = self.read_struct_json("index.json");
        index["modules"][uid]["shard_path"]
            .as_str()
            .unwrap_or_else(|| panic!("{} has no shard in the index", uid))
            .to_string()
    }

    /// Overwrite a JSON document under the structure directory
    pub fn write_struct_json(&self, relative: &str, value: &Value) {
        let text = serde_json::to_string_pretty(value).expect("serialize");
        fs::write(self.struct_dir().join(relative), text).expect("Failed to write struct file");
    }

    /// Run the codestruct binary in this repo
    pub fn run_cli(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new(env!("CARGO_BIN_EXE_codestruct"))
            .current_dir(self.path())
            .env_remove("CODESTRUCT_LOG")
            .env_remove("CODESTRUCT_CONFIG")
            .args(args)
            .output()
    }

    /// Run CLI and expect success, return stdout
    pub fn run_cli_success(&self, args: &[&str]) -> String {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            output.status.success(),
            "CLI command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Run CLI and return (exit code, stdout, stderr)
    pub fn run_cli_status(&self, args: &[&str]) -> (i32, String, String) {
        let output = self.run_cli(args).expect("Failed to run CLI");
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
