//! codestruct configuration management.
//!
//! Looked up, first hit wins:
//! - the path given with `--config`
//! - `<root>/codestruct.toml`
//! - `~/.config/codestruct/config.toml` (platform config dir)
//!
//! Every field has a default, so an empty or missing file is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StructError};
use crate::validate::Level;

/// File name looked up at the project root
pub const PROJECT_CONFIG_FILE: &str = "codestruct.toml";

/// codestruct configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StructConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source discovery and uid normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Directory prefixes stripped from module uids (first match wins)
    #[serde(default = "default_source_roots")]
    pub roots: Vec<String>,

    /// Glob patterns excluded from discovery, relative to the project root
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Honor .gitignore / .ignore files during discovery
    #[serde(default = "default_true")]
    pub follow_gitignore: bool,
}

fn default_source_roots() -> Vec<String> {
    vec!["src".to_string(), "lib".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            roots: default_source_roots(),
            exclude: Vec::new(),
            follow_gitignore: true,
        }
    }
}

/// Which summary generator, if any, backs the middle tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryProvider {
    #[default]
    None,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryConfig {
    #[serde(default)]
    pub provider: SummaryProvider,

    /// Endpoint accepting `{model, code}` and answering `{summary}`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Environment variable holding a bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive failures after which the generator is skipped for the rest of the build
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,

    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_max_failures() -> usize {
    5
}

fn default_max_snippet_chars() -> usize {
    4000
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            provider: SummaryProvider::None,
            endpoint: None,
            model: None,
            api_key_env: None,
            timeout_ms: default_timeout_ms(),
            max_failures: default_max_failures(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

impl SummaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Thresholds used by the convention checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationConfig {
    #[serde(default)]
    pub default_level: Level,

    #[serde(default = "default_max_function_loc")]
    pub max_function_loc: u32,

    #[serde(default = "default_max_parameters")]
    pub max_parameters: u32,

    #[serde(default = "default_max_complexity")]
    pub max_complexity: u32,
}

fn default_max_function_loc() -> u32 {
    60
}

fn default_max_parameters() -> u32 {
    5
}

fn default_max_complexity() -> u32 {
    10
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            default_level: Level::default(),
            max_function_loc: default_max_function_loc(),
            max_parameters: default_max_parameters(),
            max_complexity: default_max_complexity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Worker threads for parsing (0 = one per core)
    #[serde(default)]
    pub jobs: usize,

    /// Age after which a leftover lock file is taken over
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
}

fn default_lock_stale_secs() -> u64 {
    3600
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            lock_stale_secs: default_lock_stale_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl StructConfig {
    /// Resolve and load the configuration for a project root
    pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(StructError::Config {
                    message: format!("config file {} does not exist", path.display()),
                });
            }
            return Self::load_from(path);
        }

        let project = root.join(PROJECT_CONFIG_FILE);
        if project.exists() {
            return Self::load_from(&project);
        }

        match Self::user_config_path() {
            Some(user) if user.exists() => Self::load_from(&user),
            _ => Ok(Self::default()),
        }
    }

    /// Platform config location (`~/.config/codestruct/config.toml` on Linux)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("codestruct").join("config.toml"))
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| StructError::io(path, e))?;
        Self::parse(&content).map_err(|e| StructError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = StructConfig::default();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.source.roots, vec!["src", "lib"]);
        assert_eq!(config.summary.provider, SummaryProvider::None);
        assert_eq!(config.validation.max_parameters, 5);
        assert_eq!(config.build.lock_stale_secs, 3600);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = StructConfig::parse(
            r#"
[validation]
max_complexity = 7
default_level = "strict"

[summary]
provider = "http"
endpoint = "http://localhost:9000/summarize"
"#,
        )
        .unwrap();

        assert_eq!(config.validation.max_complexity, 7);
        assert_eq!(config.validation.default_level, Level::Strict);
        assert_eq!(config.validation.max_function_loc, 60);
        assert_eq!(config.summary.provider, SummaryProvider::Http);
        assert_eq!(config.summary.timeout_ms, 3000);
    }

    #[test]
    fn test_project_file_is_found() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join(PROJECT_CONFIG_FILE),
            "[source]\nroots = [\"app\"]\n",
        )
        .unwrap();

        let config = StructConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.source.roots, vec!["app"]);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp = tempdir().unwrap();
        let result = StructConfig::load(Some(&temp.path().join("nope.toml")), temp.path());
        assert!(matches!(result, Err(StructError::Config { .. })));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[source\nroots = 3").unwrap();
        assert!(matches!(
            StructConfig::load_from(&path),
            Err(StructError::Config { .. })
        ));
    }
}
