//! Configuration lookup
//!
//! Configuration is a JSON document. The cache subsystem only reads
//! `cache.file`:
//!
//! - absent: use the default location
//! - `null`: persistence disabled
//! - a string: explicit store path, with `~` and `$VAR` / `${VAR}` expanded

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde_json::Value;
use thiserror::Error;

/// Error types for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for '{key}': expected {expected}")]
    InvalidValue { key: String, expected: &'static str },
}

/// Parsed configuration document
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            root: serde_json::from_str(text)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Looks up a nested value; `None` means the key is absent
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.root, |node, segment| node.get(*segment))
    }

    /// Extracts the cache settings
    pub fn cache(&self) -> Result<CacheConfig, ConfigError> {
        let file = match self.get(&["cache", "file"]) {
            None => CacheFile::Default,
            Some(Value::Null) => CacheFile::Disabled,
            Some(Value::String(path)) => CacheFile::Path(path.clone()),
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    key: "cache.file".to_string(),
                    expected: "a path string or null",
                })
            }
        };
        Ok(CacheConfig { file })
    }
}

/// Where the persistent store should live
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheFile {
    /// Environment-provided or platform cache directory
    #[default]
    Default,
    /// Persistence turned off; every cache is memory-only
    Disabled,
    /// Explicit path, expanded before use
    Path(String),
}

/// Settings consumed by storage bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    pub file: CacheFile,
}

impl CacheConfig {
    pub fn with_file(path: impl Into<String>) -> Self {
        Self {
            file: CacheFile::Path(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            file: CacheFile::Disabled,
        }
    }
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references
///
/// Unknown variables are left as written.
pub fn expand_path(path: &str, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    let expanded = expand_vars(path, &env);

    if expanded == "~" || expanded.starts_with("~/") || expanded.starts_with("~\\") {
        if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
            let rest = expanded[1..].trim_start_matches(['/', '\\']);
            return if rest.is_empty() { home } else { home.join(rest) };
        }
    }
    PathBuf::from(expanded)
}

fn expand_vars(input: &str, env: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), env(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
