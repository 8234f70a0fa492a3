//! Command-line interface parsing for the keepsake operator tool
//!
//! The binary exposes maintenance commands for the persistent cache:
//! clearing rows by module or namespace, and showing where the store lives.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{CacheConfig, Config, ConfigError};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Keepsake - inspect and maintain the persistent memoization cache
#[derive(Parser, Debug)]
#[command(name = "keepsake")]
#[command(about = "Maintain the persistent memoization cache")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file providing `cache.file`
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Store file to use, overriding the configuration
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Delete cached entries
    ///
    /// Examples:
    ///   keepsake clear                      # every entry
    ///   keepsake clear myapp::extractor     # every function in a module
    ///   keepsake clear myapp::auth.login    # a single cached function
    Clear {
        /// `ALL`, a module path, or a `module.function` namespace
        #[arg(default_value = "ALL")]
        scope: String,
    },
    /// Print the resolved store location
    Path,
}

impl Cli {
    /// Builds cache settings from the config file and `--cache-file`
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        if let Some(path) = &self.cache_file {
            return Ok(CacheConfig::with_file(path.as_str()));
        }
        match &self.config {
            Some(path) => Ok(Config::load(path)?.cache()?),
            None => Ok(CacheConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ClearScope;
    use std::fs;
    use tempfile::TempDir;

    fn scope_of(cli: &Cli) -> ClearScope {
        match &cli.command {
            Command::Clear { scope } => ClearScope::parse(scope),
            other => panic!("expected clear command, got {:?}", other),
        }
    }

    #[test]
    fn test_clear_defaults_to_all() {
        let cli = Cli::parse_from(["keepsake", "clear"]);
        assert_eq!(scope_of(&cli), ClearScope::All);
    }

    #[test]
    fn test_clear_module_scope_is_lowercased() {
        let cli = Cli::parse_from(["keepsake", "clear", "MyApp::Pixiv"]);
        assert_eq!(scope_of(&cli), ClearScope::Prefix("myapp::pixiv".to_string()));
    }

    #[test]
    fn test_path_command_parses() {
        let cli = Cli::parse_from(["keepsake", "path"]);
        assert_eq!(cli.command, Command::Path);
    }

    #[test]
    fn test_cache_file_flag_overrides_config() {
        let cli = Cli::parse_from([
            "keepsake",
            "path",
            "--cache-file",
            "/tmp/x.db",
            "-c",
            "/nope.json",
        ]);
        assert_eq!(cli.cache_config().unwrap(), CacheConfig::with_file("/tmp/x.db"));
    }

    #[test]
    fn test_config_file_is_read() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"cache": {"file": null}}"#).unwrap();

        let cli = Cli::parse_from(["keepsake", "-c", config_path.to_str().unwrap(), "path"]);

        assert_eq!(cli.cache_config().unwrap(), CacheConfig::disabled());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["keepsake", "-c", "/definitely/not/here.json", "path"]);
        let err = cli.cache_config().unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_no_flags_uses_default_location() {
        let cli = Cli::parse_from(["keepsake", "path"]);
        assert_eq!(cli.cache_config().unwrap(), CacheConfig::default());
    }
}
