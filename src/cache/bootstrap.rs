//! Store location and opening
//!
//! The store path comes from the configuration override, then the per-user
//! cache directory variable, then the platform cache directory. The file is
//! created with owner-only permissions before SQLite ever touches it.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

use crate::config::{expand_path, CacheConfig, CacheFile};

use super::Database;

/// Directory created inside the cache root
pub const APP_DIR: &str = "keepsake";

/// Store file name inside [`APP_DIR`]
pub const FILE_NAME: &str = "cache.sqlite3";

/// Environment variable naming the per-user cache root
#[cfg(windows)]
pub const CACHE_DIR_VAR: &str = "APPDATA";
#[cfg(not(windows))]
pub const CACHE_DIR_VAR: &str = "XDG_CACHE_HOME";

/// Reasons the persistent store could not be made available
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Persistent cache disabled by configuration")]
    Disabled,

    #[error("Could not determine a cache directory")]
    NoCacheDir,

    #[error("Failed to prepare cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open cache database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

/// Resolves the store path for `config`
///
/// `env` is consulted for the cache directory variable and for variables
/// referenced by an override path.
pub fn resolve_path(
    config: &CacheConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, BootstrapError> {
    match &config.file {
        CacheFile::Disabled => Err(BootstrapError::Disabled),
        CacheFile::Path(path) => Ok(expand_path(path, &env)),
        CacheFile::Default => {
            let root = env(CACHE_DIR_VAR)
                .filter(|dir| !dir.is_empty())
                .map(|dir| expand_path(&dir, &env))
                .or_else(platform_cache_dir)
                .ok_or(BootstrapError::NoCacheDir)?;
            Ok(root.join(APP_DIR).join(FILE_NAME))
        }
    }
}

/// Resolves the store path using the process environment
pub fn default_path(config: &CacheConfig) -> Result<PathBuf, BootstrapError> {
    resolve_path(config, |name| std::env::var(name).ok())
}

fn platform_cache_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Creates the store file (and its directory) if missing
///
/// New files get mode `0o600` at creation time; existing files keep their
/// permissions.
pub fn create_private_file(path: &Path) -> Result<(), BootstrapError> {
    let io_err = |source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(io_err)?;
    Ok(())
}

/// Resolves, creates and opens the store
pub fn open_database(config: &CacheConfig) -> Result<Database, BootstrapError> {
    let path = default_path(config)?;
    open_database_at(&path)
}

/// Creates and opens the store at an already resolved path
pub fn open_database_at(path: &Path) -> Result<Database, BootstrapError> {
    create_private_file(path)?;
    Database::open(path).map_err(|source| BootstrapError::Open {
        path: path.to_path_buf(),
        source,
    })
}
