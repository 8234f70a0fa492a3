//! Storage handle shared by all caches of a process
//!
//! Bootstrap runs once when the handle is built. If the store cannot be
//! opened the handle stays memory-only for its whole life: every cache
//! requested from it afterwards is an in-memory cache, and nothing is retried.

use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;

use super::bootstrap::{self, BootstrapError};
use super::{Cache, CacheError, ClearScope, Codec, Database, MemoryStore, Namespace};
use super::{PersistentStore, Policy};

/// Entry lifetime used by [`Storage::cache_default`]
pub const DEFAULT_TTL: u64 = 3600;

/// Entry point for creating caches
#[derive(Clone)]
pub struct Storage {
    db: Option<Arc<Database>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("db", &self.db).finish()
    }
}

impl Storage {
    /// Opens the store described by `config`, falling back to memory-only
    pub fn bootstrap(config: &CacheConfig) -> Self {
        match bootstrap::open_database(config) {
            Ok(db) => {
                debug!(path = ?db.path(), "persistent cache opened");
                Self::from_database(db)
            }
            Err(BootstrapError::Disabled) => {
                debug!("persistent cache disabled by configuration");
                Self::memory_only()
            }
            Err(err) => {
                warn!(error = %err, "persistent cache unavailable, using memory-only caches");
                Self::memory_only()
            }
        }
    }

    /// Opens the store at `path` without the memory-only fallback
    pub fn open(path: &Path) -> Result<Self, BootstrapError> {
        bootstrap::open_database_at(path).map(Self::from_database)
    }

    /// Backed by a private in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, CacheError> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    /// No persistent store; every cache is kept in memory
    pub fn memory_only() -> Self {
        Self {
            db: None,
            clock: Arc::new(SystemClock),
        }
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Some(Arc::new(db)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source for caches created afterwards
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.db.as_deref().and_then(Database::path)
    }

    /// Persistent cache with the default one-hour TTL
    pub fn cache_default<V>(&self, namespace: Namespace) -> Cache<V>
    where
        V: Clone + Serialize + DeserializeOwned,
    {
        self.cache(namespace, DEFAULT_TTL)
    }

    /// Persistent cache with entries living `ttl` seconds
    ///
    /// A zero TTL yields an unbounded memory cache; a memory-only handle
    /// yields a TTL memory cache.
    pub fn cache<V>(&self, namespace: Namespace, ttl: u64) -> Cache<V>
    where
        V: Clone + Serialize + DeserializeOwned,
    {
        self.cache_with_codec(namespace, ttl, Codec::json())
    }

    /// Like [`Storage::cache`] with an explicit codec
    pub fn cache_with_codec<V: Clone>(
        &self,
        namespace: Namespace,
        ttl: u64,
        codec: Codec<V>,
    ) -> Cache<V> {
        let policy = match (&self.db, ttl) {
            (_, 0) => Policy::Memory(MemoryStore::unbounded()),
            (None, ttl) => Policy::MemoryTtl(MemoryStore::with_ttl(ttl)),
            (Some(db), ttl) => Policy::Persistent(PersistentStore::new(
                db.clone(),
                namespace.clone(),
                codec,
                ttl,
            )),
        };
        Cache::new(namespace, policy, self.clock.clone())
    }

    /// In-memory cache, unbounded when `ttl` is `None` or zero
    pub fn memcache<V: Clone>(&self, namespace: Namespace, ttl: Option<u64>) -> Cache<V> {
        let policy = match ttl {
            None | Some(0) => Policy::Memory(MemoryStore::unbounded()),
            Some(ttl) => Policy::MemoryTtl(MemoryStore::with_ttl(ttl)),
        };
        Cache::new(namespace, policy, self.clock.clone())
    }

    /// Deletes persistent rows in `scope`
    ///
    /// Returns `None` when no store is open. Storage failures are logged and
    /// reported as zero rows removed.
    pub fn clear(&self, scope: &ClearScope) -> Option<usize> {
        let db = self.db.as_ref()?;
        match db.clear(scope) {
            Ok(removed) => Some(removed),
            Err(err) => {
                warn!(error = %err, ?scope, "failed to clear cache");
                Some(0)
            }
        }
    }
}
