//! SQLite-backed persistent layer
//!
//! Every namespace shares the single table
//! `data(key TEXT PRIMARY KEY, value BLOB, expires INTEGER)`; rows are told
//! apart only by their `"{namespace}-{subkey}"` key. The table is created on
//! first use and rows are removed only by `invalidate` or `clear`. Expired
//! rows are left in place and overwritten by the next computation.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::memory::expiry_after;
use super::{CacheError, Codec, MemoryStore, Namespace};

const SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS data (key TEXT PRIMARY KEY, value BLOB, expires INTEGER)";

/// How long a statement waits on another process's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// Scope argument for a bulk clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Every row of every namespace
    All,
    /// Rows of one namespace (`"{prefix}-..."`) or of every function in one
    /// module (`"{prefix}.{function}-..."`)
    Prefix(String),
}

impl ClearScope {
    /// Parses operator input: `ALL` clears everything, anything else is a
    /// lowercased module or namespace prefix
    pub fn parse(input: &str) -> Self {
        if input == "ALL" {
            ClearScope::All
        } else {
            ClearScope::Prefix(input.to_lowercase())
        }
    }
}

impl From<&Namespace> for ClearScope {
    fn from(namespace: &Namespace) -> Self {
        ClearScope::Prefix(namespace.as_str().to_string())
    }
}

struct Connected {
    conn: Connection,
    schema_ready: bool,
    /// Nesting level of [`Database::transaction`] calls on the owning thread
    depth: usize,
}

/// Shared connection to the cache database
///
/// One `Database` is shared by every persistent cache created from the same
/// storage handle. The connection is owned by one thread at a time; the
/// owning thread may re-enter it from inside a transaction.
pub struct Database {
    path: Option<PathBuf>,
    inner: ReentrantMutex<RefCell<Connected>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Opens the database file at `path`
    ///
    /// The file is expected to exist already (bootstrap creates it with
    /// owner-only permissions).
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    /// Opens a private in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            path,
            inner: ReentrantMutex::new(RefCell::new(Connected {
                conn,
                schema_ready: false,
                depth: 0,
            })),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` with the connection, creating the table on first use
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, rusqlite::Error> {
        let guard = self.inner.lock();
        let mut connected = guard.borrow_mut();
        if !connected.schema_ready {
            connected.conn.execute_batch(SCHEMA)?;
            connected.schema_ready = true;
        }
        f(&connected.conn)
    }

    /// Runs `f` inside one transaction
    ///
    /// The outermost call asks SQLite for an exclusive lock and settles for a
    /// deferred transaction if that is refused. It commits when `f` succeeds
    /// and rolls back when `f` fails. Other threads wait for the connection
    /// until then. Calls made by `f` itself (a compute closure reading
    /// another cache of the same handle) join the open transaction.
    pub fn transaction<T, E: From<CacheError>>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let guard = self.inner.lock();
        let outermost = guard.borrow().depth == 0;
        if outermost {
            self.begin()?;
        }
        guard.borrow_mut().depth += 1;

        let level = Level {
            db: self,
            outermost,
        };
        let result = f();
        drop(level);

        if outermost {
            if result.is_ok() {
                self.commit()?;
            } else {
                self.rollback();
            }
        }
        result
    }

    fn begin(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            if let Err(err) = conn.execute_batch("BEGIN EXCLUSIVE") {
                debug!(error = %err, "exclusive transaction unavailable, using a deferred one");
                conn.execute_batch("BEGIN")?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn commit(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute_batch("COMMIT").map_err(|err| {
                // a failed COMMIT can leave the transaction open
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    debug!(error = %rollback, "rollback after failed commit");
                }
                err
            })
        })?;
        Ok(())
    }

    fn rollback(&self) {
        if let Err(err) = self.with_conn(|conn| conn.execute_batch("ROLLBACK")) {
            debug!(error = %err, "rollback failed");
        }
    }

    /// Reads the row for `key` if it is still live at `now`
    pub fn lookup(&self, key: &str, now: i64) -> Result<Option<(Vec<u8>, i64)>, CacheError> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT value, expires FROM data WHERE key = ?1 LIMIT 1",
                [key],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
        })?;

        Ok(row.filter(|(_, expires)| *expires > now))
    }

    /// Inserts or replaces the row for `key`
    pub fn store(&self, key: &str, value: &[u8], expires: i64) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO data (key, value, expires) VALUES (?1, ?2, ?3)",
                params![key, value, expires],
            )
        })?;
        Ok(())
    }

    /// Deletes the row for `key`, returning whether one existed
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed =
            self.with_conn(|conn| conn.execute("DELETE FROM data WHERE key = ?1", [key]))?;
        Ok(removed > 0)
    }

    /// Deletes every row in `scope` and compacts the file if anything was removed
    pub fn clear(&self, scope: &ClearScope) -> Result<usize, CacheError> {
        let removed = self.with_conn(|conn| match scope {
            ClearScope::All => conn.execute("DELETE FROM data", []),
            ClearScope::Prefix(prefix) => {
                let module = format!("{}.", prefix);
                let exact = format!("{}-", prefix);
                // substr counts characters, not bytes
                let len = module.chars().count() as i64;
                conn.execute(
                    "DELETE FROM data WHERE substr(key, 1, ?1) IN (?2, ?3)",
                    params![len, module, exact],
                )
            }
        })?;

        if removed > 0 {
            self.with_conn(|conn| conn.execute_batch("VACUUM"))?;
        }
        Ok(removed)
    }

    /// Number of rows currently stored, expired ones included
    pub fn row_count(&self) -> Result<usize, CacheError> {
        let count = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM data", [], |row| row.get::<_, i64>(0))
        })?;
        Ok(count as usize)
    }
}

/// One level of [`Database::transaction`] nesting, released on drop
///
/// A panic inside the outermost level rolls the transaction back so the
/// connection is not left mid-transaction.
struct Level<'a> {
    db: &'a Database,
    outermost: bool,
}

impl Drop for Level<'_> {
    fn drop(&mut self) {
        let guard = self.db.inner.lock();
        guard.borrow_mut().depth -= 1;
        drop(guard);
        if self.outermost && std::thread::panicking() {
            self.db.rollback();
        }
    }
}

/// Persistent cache for one namespace, fronted by an in-process mirror
pub struct PersistentStore<V> {
    db: Arc<Database>,
    namespace: Namespace,
    codec: Codec<V>,
    ttl: u64,
    memory: MemoryStore<V>,
}

impl<V: Clone> PersistentStore<V> {
    pub fn new(db: Arc<Database>, namespace: Namespace, codec: Codec<V>, ttl: u64) -> Self {
        Self {
            db,
            namespace,
            codec,
            ttl,
            memory: MemoryStore::with_ttl(ttl),
        }
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// The in-process mirror of this namespace's rows
    pub fn memory(&self) -> &MemoryStore<V> {
        &self.memory
    }

    /// Memory mirror, then the live row, then `compute`
    ///
    /// The row lookup, `compute` and the write of its result share one
    /// transaction, so a second process asking for the same key waits for
    /// the value instead of computing it again.
    pub fn get_or_compute<E: From<CacheError>>(
        &self,
        subkey: &str,
        now: i64,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.memory.get(subkey, now) {
            debug!(namespace = %self.namespace, subkey, "memory hit");
            return Ok(value);
        }

        let key = self.namespace.key_for(subkey);
        let (value, expires) = self.db.transaction(|| -> Result<(V, i64), E> {
            if let Some((blob, expires)) = self.db.lookup(&key, now)? {
                debug!(namespace = %self.namespace, subkey, "database hit");
                return Ok((self.codec.decode(&blob)?, expires));
            }

            debug!(namespace = %self.namespace, subkey, "miss, computing");
            let value = compute()?;
            let expires = self.expiry_from(now);
            self.db.store(&key, &self.codec.encode(&value)?, expires)?;
            Ok((value, expires))
        })?;

        self.memory.insert(subkey, value.clone(), Some(expires));
        Ok(value)
    }

    pub fn update(&self, subkey: &str, value: V, now: i64) -> Result<(), CacheError> {
        let expires = self.expiry_from(now);
        self.db
            .store(&self.namespace.key_for(subkey), &self.codec.encode(&value)?, expires)?;
        self.memory.insert(subkey, value, Some(expires));
        Ok(())
    }

    pub fn invalidate(&self, subkey: &str) -> Result<(), CacheError> {
        self.memory.invalidate(subkey);
        self.db.delete(&self.namespace.key_for(subkey))?;
        Ok(())
    }

    fn expiry_from(&self, now: i64) -> i64 {
        expiry_after(now, self.ttl)
    }
}
