//! Two-tier memoization cache
//!
//! Caches are created from a [`Storage`] handle. Each cache keeps an
//! in-process memory layer; persistent caches additionally write through to
//! a shared SQLite table so results survive process restarts. When the
//! database cannot be opened, persistent caches silently become memory-only.

pub mod bootstrap;
mod codec;
mod error;
mod facade;
mod key;
mod memory;
mod persistent;
mod single_flight;
mod storage;

pub use bootstrap::BootstrapError;
pub use codec::Codec;
pub use error::CacheError;
pub use facade::{Cache, Memoized, Policy, PolicyKind};
pub use key::{KeyArg, KeyArgs, Namespace};
pub use memory::MemoryStore;
pub use persistent::{ClearScope, Database, PersistentStore};
pub use single_flight::SingleFlight;
pub use storage::{Storage, DEFAULT_TTL};
