//! Cache facade binding a namespace to one backing policy
//!
//! A [`Cache`] is created through a [`Storage`](super::Storage) handle, which
//! picks the policy once: persistent when a database is open and a TTL is
//! given, a TTL memory cache when the database is unavailable, and an
//! unbounded memory cache when no TTL is given.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::clock::Clock;

use super::{CacheError, KeyArg, KeyArgs, MemoryStore, Namespace, PersistentStore, SingleFlight};

/// Backing store selected for a cache
pub enum Policy<V> {
    Memory(MemoryStore<V>),
    MemoryTtl(MemoryStore<V>),
    Persistent(PersistentStore<V>),
}

/// Tag of a [`Policy`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Memory,
    MemoryTtl,
    Persistent,
}

impl<V> Policy<V> {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Memory(_) => PolicyKind::Memory,
            Policy::MemoryTtl(_) => PolicyKind::MemoryTtl,
            Policy::Persistent(_) => PolicyKind::Persistent,
        }
    }
}

/// Memoizing cache for one wrapped function
pub struct Cache<V> {
    namespace: Namespace,
    policy: Policy<V>,
    clock: Arc<dyn Clock>,
    flights: Option<SingleFlight>,
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("namespace", &self.namespace)
            .field("policy", &self.policy.kind())
            .field("single_flight", &self.flights.is_some())
            .finish()
    }
}

impl<V: Clone> Cache<V> {
    pub(crate) fn new(namespace: Namespace, policy: Policy<V>, clock: Arc<dyn Clock>) -> Self {
        Self {
            namespace,
            policy,
            clock,
            flights: None,
        }
    }

    /// Serializes same-key computations within this process
    pub fn with_single_flight(mut self) -> Self {
        self.flights = Some(SingleFlight::new());
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// Entry lifetime in seconds, `None` for unbounded memory caches
    pub fn ttl(&self) -> Option<u64> {
        match &self.policy {
            Policy::Memory(store) | Policy::MemoryTtl(store) => store.ttl(),
            Policy::Persistent(store) => Some(store.ttl()),
        }
    }

    /// Returns the cached value for `subkey`, computing and storing it on a miss
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached.
    /// Storage errors on the persistent path are converted into `E`.
    pub fn get_or_compute<E: From<CacheError>>(
        &self,
        subkey: impl fmt::Display,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let subkey = subkey.to_string();
        match &self.flights {
            Some(flights) => flights.run(&subkey, || self.lookup(&subkey, compute)),
            None => self.lookup(&subkey, compute),
        }
    }

    fn lookup<E: From<CacheError>>(
        &self,
        subkey: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let now = self.clock.now();
        match &self.policy {
            Policy::Memory(store) | Policy::MemoryTtl(store) => {
                store.get_or_compute(subkey, now, compute)
            }
            Policy::Persistent(store) => store.get_or_compute(subkey, now, compute),
        }
    }

    /// Replaces the value for `subkey` without computing
    pub fn update(&self, subkey: impl fmt::Display, value: V) -> Result<(), CacheError> {
        let subkey = subkey.to_string();
        let now = self.clock.now();
        match &self.policy {
            Policy::Memory(store) | Policy::MemoryTtl(store) => {
                store.update(&subkey, value, now);
                Ok(())
            }
            Policy::Persistent(store) => store.update(&subkey, value, now),
        }
    }

    /// Drops the value for `subkey`; unknown sub-keys are ignored
    pub fn invalidate(&self, subkey: impl fmt::Display) -> Result<(), CacheError> {
        let subkey = subkey.to_string();
        match &self.policy {
            Policy::Memory(store) | Policy::MemoryTtl(store) => {
                store.invalidate(&subkey);
                Ok(())
            }
            Policy::Persistent(store) => store.invalidate(&subkey),
        }
    }

    /// Wraps `func` so each call is memoized on the argument picked by `key_arg`
    pub fn memoize<A, E, F>(
        self,
        key_arg: KeyArg,
        func: F,
    ) -> Result<Memoized<A, V, E, F>, CacheError>
    where
        A: KeyArgs,
        F: Fn(&A) -> Result<V, E>,
    {
        if let KeyArg::Index(index) = key_arg {
            if !key_arg.fits::<A>() {
                return Err(CacheError::KeyArgument {
                    index,
                    arity: A::ARITY,
                });
            }
        }
        Ok(Memoized {
            cache: self,
            key_arg,
            func,
            _signature: PhantomData,
        })
    }
}

/// A function wrapped by a [`Cache`]
///
/// `call` has the same shape as the wrapped function; `update` and
/// `invalidate` address entries by the sub-key the key argument produces.
pub struct Memoized<A, V, E, F> {
    cache: Cache<V>,
    key_arg: KeyArg,
    func: F,
    _signature: PhantomData<fn(&A) -> Result<V, E>>,
}

impl<A, V, E, F> fmt::Debug for Memoized<A, V, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("cache", &self.cache)
            .field("key_arg", &self.key_arg)
            .finish_non_exhaustive()
    }
}

impl<A, V, E, F> Memoized<A, V, E, F>
where
    A: KeyArgs,
    V: Clone,
    E: From<CacheError>,
    F: Fn(&A) -> Result<V, E>,
{
    pub fn call(&self, args: &A) -> Result<V, E> {
        let subkey = self.key_arg.subkey(args);
        self.cache.get_or_compute(subkey, || (self.func)(args))
    }

    pub fn update(&self, subkey: impl fmt::Display, value: V) -> Result<(), CacheError> {
        self.cache.update(subkey, value)
    }

    pub fn invalidate(&self, subkey: impl fmt::Display) -> Result<(), CacheError> {
        self.cache.invalidate(subkey)
    }

    pub fn cache(&self) -> &Cache<V> {
        &self.cache
    }
}
