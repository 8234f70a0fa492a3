//! Optional per-key serialization of computations
//!
//! Callers racing on the same sub-key within one process queue behind a
//! per-key mutex, so the later ones find the earlier result in the cache
//! instead of computing it again. The keys are local to one cache; nothing
//! is coordinated across processes.
//!
//! A compute closure that calls a second single-flight cache on a persistent
//! handle can deadlock against a thread doing the reverse, since the per-key
//! lock is taken before the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct SingleFlight {
    keys: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`
    pub fn run<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(key);
        let out = {
            let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        self.release(key, &lock);
        out
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        keys.entry(key.to_string()).or_default().clone()
    }

    fn release(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // map + this caller hold the only references
        if Arc::strong_count(lock) <= 2 {
            keys.remove(key);
        }
    }

    /// Number of keys with a computation in flight or queued
    pub fn in_flight(&self) -> usize {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
