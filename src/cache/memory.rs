//! In-process memory layer
//!
//! Holds at most one value per sub-key, optionally with an expiry timestamp.
//! The same type backs the unbounded memory policy, the TTL memory policy,
//! and the in-process mirror of every persistent cache.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    /// Unix seconds after which the slot is stale; `None` never expires
    expires: Option<i64>,
}

impl<V> Slot<V> {
    fn is_live(&self, now: i64) -> bool {
        self.expires.map_or(true, |expires| expires > now)
    }
}

/// `now + ttl`, clamped to the largest representable timestamp
pub(crate) fn expiry_after(now: i64, ttl: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
}

/// Sub-key to value mapping with optional per-entry expiry
#[derive(Debug)]
pub struct MemoryStore<V> {
    ttl: Option<u64>,
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V: Clone> MemoryStore<V> {
    /// Entries never expire
    pub fn unbounded() -> Self {
        Self {
            ttl: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Entries expire `ttl` seconds after they are stored
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    /// Expiry for an entry written at `now`
    pub fn expiry_from(&self, now: i64) -> Option<i64> {
        self.ttl.map(|ttl| expiry_after(now, ttl))
    }

    /// Returns the cached value for `subkey` if it is still live at `now`
    pub fn get(&self, subkey: &str, now: i64) -> Option<V> {
        self.lock()
            .get(subkey)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    /// Returns the cached value, or runs `compute` and stores its result
    ///
    /// The lock is released while `compute` runs. A failing `compute` leaves
    /// the store untouched.
    pub fn get_or_compute<E>(
        &self,
        subkey: &str,
        now: i64,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(subkey, now) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(subkey, value.clone(), self.expiry_from(now));
        Ok(value)
    }

    /// Force-sets the value for `subkey` with a fresh expiry
    pub fn update(&self, subkey: &str, value: V, now: i64) {
        self.insert(subkey, value, self.expiry_from(now));
    }

    /// Stores a value with an explicit expiry
    pub fn insert(&self, subkey: &str, value: V, expires: Option<i64>) {
        self.lock()
            .insert(subkey.to_string(), Slot { value, expires });
    }

    /// Removes `subkey`; absent keys are ignored
    pub fn invalidate(&self, subkey: &str) {
        self.lock().remove(subkey);
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<V>>> {
        // compute never runs under this lock, so a poisoned map is consistent
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
