//! End-to-end behaviour of caches created from a storage handle
//!
//! Covers persistence across handles sharing one file, expiry with a manual
//! clock, fallback to memory-only caches, and bulk clearing.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use keepsake::cache::{CacheError, ClearScope, KeyArg, Namespace, PolicyKind, Storage};
use keepsake::clock::ManualClock;
use keepsake::config::CacheConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    cookies: HashMap<String, String>,
    pages: Vec<Vec<u32>>,
    expires: Option<i64>,
}

fn temp_store() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.sqlite3");
    (temp_dir, path)
}

fn counting<'a>(
    calls: &'a Cell<u32>,
    value: &'a str,
) -> impl Fn() -> Result<String, CacheError> + 'a {
    move || {
        calls.set(calls.get() + 1);
        Ok(value.to_string())
    }
}

#[test]
fn test_memoized_value_expires_after_ttl() {
    let clock = ManualClock::new(1_700_000_000);
    let storage = Storage::in_memory().unwrap().with_clock(clock.clone());
    let calls = Cell::new(0);
    let f = storage
        .cache::<String>(Namespace::new("scenario", "f"), 60)
        .memoize(KeyArg::Index(0), |args: &(i32,)| {
            calls.set(calls.get() + 1);
            Ok::<_, CacheError>(format!("A{}", args.0))
        })
        .unwrap();

    assert_eq!(f.call(&(1,)).unwrap(), "A1");
    assert_eq!(f.call(&(1,)).unwrap(), "A1");
    assert_eq!(calls.get(), 1);

    clock.advance(59);
    assert_eq!(f.call(&(1,)).unwrap(), "A1");
    assert_eq!(calls.get(), 1);

    clock.advance(2);
    assert_eq!(f.call(&(1,)).unwrap(), "A1");
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_second_handle_reads_committed_value() {
    let (_temp_dir, path) = temp_store();
    let ns = || Namespace::new("scenario", "g");

    let first = Storage::open(&path).expect("First handle should open");
    let calls = Cell::new(0);
    let value = first
        .cache::<String>(ns(), 3600)
        .get_or_compute(1, counting(&calls, "B"))
        .unwrap();
    assert_eq!(value, "B");
    drop(first);

    let second = Storage::open(&path).expect("Second handle should open");
    let value = second
        .cache::<String>(ns(), 3600)
        .get_or_compute(1, counting(&calls, "not B"))
        .unwrap();

    assert_eq!(value, "B");
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_concurrent_handles_share_one_file() {
    let (_temp_dir, path) = temp_store();
    let a = Storage::open(&path).unwrap();
    let b = Storage::open(&path).unwrap();
    let ns = || Namespace::new("scenario", "shared");

    a.cache::<u32>(ns(), 600).update("k", 7).unwrap();

    let seen = b
        .cache::<u32>(ns(), 600)
        .get_or_compute::<CacheError>("k", || Ok(0))
        .unwrap();
    assert_eq!(seen, 7);
}

#[test]
fn test_second_handle_waits_for_computation_in_progress() {
    let (_temp_dir, path) = temp_store();
    let calls = Arc::new(AtomicUsize::new(0));

    let spawn = |delay: u64, value: &'static str| {
        let path = path.clone();
        let calls = calls.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay));
            let storage = Storage::open(&path).expect("Handle should open");
            storage
                .cache::<String>(Namespace::new("scenario", "slow"), 600)
                .get_or_compute::<CacheError>("k", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(500));
                    Ok(value.to_string())
                })
                .unwrap()
        })
    };

    // warm the schema so both handles start from an existing table
    Storage::open(&path).unwrap().clear(&ClearScope::All);

    let first = spawn(0, "first");
    let second = spawn(100, "second");

    assert_eq!(first.join().expect("First worker should not panic"), "first");
    assert_eq!(second.join().expect("Second worker should not panic"), "first");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_structured_values_round_trip_through_disk() {
    let (_temp_dir, path) = temp_store();
    let mut cookies = HashMap::new();
    cookies.insert("sid".to_string(), "abc123".to_string());
    cookies.insert("csrf".to_string(), "".to_string());
    let session = Session {
        user: "ünïcode user".to_string(),
        cookies,
        pages: vec![vec![], vec![1, 2, 3]],
        expires: None,
    };

    {
        let storage = Storage::open(&path).unwrap();
        storage
            .cache::<Session>(Namespace::new("scenario", "login"), 600)
            .update("user", session.clone())
            .unwrap();
    }

    let storage = Storage::open(&path).unwrap();
    let restored = storage
        .cache::<Session>(Namespace::new("scenario", "login"), 600)
        .get_or_compute::<CacheError>("user", || panic!("value should come from disk"))
        .unwrap();
    assert_eq!(restored, session);

    let mut nested = BTreeMap::new();
    nested.insert("ids".to_string(), vec![Some(1u64), None]);
    let table = storage.cache::<BTreeMap<String, Vec<Option<u64>>>>(
        Namespace::new("scenario", "table"),
        600,
    );
    table.update("", nested.clone()).unwrap();
    table.invalidate("never-stored").unwrap();
    let fresh = Storage::open(&path)
        .unwrap()
        .cache::<BTreeMap<String, Vec<Option<u64>>>>(Namespace::new("scenario", "table"), 600)
        .get_or_compute::<CacheError>("", || Ok(BTreeMap::new()))
        .unwrap();
    assert_eq!(fresh, nested);
}

#[test]
fn test_invalidate_reaches_other_handles() {
    let (_temp_dir, path) = temp_store();
    let a = Storage::open(&path).unwrap();
    let ns = || Namespace::new("scenario", "inv");
    let cache = a.cache::<u32>(ns(), 600);
    cache.update("k", 1).unwrap();

    cache.invalidate("k").unwrap();
    cache.invalidate("k").unwrap();

    let b = Storage::open(&path).unwrap();
    let value = b
        .cache::<u32>(ns(), 600)
        .get_or_compute::<CacheError>("k", || Ok(2))
        .unwrap();
    assert_eq!(value, 2);
}

#[test]
fn test_clear_all_and_unknown_namespace() {
    let (_temp_dir, path) = temp_store();
    let storage = Storage::open(&path).unwrap();
    storage.cache::<u32>(Namespace::new("ext::a", "f"), 60).update(1, 1).unwrap();
    storage.cache::<u32>(Namespace::new("ext::a", "g"), 60).update(1, 2).unwrap();
    storage.cache::<u32>(Namespace::new("ext::b", "f"), 60).update(1, 3).unwrap();

    assert_eq!(storage.clear(&ClearScope::parse("nonexistent-namespace")), Some(0));
    assert_eq!(storage.clear(&ClearScope::parse("ALL")), Some(3));
    assert_eq!(storage.clear(&ClearScope::All), Some(0));
}

#[test]
fn test_unwritable_store_falls_back_to_memory() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    // a regular file where the store directory should be
    let blocker = temp_dir.path().join("readonly");
    fs::write(&blocker, b"").unwrap();
    let path = blocker.join("cache.sqlite3");
    let config = CacheConfig::with_file(path.to_string_lossy());

    let storage = Storage::bootstrap(&config);
    let cache = storage.cache::<String>(Namespace::new("scenario", "d"), 60);
    let calls = Cell::new(0);

    assert_eq!(cache.kind(), PolicyKind::MemoryTtl);
    assert_eq!(cache.get_or_compute(1, counting(&calls, "mem")).unwrap(), "mem");
    assert_eq!(cache.get_or_compute(1, counting(&calls, "again")).unwrap(), "mem");
    assert_eq!(calls.get(), 1);
    assert_eq!(storage.clear(&ClearScope::All), None);
    assert!(!path.exists());
}

#[test]
fn test_fallback_cache_still_expires() {
    let clock = ManualClock::new(0);
    let storage = Storage::bootstrap(&CacheConfig::disabled()).with_clock(clock.clone());
    let cache = storage.cache::<u32>(Namespace::new("scenario", "fallback"), 10);

    assert_eq!(cache.get_or_compute::<CacheError>("", || Ok(1)).unwrap(), 1);
    clock.advance(9);
    assert_eq!(cache.get_or_compute::<CacheError>("", || Ok(2)).unwrap(), 1);
    clock.advance(1);
    assert_eq!(cache.get_or_compute::<CacheError>("", || Ok(3)).unwrap(), 3);
}

#[test]
fn test_nested_cached_calls_do_not_deadlock() {
    let storage = Storage::in_memory().unwrap();
    let token = storage.cache::<String>(Namespace::new("scenario", "token"), 60);
    let profile = storage.cache::<String>(Namespace::new("scenario", "profile"), 60);

    let value = profile
        .get_or_compute::<CacheError>("me", || {
            let token = token.get_or_compute::<CacheError>("", || Ok("t".to_string()))?;
            Ok(format!("profile via {}", token))
        })
        .unwrap();

    assert_eq!(value, "profile via t");
}

#[test]
fn test_single_flight_computes_once_across_threads() {
    let (_temp_dir, path) = temp_store();
    let storage = Storage::open(&path).unwrap();
    let cache = Arc::new(
        storage
            .cache::<u32>(Namespace::new("scenario", "flight"), 600)
            .with_single_flight(),
    );
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            thread::spawn(move || {
                cache
                    .get_or_compute::<CacheError>("k", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok(5)
                    })
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("Worker thread should not panic"), 5);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
