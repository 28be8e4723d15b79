//! Multi-threaded registry stress tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use proptest::prelude::*;
use urlfs_fuse::error::NetworkError;
use urlfs_fuse::network::{Backend, MemoryBackend, RemoteMetadata};
use urlfs_fuse::{Registry, RegistryConfig, RegistryError};
use urlfs_store::CompactionPolicy;

const URL: &str = "mem://object";

fn make_registry(capacity: usize, compaction: CompactionPolicy) -> Arc<Registry> {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert(URL, vec![7u8; 4096], 1_000);
    let config = RegistryConfig {
        capacity,
        compaction,
    };
    Arc::new(Registry::new(&config, backend).unwrap())
}

fn assert_unique(registry: &Registry) {
    let paths = registry.list_paths();
    let unique: HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len(), "duplicate paths: {:?}", paths);
}

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Remove(u8),
    Rename(u8, u8),
    Read(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6).prop_map(Op::Create),
        (0u8..6).prop_map(Op::Remove),
        (0u8..6, 0u8..6).prop_map(|(a, b)| Op::Rename(a, b)),
        (0u8..6).prop_map(Op::Read),
    ]
}

fn path(n: u8) -> String {
    format!("/p{}", n)
}

fn apply(registry: &Registry, op: &Op) {
    let result = match op {
        Op::Create(n) => registry.create(&path(*n), URL).map(drop),
        Op::Remove(n) => registry.remove(&path(*n)),
        Op::Rename(a, b) => registry.rename(&path(*a), &path(*b)),
        Op::Read(n) => registry.read_bytes(&path(*n), 0, 64).map(drop),
    };
    if let Err(e) = result {
        assert!(
            matches!(
                e,
                RegistryError::NotFound { .. }
                    | RegistryError::AlreadyExists { .. }
                    | RegistryError::ResourceExhausted { .. }
            ),
            "unexpected error {:?} for {:?}",
            e,
            op
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_paths_stay_unique_under_concurrent_mutation(
        ops in prop::collection::vec(prop::collection::vec(op_strategy(), 1..40), 4),
        move_last in any::<bool>(),
    ) {
        let policy = if move_last { CompactionPolicy::MoveLast } else { CompactionPolicy::Shift };
        let registry = make_registry(4, policy);
        let barrier = Arc::new(Barrier::new(ops.len()));

        let handles: Vec<_> = ops
            .into_iter()
            .map(|thread_ops| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for op in &thread_ops {
                        apply(&registry, op);
                        assert_unique(&registry);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_unique(&registry);
        prop_assert!(registry.len() <= registry.capacity());
    }
}

#[test]
fn concurrent_rename_is_atomic_for_lookups() {
    let registry = make_registry(8, CompactionPolicy::Shift);
    registry.create("/a", URL).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let a = registry.lookup_by_path("/a").ok().map(|e| e.path.clone());
                    let b = registry.lookup_by_path("/b").ok().map(|e| e.path.clone());
                    // A found entry always carries the path it was found under.
                    if let Some(p) = a {
                        assert_eq!(p, "/a");
                    }
                    if let Some(p) = b {
                        assert_eq!(p, "/b");
                    }
                    let paths = registry.list_paths();
                    assert_eq!(paths.len(), 1, "entry vanished mid-rename: {:?}", paths);
                }
            })
        })
        .collect();

    for i in 0..2000 {
        let (from, to) = if i % 2 == 0 { ("/a", "/b") } else { ("/b", "/a") };
        registry.rename(from, to).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(registry.list_paths(), vec!["/a"]);
}

#[test]
fn concurrent_creates_fill_to_capacity_exactly() {
    let registry = make_registry(16, CompactionPolicy::MoveLast);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..4)
                    .filter(|i| registry.create(&format!("/t{}-{}", t, i), URL).is_ok())
                    .count()
            })
        })
        .collect();

    let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(created, 16);
    assert_eq!(registry.len(), 16);
    assert_unique(&registry);
}

#[test]
fn readers_proceed_while_other_entries_change() {
    let registry = make_registry(8, CompactionPolicy::Shift);
    registry.create("/steady", URL).unwrap();

    let guard = registry.lookup_by_path("/steady").unwrap();
    // Holding one entry's read lock does not block mutations elsewhere.
    registry.create("/other", URL).unwrap();
    registry.rename("/other", "/moved").unwrap();
    registry.remove("/moved").unwrap();
    assert_eq!(guard.path, "/steady");
    drop(guard);

    assert_eq!(registry.read_bytes("/steady", 4000, 500).unwrap().len(), 96);
}

const SLOW_URL: &str = "mem://slow";

/// Memory backend whose calls for `SLOW_URL` park until released.
struct GatedBackend {
    inner: MemoryBackend,
    closed: Mutex<bool>,
    released: Condvar,
    entered: Mutex<Option<Sender<()>>>,
}

impl GatedBackend {
    fn new() -> Self {
        let inner = MemoryBackend::new();
        inner.insert(URL, vec![7u8; 4096], 1_000);
        inner.insert(SLOW_URL, vec![9u8; 64], 1_000);
        Self {
            inner,
            closed: Mutex::new(false),
            released: Condvar::new(),
            entered: Mutex::new(None),
        }
    }

    /// Start parking slow calls; the receiver gets one message per parked call.
    fn close(&self) -> Receiver<()> {
        let (tx, rx) = mpsc::channel();
        *self.entered.lock() = Some(tx);
        *self.closed.lock() = true;
        rx
    }

    fn release(&self) {
        *self.closed.lock() = false;
        self.released.notify_all();
    }

    fn wait_if_slow(&self, url: &str) {
        if url != SLOW_URL {
            return;
        }
        let mut closed = self.closed.lock();
        if !*closed {
            return;
        }
        if let Some(tx) = self.entered.lock().as_ref() {
            let _ = tx.send(());
        }
        while *closed {
            self.released.wait(&mut closed);
        }
    }
}

impl Backend for GatedBackend {
    fn is_reachable(&self, url: &str) -> bool {
        self.inner.is_reachable(url)
    }

    fn fetch_metadata(&self, url: &str) -> Result<RemoteMetadata, NetworkError> {
        self.wait_if_slow(url);
        self.inner.fetch_metadata(url)
    }

    fn fetch_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
        self.wait_if_slow(url);
        self.inner.fetch_range(url, offset, out)
    }
}

#[test]
fn slow_backend_calls_do_not_stall_namespace_operations() {
    let backend = Arc::new(GatedBackend::new());
    let config = RegistryConfig {
        capacity: 8,
        compaction: CompactionPolicy::Shift,
    };
    let registry = Arc::new(Registry::new(&config, backend.clone()).unwrap());
    registry.create("/existing-slow", SLOW_URL).unwrap();
    registry.create("/doomed", URL).unwrap();
    registry.create("/movable", URL).unwrap();

    let entered = backend.close();
    let creator = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.create("/slow", SLOW_URL))
    };
    let reader = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.read_bytes("/existing-slow", 0, 16))
    };
    for _ in 0..2 {
        if entered.recv_timeout(Duration::from_secs(5)).is_err() {
            backend.release();
            panic!("slow backend call never started");
        }
    }

    // Both slow calls are parked inside the backend now.
    let (done_tx, done_rx) = mpsc::channel();
    let worker = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            registry.create("/other", URL).unwrap();
            registry.remove("/doomed").unwrap();
            registry.rename("/movable", "/moved").unwrap();
            assert_eq!(registry.attributes("/existing-slow").unwrap().size, 64);
            done_tx.send(registry.list_paths()).unwrap();
        })
    };
    let finished = done_rx.recv_timeout(Duration::from_secs(5));
    backend.release();

    let mut paths = finished.expect("namespace operations waited on the backend");
    paths.sort();
    assert_eq!(paths, vec!["/existing-slow", "/moved", "/other"]);
    worker.join().unwrap();

    assert!(creator.join().unwrap().is_ok());
    assert_eq!(reader.join().unwrap().unwrap(), vec![9u8; 16]);
    assert!(registry.lookup_by_path("/slow").is_ok());
}
