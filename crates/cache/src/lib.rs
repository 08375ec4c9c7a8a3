//! The Index Cache: an in-memory, access-time LRU over
//! `artist_credit_id -> SubIndex`, bounded by process RSS against a
//! configured budget, with an optional background trimmer thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use catalog::SubIndex;
use tracing::debug;

/// Trim target as a fraction of `max_memory_mb`; `trim` stops once RSS falls
/// to or below this fraction of the budget.
const CLEANING_TARGET_RATIO: f64 = 0.9;
/// Number of entries evicted per batch before the lock is released and RSS
/// is re-checked.
const EVICTION_BATCH_SIZE: usize = 10;
/// Default interval the background trimmer sleeps between RSS checks.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Abstracts "how much resident memory is this process using right now",
/// so the cache's eviction policy can be tested without a real process RSS
/// reading and so non-Linux targets can supply their own probe.
pub trait RssProbe {
    /// Current resident set size, in megabytes.
    fn rss_mb(&self) -> u64;
}

/// Reads `VmRSS` out of `/proc/self/status`, matching the original
/// implementation's `get_memory_footprint`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcSelfStatusRssProbe;

impl RssProbe for ProcSelfStatusRssProbe {
    fn rss_mb(&self) -> u64 {
        let Ok(contents) = std::fs::read_to_string("/proc/self/status") else {
            return 0;
        };
        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kb: u64 = rest
                    .trim()
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                return kb / 1024;
            }
        }
        0
    }
}

struct Inner {
    entries: HashMap<u32, Arc<SubIndex>>,
    last_accessed: HashMap<u32, u64>,
    /// Monotonically increasing logical clock; only relative order matters
    /// for LRU eviction, so a tick counter stands in for wall-clock time.
    clock: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_accessed: HashMap::new(),
            clock: 0,
        }
    }

    fn touch(&mut self, id: u32) {
        self.clock += 1;
        self.last_accessed.insert(id, self.clock);
    }
}

/// Size-bounded, access-time LRU over per-artist sub-indexes.
pub struct IndexCache<P: RssProbe = ProcSelfStatusRssProbe> {
    max_memory_mb: u64,
    probe: P,
    inner: Mutex<Inner>,
    running: AtomicBool,
    trimmer: Mutex<Option<JoinHandle<()>>>,
}

impl IndexCache<ProcSelfStatusRssProbe> {
    /// Build a cache bounded by `max_memory_mb`, probing RSS via
    /// `/proc/self/status`.
    pub fn new(max_memory_mb: u64) -> Self {
        Self::with_probe(max_memory_mb, ProcSelfStatusRssProbe)
    }
}

impl<P: RssProbe> IndexCache<P> {
    pub fn with_probe(max_memory_mb: u64, probe: P) -> Self {
        Self {
            max_memory_mb,
            probe,
            inner: Mutex::new(Inner::new()),
            running: AtomicBool::new(false),
            trimmer: Mutex::new(None),
        }
    }

    /// Look up `id`, bumping its access time on a hit.
    pub fn get(&self, artist_credit_id: u32) -> Option<Arc<SubIndex>> {
        let mut inner = self.inner.lock().expect("index cache mutex poisoned");
        let found = inner.entries.get(&artist_credit_id).cloned();
        if found.is_some() {
            inner.touch(artist_credit_id);
        }
        found
    }

    /// Insert `sub_index` under `id`. If an entry already exists for `id`,
    /// the existing one is kept and `sub_index` is simply dropped
    /// (at-most-one-instance-per-id); the cache takes ownership otherwise.
    pub fn add(&self, artist_credit_id: u32, sub_index: Arc<SubIndex>) {
        let mut inner = self.inner.lock().expect("index cache mutex poisoned");
        if inner.entries.contains_key(&artist_credit_id) {
            return;
        }
        inner.entries.insert(artist_credit_id, sub_index);
        inner.touch(artist_credit_id);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("index cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Repeatedly discard the 10 oldest-accessed entries until RSS falls to
    /// or below `CLEANING_TARGET_RATIO * max_memory_mb` or the cache is
    /// empty. The RSS probe runs outside the lock; the lock is released
    /// between eviction batches so readers make progress.
    pub fn trim(&self) {
        let cleaning_target_mb = (self.max_memory_mb as f64 * CLEANING_TARGET_RATIO) as u64;
        loop {
            if self.probe.rss_mb() <= cleaning_target_mb {
                return;
            }

            let evicted = {
                let mut inner = self.inner.lock().expect("index cache mutex poisoned");
                if inner.entries.is_empty() {
                    return;
                }
                let mut by_access: Vec<(u32, u64)> = inner
                    .last_accessed
                    .iter()
                    .map(|(&id, &tick)| (id, tick))
                    .collect();
                by_access.sort_by_key(|&(_, tick)| tick);
                let victims: Vec<u32> = by_access
                    .into_iter()
                    .take(EVICTION_BATCH_SIZE)
                    .map(|(id, _)| id)
                    .collect();
                for id in &victims {
                    inner.entries.remove(id);
                    inner.last_accessed.remove(id);
                }
                victims.len()
            };

            debug!(evicted, "index cache trim batch");
        }
    }
}

impl<P: RssProbe + Send + Sync + 'static> IndexCache<P> {
    /// Start the background trimmer, polling RSS every 30 seconds.
    pub fn start(self: &Arc<Self>) {
        self.start_with_interval(DEFAULT_POLL_INTERVAL);
    }

    /// Start the background trimmer with a custom poll interval (exposed for
    /// tests; production callers should use [`IndexCache::start`]).
    pub fn start_with_interval(self: &Arc<Self>, interval: Duration) {
        let mut guard = self.trimmer.lock().expect("index cache mutex poisoned");
        if guard.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let cache = Arc::clone(self);
        *guard = Some(thread::spawn(move || {
            while cache.running.load(Ordering::SeqCst) {
                thread::sleep(interval);
                if !cache.running.load(Ordering::SeqCst) {
                    break;
                }
                if cache.probe.rss_mb() > cache.max_memory_mb {
                    cache.trim();
                }
            }
        }));
    }

    /// Stop the background trimmer and join its thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.trimmer.lock().expect("index cache mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
