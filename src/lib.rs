//! Canonical catalog mapper: identifies canonical artist credit, release,
//! and recording entries from noisy free-text triples.
//!
//! This crate re-exports the pipeline's component crates behind one
//! dependency and wires them into [`MapperEngine`], which owns:
//!
//! - the process-wide [`ArtistIndexSet`], loaded once and shared read-only;
//! - the [`IndexCache`] of per-artist-credit [`SubIndex`] values, shared
//!   across workers;
//! - a fixed pool of OS-thread workers, each with its own [`Matcher`] and
//!   its own [`CatalogSnapshot`] handle (spec.md §5: "one catalog-snapshot
//!   connection per worker").
//!
//! ## Quick start
//!
//! ```no_run
//! use mapper::{init, MapperEngine, MatcherConfig};
//!
//! # fn demo() -> Result<(), mapper::MapperError> {
//! init()?;
//! let engine = MapperEngine::open(MatcherConfig {
//!     index_dir: "catalog.redb".into(),
//!     ..Default::default()
//! })?;
//!
//! match engine.search("portishead", Some("portishead"), "western eyes")? {
//!     Some(result) => println!("matched recording {}", result.recording_id),
//!     None => println!("no match"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The core never installs a `tracing` subscriber or parses `.env` files;
//! that ambient setup, along with HTTP surface and CLI argument parsing,
//! stays with the caller (spec.md §1 non-goals).

pub mod config;

pub use cache::IndexCache;
pub use catalog::{
    ArtistCredit, ArtistIndexSet, CatalogError, CatalogSnapshot, Link, MappingRow,
    MetadataResolver, ResolvedMetadata, SubIndex,
};
pub use config::{ConfigError, MatcherConfig};
pub use encode::{encode, encode_stupid};
pub use fuzzy_index::{FuzzyIndex, IndexError, IndexResult};
pub use matcher::{ArtistNameCleaner, MatchError, MatchResult, Matcher, MatcherThresholds, NoopArtistNameCleaner};
pub use tfidf::{SparseVector, Vectorizer};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::info;

static FUZZY_BACKEND_INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("init() called more than once in this process")]
    AlreadyInitialized,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("worker pool is shut down")]
    PoolShutDown,
}

/// One-time process-wide lifecycle init.
///
/// The trigram/TF-IDF fuzzy backend in this workspace carries no global
/// state of its own, but the contract from the system this crate replaces
/// does: the vector-search library it originally depended on required
/// exactly one init call per process and treated a second call as a bug.
/// `init` preserves that lifecycle so a caller who ports init/shutdown
/// ordering from that system keeps working unchanged. Call once at process
/// startup, before constructing any [`MapperEngine`].
pub fn init() -> Result<(), MapperError> {
    if FUZZY_BACKEND_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(MapperError::AlreadyInitialized);
    }
    info!("fuzzy index backend initialized");
    Ok(())
}

struct Job {
    artist_credit_name: String,
    release_name: Option<String>,
    recording_name: String,
    reply: mpsc::Sender<Result<Option<MatchResult>, MatchError>>,
}

struct Worker {
    sender: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

fn spawn_worker(
    artist_index: Arc<ArtistIndexSet>,
    cache: Arc<IndexCache>,
    snapshot: CatalogSnapshot,
    thresholds: MatcherThresholds,
) -> Worker {
    let (sender, receiver) = mpsc::channel::<Job>();
    let handle = std::thread::spawn(move || {
        // Constructed on first job, not at thread spawn, so opening this
        // worker's catalog-snapshot handle stays lazy per spec.md §5.
        let mut matcher: Option<Matcher> = None;
        while let Ok(job) = receiver.recv() {
            let matcher = matcher.get_or_insert_with(|| {
                Matcher::new(
                    Arc::clone(&artist_index),
                    Arc::clone(&cache),
                    snapshot.clone(),
                    NoopArtistNameCleaner,
                    thresholds,
                )
            });
            let result = matcher.search(
                &job.artist_credit_name,
                job.release_name.as_deref(),
                &job.recording_name,
            );
            let _ = job.reply.send(result);
        }
    });
    Worker { sender, handle }
}

/// Owns the shared, read-only Artist Index Set and Index Cache, plus a
/// fixed pool of worker threads that each hold one [`Matcher`].
///
/// `search` round-robins queries across the pool; within one query the FSM
/// is single-threaded and deterministic (spec.md §5).
pub struct MapperEngine {
    workers: Vec<Worker>,
    next_worker: std::sync::atomic::AtomicUsize,
    cache: Arc<IndexCache>,
}

impl MapperEngine {
    /// Open the catalog snapshot at `config.index_dir`, load the Artist
    /// Index Set once, and spawn `config.resolved_worker_threads()` workers.
    pub fn open(config: MatcherConfig) -> Result<Self, MapperError> {
        config.validate();

        let snapshot = CatalogSnapshot::open(&config.index_dir)?;
        let artist_index = Arc::new(ArtistIndexSet::load(&snapshot)?);
        let cache = Arc::new(IndexCache::new(config.max_cache_size_mb));
        cache.start();

        let thresholds = config.thresholds();
        let worker_count = config.resolved_worker_threads();
        let workers = (0..worker_count)
            .map(|_| {
                spawn_worker(
                    Arc::clone(&artist_index),
                    Arc::clone(&cache),
                    snapshot.clone(),
                    thresholds,
                )
            })
            .collect();

        info!(worker_count, index_dir = %config.index_dir.display(), "mapper engine ready");
        Ok(Self {
            workers,
            next_worker: std::sync::atomic::AtomicUsize::new(0),
            cache,
        })
    }

    /// Run one query end to end: artist credit name (required), release
    /// name (optional), recording name (required). `Ok(None)` covers both
    /// the no-match and threshold-miss cases, which are indistinguishable
    /// by design (spec.md §7).
    pub fn search(
        &self,
        artist_credit_name: &str,
        release_name: Option<&str>,
        recording_name: &str,
    ) -> Result<Option<MatchResult>, MapperError> {
        if self.workers.is_empty() {
            return Err(MapperError::PoolShutDown);
        }
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job {
            artist_credit_name: artist_credit_name.to_string(),
            release_name: release_name.map(str::to_string),
            recording_name: recording_name.to_string(),
            reply: reply_tx,
        };
        self.workers[index]
            .sender
            .send(job)
            .map_err(|_| MapperError::PoolShutDown)?;
        reply_rx.recv().map_err(|_| MapperError::PoolShutDown)?.map_err(MapperError::from)
    }

    /// Number of sub-indexes currently resident in the Index Cache.
    pub fn cached_sub_index_count(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for MapperEngine {
    fn drop(&mut self) {
        self.cache.stop();
        // Drop each worker's sender first so its `recv()` loop ends, only
        // then join its thread — joining before the sender closes would
        // deadlock against a worker still blocked in `recv()`.
        for worker in self.workers.drain(..) {
            drop(worker.sender);
            let _ = worker.handle.join();
        }
    }
}
