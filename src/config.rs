//! Runtime configuration for the canonical catalog mapper.
//!
//! [`MatcherConfig`] holds exactly the options spec.md §6 names. The four
//! confidence thresholds and the two length/count constants are part of the
//! matching algorithm itself: changing them changes which results a query
//! gets back, so [`MatcherConfig::validate`] doesn't refuse a non-default
//! value, it just warns loudly that the operator is opting out of result
//! compatibility with the rest of the deployment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use matcher::MatcherThresholds;

const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 100;
const DEFAULT_THRESHOLD: f32 = 0.7;
const DEFAULT_MAX_ENCODED_LEN: usize = 30;
const DEFAULT_NUM_FUZZY_SEARCH_RESULTS: usize = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The options a deployment tunes when standing up a mapper instance.
///
/// Defaults reproduce the documented algorithm constants exactly. Changing
/// `*_threshold`, `max_encoded_len`, or `num_fuzzy_search_results` away from
/// their defaults is a deliberate, risk-accepting operator action: it
/// changes which matches clear which bars, so two deployments running
/// different values will disagree on identical queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MatcherConfig {
    /// Path to the embedded catalog snapshot file.
    pub index_dir: PathBuf,

    /// Soft RSS budget for the Index Cache, in megabytes.
    #[serde(default = "default_max_cache_size_mb")]
    pub max_cache_size_mb: u64,

    /// Worker thread count. `0` means one per logical CPU.
    #[serde(default)]
    pub worker_threads: usize,

    #[serde(default = "default_threshold")]
    pub artist_threshold: f32,
    #[serde(default = "default_threshold")]
    pub release_threshold: f32,
    #[serde(default = "default_threshold")]
    pub recording_threshold: f32,
    #[serde(default = "default_threshold")]
    pub stupid_artist_threshold: f32,

    #[serde(default = "default_max_encoded_len")]
    pub max_encoded_len: usize,
    #[serde(default = "default_num_fuzzy_search_results")]
    pub num_fuzzy_search_results: usize,

    /// Filter string for the `tracing` subscriber a caller installs (e.g.
    /// `"info"`, `"mapper=debug,catalog=info"`). The core never installs a
    /// subscriber itself; this is read back out for callers that do.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_cache_size_mb() -> u64 {
    DEFAULT_MAX_CACHE_SIZE_MB
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_max_encoded_len() -> usize {
    DEFAULT_MAX_ENCODED_LEN
}

fn default_num_fuzzy_search_results() -> usize {
    DEFAULT_NUM_FUZZY_SEARCH_RESULTS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("catalog.redb"),
            max_cache_size_mb: default_max_cache_size_mb(),
            worker_threads: 0,
            artist_threshold: default_threshold(),
            release_threshold: default_threshold(),
            recording_threshold: default_threshold(),
            stupid_artist_threshold: default_threshold(),
            max_encoded_len: default_max_encoded_len(),
            num_fuzzy_search_results: default_num_fuzzy_search_results(),
            log_level: default_log_level(),
        }
    }
}

impl MatcherConfig {
    /// Load configuration from a JSON file, falling back to documented
    /// defaults for any field the file omits.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Number of worker threads to actually spawn: `worker_threads` verbatim
    /// unless it's `0`, in which case one per logical CPU.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_threads
        }
    }

    /// `MatcherThresholds` as consumed by `matcher::Matcher`.
    pub fn thresholds(&self) -> MatcherThresholds {
        MatcherThresholds {
            artist_threshold: self.artist_threshold,
            release_threshold: self.release_threshold,
            recording_threshold: self.recording_threshold,
            stupid_artist_threshold: self.stupid_artist_threshold,
        }
    }

    /// Warn (never error) about any algorithm constant that has drifted
    /// from its documented default, since that's a compatibility-breaking
    /// choice rather than a misconfiguration.
    pub fn validate(&self) {
        let defaults = Self::default();
        if self.artist_threshold != defaults.artist_threshold {
            tracing::warn!(value = self.artist_threshold, "artist_threshold overridden from documented default");
        }
        if self.release_threshold != defaults.release_threshold {
            tracing::warn!(value = self.release_threshold, "release_threshold overridden from documented default");
        }
        if self.recording_threshold != defaults.recording_threshold {
            tracing::warn!(value = self.recording_threshold, "recording_threshold overridden from documented default");
        }
        if self.stupid_artist_threshold != defaults.stupid_artist_threshold {
            tracing::warn!(
                value = self.stupid_artist_threshold,
                "stupid_artist_threshold overridden from documented default"
            );
        }
        if self.max_encoded_len != defaults.max_encoded_len {
            tracing::warn!(value = self.max_encoded_len, "max_encoded_len overridden from documented default");
        }
        if self.num_fuzzy_search_results != defaults.num_fuzzy_search_results {
            tracing::warn!(
                value = self.num_fuzzy_search_results,
                "num_fuzzy_search_results overridden from documented default"
            );
        }
    }
}
