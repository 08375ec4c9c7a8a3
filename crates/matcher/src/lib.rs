//! The Matcher FSM: an ordered, deterministic search strategy over the
//! Artist Index Set, Index Cache, and Recording/Release Sub-Indexes, with
//! named fallback transitions for name-cleaning, transliteration, and the
//! stupid-artist and canonical-release paths.

mod fsm;

pub use fsm::{ArtistNameCleaner, Matcher, MatcherThresholds, NoopArtistNameCleaner};

use thiserror::Error;

/// Resolved result of a successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub artist_credit_id: u32,
    pub artist_credit_name: String,
    pub artist_credit_mbids: Vec<String>,
    pub release_id: u32,
    pub release_name: String,
    pub release_mbid: String,
    pub recording_id: u32,
    pub recording_name: String,
    pub recording_mbid: String,
    /// `(recording.confidence + release.confidence) / 2`, in `[0, 1]`.
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("catalog read failed: {0}")]
    CatalogRead(#[from] catalog::CatalogError),
    #[error("fuzzy index error: {0}")]
    Index(#[from] fuzzy_index::IndexError),
    #[error("sub-index missing for artist_credit_id {0}")]
    SubIndexMissing(u32),
    #[error("failed to deserialize sub-index: {0}")]
    DeserializeCorrupt(String),
    #[error("FSM received event {event:?} invalid for state {state:?}")]
    ProgrammerError { state: fsm::State, event: fsm::Event },
    /// A per-query invariant the FSM relies on (e.g. "sub_index is set once
    /// recording_search has run") didn't hold. Always a bug in the handler
    /// dispatch order, never caller input — modeled as a typed error rather
    /// than a panic so one query's broken invariant can't take down the
    /// worker thread it runs on.
    #[error("internal invariant violated: {0}")]
    InvariantViolated(&'static str),
}
