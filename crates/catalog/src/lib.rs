//! Read-only access to the catalog snapshot, plus the in-memory structures
//! built from it: the Artist Index Set, per-artist Recording/Release
//! Sub-Indexes, and the Metadata Resolver.
//!
//! The snapshot itself is an embedded `redb` database file. This crate never
//! opens it for anything but reads at query time; populating it is the
//! concern of an external ingestion job (see `CatalogSnapshot::ingest_rows`
//! for the narrow write path tests and fixtures use to build one in-process).

mod artist_index;
mod metadata;
mod snapshot;
mod sub_index;

pub use artist_index::{
    ArtistCredit, ArtistIndexSet, MULTIPLE_ARTIST_INDEX_ENTITY_ID, SINGLE_ARTIST_INDEX_ENTITY_ID,
    STUPID_ARTIST_INDEX_ENTITY_ID,
};
pub use metadata::{MetadataResolver, ResolvedMetadata};
pub use snapshot::{CatalogSnapshot, MappingRow};
pub use sub_index::{Link, SubIndex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(String),
    #[error("failed to encode catalog blob: {0}")]
    Encode(String),
    #[error("failed to decode catalog blob: {0}")]
    Decode(String),
    #[error("fuzzy index error: {0}")]
    Index(#[from] fuzzy_index::IndexError),
}

impl CatalogError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        CatalogError::Backend(err.to_string())
    }
}
