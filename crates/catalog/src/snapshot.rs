//! `redb`-backed access to the catalog snapshot.
//!
//! `redb` has no secondary indexes, so the access patterns spec.md §6 names
//! for the `mapping` table (`by artist_credit_id`, `by recording_id`, `by
//! (release_id, recording_id)`) are materialized as three separate tables
//! derived from the same rows at ingestion time, plus the `index_cache`
//! table for opaque per-entity blobs. `release_artist_credit_id` is carried
//! on the row itself (§3 supplement) rather than as its own table, since the
//! only reader that needs it is the sub-index builder, which already has the
//! artist_credit-keyed rows in hand.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::CatalogError;

const BY_ARTIST_CREDIT: TableDefinition<u32, &[u8]> = TableDefinition::new("mapping_by_artist_credit");
const BY_RECORDING: TableDefinition<u32, &[u8]> = TableDefinition::new("mapping_by_recording");
const BY_RELEASE_RECORDING: TableDefinition<u64, &[u8]> =
    TableDefinition::new("mapping_by_release_recording");
const INDEX_CACHE: TableDefinition<i64, &[u8]> = TableDefinition::new("index_cache");

/// One row of the catalog `mapping` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub artist_credit_id: u32,
    /// Comma-separated MBIDs, order-preserving.
    pub artist_mbids: String,
    pub artist_credit_name: String,
    pub artist_credit_sortname: String,
    /// Alternate name forms for this artist credit from the upstream
    /// `artist_alias` table; each gets its own indexed entry in the
    /// single/multiple artist index alongside the credit name itself.
    #[serde(default)]
    pub artist_aliases: Vec<String>,
    pub release_id: u32,
    pub release_mbid: String,
    pub release_artist_credit_id: u32,
    pub release_name: String,
    pub recording_id: u32,
    pub recording_mbid: String,
    pub recording_name: String,
    /// Lower is more canonical.
    pub score: u32,
}

fn release_recording_key(release_id: u32, recording_id: u32) -> u64 {
    ((release_id as u64) << 32) | recording_id as u64
}

/// A read-only (from this crate's perspective) handle onto the catalog
/// snapshot file. Cheaply cloneable; each worker thread should hold its own.
#[derive(Clone)]
pub struct CatalogSnapshot {
    db: Arc<Database>,
}

impl CatalogSnapshot {
    /// Open (creating if absent) the snapshot at `path`, ensuring all tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let db = Database::create(path).map_err(CatalogError::backend)?;
        let write_txn = db.begin_write().map_err(CatalogError::backend)?;
        {
            write_txn.open_table(BY_ARTIST_CREDIT).map_err(CatalogError::backend)?;
            write_txn.open_table(BY_RECORDING).map_err(CatalogError::backend)?;
            write_txn
                .open_table(BY_RELEASE_RECORDING)
                .map_err(CatalogError::backend)?;
            write_txn.open_table(INDEX_CACHE).map_err(CatalogError::backend)?;
        }
        write_txn.commit().map_err(CatalogError::backend)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Rows whose `artist_credit_id` matches. Used by the sub-index builder
    /// (already two-clause filtered to `artist_credit_id == target` at
    /// ingestion, per §4.5's supplement).
    pub fn rows_for_artist_credit(&self, artist_credit_id: u32) -> Result<Vec<MappingRow>, CatalogError> {
        self.read_row_group(&BY_ARTIST_CREDIT, artist_credit_id)
    }

    /// Rows whose `recording_id` matches, regardless of release.
    pub fn rows_for_recording(&self, recording_id: u32) -> Result<Vec<MappingRow>, CatalogError> {
        self.read_row_group(&BY_RECORDING, recording_id)
    }

    /// The lowest-score row for a recording, used by the Metadata Resolver's
    /// release-less fallback path.
    pub fn lowest_score_row_for_recording(
        &self,
        recording_id: u32,
    ) -> Result<Option<MappingRow>, CatalogError> {
        let rows = self.rows_for_recording(recording_id)?;
        Ok(rows.into_iter().min_by_key(|r| r.score))
    }

    /// The single row for an exact `(release_id, recording_id)` pair.
    pub fn row_for_release_recording(
        &self,
        release_id: u32,
        recording_id: u32,
    ) -> Result<Option<MappingRow>, CatalogError> {
        let read_txn = self.db.begin_read().map_err(CatalogError::backend)?;
        let table = read_txn
            .open_table(BY_RELEASE_RECORDING)
            .map_err(CatalogError::backend)?;
        let key = release_recording_key(release_id, recording_id);
        match table.get(key).map_err(CatalogError::backend)? {
            Some(value) => {
                let (row, _): (MappingRow, usize) =
                    bincode::serde::decode_from_slice(value.value(), bincode::config::standard())
                        .map_err(|e| CatalogError::Decode(e.to_string()))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn read_row_group(
        &self,
        table_def: &TableDefinition<u32, &[u8]>,
        key: u32,
    ) -> Result<Vec<MappingRow>, CatalogError> {
        let read_txn = self.db.begin_read().map_err(CatalogError::backend)?;
        let table = read_txn.open_table(*table_def).map_err(CatalogError::backend)?;
        match table.get(key).map_err(CatalogError::backend)? {
            Some(value) => {
                let (rows, _): (Vec<MappingRow>, usize) =
                    bincode::serde::decode_from_slice(value.value(), bincode::config::standard())
                        .map_err(|e| CatalogError::Decode(e.to_string()))?;
                Ok(rows)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Fetch an opaque blob from `index_cache` by entity id (positive =
    /// `artist_credit_id`, negative = one of the three artist-level sentinels).
    pub fn load_index_blob(&self, entity_id: i64) -> Result<Option<Vec<u8>>, CatalogError> {
        let read_txn = self.db.begin_read().map_err(CatalogError::backend)?;
        let table = read_txn.open_table(INDEX_CACHE).map_err(CatalogError::backend)?;
        Ok(table
            .get(entity_id)
            .map_err(CatalogError::backend)?
            .map(|v| v.value().to_vec()))
    }

    /// Store an opaque blob under `entity_id`, overwriting any existing value.
    pub fn store_index_blob(&self, entity_id: i64, bytes: &[u8]) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write().map_err(CatalogError::backend)?;
        {
            let mut table = write_txn.open_table(INDEX_CACHE).map_err(CatalogError::backend)?;
            table.insert(entity_id, bytes).map_err(CatalogError::backend)?;
        }
        write_txn.commit().map_err(CatalogError::backend)?;
        Ok(())
    }

    /// Populate the three mapping-derived tables from `rows`.
    ///
    /// This is the narrow write path the core exposes; the real system's
    /// ingestion job (out of scope per spec.md §1) is expected to produce an
    /// equivalent snapshot by its own means. Tests and the demo binary use
    /// this to build a snapshot in-process without a real catalog.
    pub fn ingest_rows(&self, rows: &[MappingRow]) -> Result<(), CatalogError> {
        let mut by_artist_credit: BTreeMap<u32, Vec<MappingRow>> = BTreeMap::new();
        let mut by_recording: BTreeMap<u32, Vec<MappingRow>> = BTreeMap::new();

        for row in rows {
            by_artist_credit
                .entry(row.artist_credit_id)
                .or_default()
                .push(row.clone());
            by_recording.entry(row.recording_id).or_default().push(row.clone());
        }

        let write_txn = self.db.begin_write().map_err(CatalogError::backend)?;
        {
            let mut artist_table = write_txn
                .open_table(BY_ARTIST_CREDIT)
                .map_err(CatalogError::backend)?;
            for (id, group) in &by_artist_credit {
                let bytes = bincode::serde::encode_to_vec(group, bincode::config::standard())
                    .map_err(|e| CatalogError::Encode(e.to_string()))?;
                artist_table.insert(*id, bytes.as_slice()).map_err(CatalogError::backend)?;
            }

            let mut recording_table = write_txn.open_table(BY_RECORDING).map_err(CatalogError::backend)?;
            for (id, group) in &by_recording {
                let bytes = bincode::serde::encode_to_vec(group, bincode::config::standard())
                    .map_err(|e| CatalogError::Encode(e.to_string()))?;
                recording_table
                    .insert(*id, bytes.as_slice())
                    .map_err(CatalogError::backend)?;
            }

            let mut release_recording_table = write_txn
                .open_table(BY_RELEASE_RECORDING)
                .map_err(CatalogError::backend)?;
            for row in rows {
                let key = release_recording_key(row.release_id, row.recording_id);
                let bytes = bincode::serde::encode_to_vec(row, bincode::config::standard())
                    .map_err(|e| CatalogError::Encode(e.to_string()))?;
                release_recording_table
                    .insert(key, bytes.as_slice())
                    .map_err(CatalogError::backend)?;
            }
        }
        write_txn.commit().map_err(CatalogError::backend)?;
        Ok(())
    }
}
