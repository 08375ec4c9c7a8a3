//! The per-artist-credit Recording/Release Sub-Index: two fuzzy indexes over
//! compact dense positions, plus the link table joining them.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use fuzzy_index::FuzzyIndex;
use serde::{Deserialize, Serialize};

use crate::{CatalogError, MappingRow};

/// Bump whenever [`SubIndex`]'s serialized layout changes.
pub const SUB_INDEX_SCHEMA_VERSION: u8 = 1;

/// One row of a sub-index's link table: a recording-position's association
/// to a release-position, with both catalog ids and the row's rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub release_position: u32,
    pub release_catalog_id: u32,
    pub recording_catalog_id: u32,
    /// Lower is more canonical; mirrors the mapping row's `score`.
    pub rank: u32,
}

/// Per-artist-credit pair of Fuzzy Indexes plus their link table.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubIndex {
    pub recording_index: FuzzyIndex,
    pub release_index: FuzzyIndex,
    /// recording-position -> links, each inner list sorted by
    /// `release_catalog_id` to support binary search in the canonical-release
    /// lookup path (a deliberate departure from sorting by position).
    pub links: BTreeMap<u32, Vec<Link>>,
}

impl SubIndex {
    /// Build from mapping rows already filtered to one artist credit (rows
    /// matching `artist_credit_id == target OR release_artist_credit_id ==
    /// target`, then re-filtered in-process to `artist_credit_id == target`,
    /// per spec.md §4.5 step 0 — this function performs that re-filter itself
    /// so callers only need the coarser predicate applied upstream).
    pub fn build(artist_credit_id: u32, rows: &[MappingRow]) -> Result<Self, CatalogError> {
        let mut recording_positions: HashMap<String, u32> = HashMap::new();
        let mut recording_texts: Vec<String> = Vec::new();
        let mut release_positions: HashMap<String, u32> = HashMap::new();
        let mut release_texts: Vec<String> = Vec::new();
        let mut links: BTreeMap<u32, Vec<Link>> = BTreeMap::new();

        for row in rows {
            if row.artist_credit_id != artist_credit_id {
                continue;
            }

            let encoded_recording = encode::encode(&row.recording_name);
            if encoded_recording.is_empty() {
                continue;
            }
            let encoded_release = encode::encode(&row.release_name);

            let recording_position = *recording_positions
                .entry(encoded_recording.clone())
                .or_insert_with(|| {
                    let position = recording_texts.len() as u32;
                    recording_texts.push(encoded_recording.clone());
                    position
                });
            let release_position = *release_positions.entry(encoded_release.clone()).or_insert_with(|| {
                let position = release_texts.len() as u32;
                release_texts.push(encoded_release.clone());
                position
            });

            links.entry(recording_position).or_default().push(Link {
                release_position,
                release_catalog_id: row.release_id,
                recording_catalog_id: row.recording_id,
                rank: row.score,
            });
        }

        for link_list in links.values_mut() {
            link_list.sort_by_key(|link| link.release_catalog_id);
        }

        let mut recording_index = FuzzyIndex::new();
        if !recording_texts.is_empty() {
            let ids = (0..recording_texts.len() as u32).collect();
            recording_index.build(ids, recording_texts)?;
        }

        let mut release_index = FuzzyIndex::new();
        if !release_texts.is_empty() {
            let ids = (0..release_texts.len() as u32).collect();
            release_index.build(ids, release_texts)?;
        }

        Ok(Self {
            recording_index,
            release_index,
            links,
        })
    }

    pub fn save<W: Write>(&self, mut writer: W) -> Result<(), CatalogError> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CatalogError::Encode(e.to_string()))?;
        writer
            .write_all(&[SUB_INDEX_SCHEMA_VERSION])
            .map_err(CatalogError::backend)?;
        writer.write_all(&bytes).map_err(CatalogError::backend)?;
        Ok(())
    }

    pub fn load<R: Read>(mut reader: R) -> Result<Self, CatalogError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(CatalogError::backend)?;
        let (&version, body) = buf
            .split_first()
            .ok_or_else(|| CatalogError::Decode("empty sub-index blob".into()))?;
        if version != SUB_INDEX_SCHEMA_VERSION {
            return Err(CatalogError::Decode(format!(
                "sub-index blob has schema version {version}, expected {SUB_INDEX_SCHEMA_VERSION}"
            )));
        }
        let (index, _) = bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(index)
    }
}
