//! The Artist Index Set: three process-wide fuzzy indexes over artist
//! credits, loaded once at startup and shared read-only across workers.

use std::collections::BTreeSet;

use fuzzy_index::FuzzyIndex;
use tracing::debug;

use crate::{CatalogError, CatalogSnapshot};

/// Sentinel `index_cache.entity_id` for the single-contributor artist index.
pub const SINGLE_ARTIST_INDEX_ENTITY_ID: i64 = -1;
/// Sentinel `index_cache.entity_id` for the multi-contributor artist index.
pub const MULTIPLE_ARTIST_INDEX_ENTITY_ID: i64 = -2;
/// Sentinel `index_cache.entity_id` for the stupid-path artist index.
pub const STUPID_ARTIST_INDEX_ENTITY_ID: i64 = -3;

/// Highest Latin-1-Extended-A codepoint; a name containing only codepoints
/// at or below this boundary is considered Latin script.
const LATIN_BOUNDARY: u32 = 0x024F;

fn is_transliterated(credit_name: &str, sort_name: &str) -> bool {
    let mut has_latin = false;
    let mut has_non_latin = false;
    for c in credit_name.chars() {
        if c as u32 <= LATIN_BOUNDARY {
            has_latin = true;
        } else {
            has_non_latin = true;
        }
    }
    let sort_all_latin = sort_name.chars().all(|c| c as u32 <= LATIN_BOUNDARY);
    has_latin && has_non_latin && sort_all_latin
}

/// One distinct artist credit, as consumed by [`ArtistIndexSet::build`].
#[derive(Debug, Clone)]
pub struct ArtistCredit {
    pub artist_credit_id: u32,
    pub artist_credit_name: String,
    pub artist_credit_sortname: String,
    /// Number of artists contributing to this credit (parsed from
    /// `artist_mbids`'s comma-separated list upstream).
    pub contributor_count: usize,
    /// Alternate name forms from the upstream `artist_alias` table (legal
    /// names, alternate spellings, search hints) — distinct from the
    /// transliterated-sort-name entry below, which is derived from this same
    /// credit's own sort name rather than an external alias source.
    pub aliases: Vec<String>,
}

/// The three artist-level fuzzy indexes, immutable after load.
pub struct ArtistIndexSet {
    pub single: FuzzyIndex,
    pub multiple: FuzzyIndex,
    pub stupid: FuzzyIndex,
}

impl ArtistIndexSet {
    /// Build the three indexes from distinct artist credits.
    ///
    /// Mirrors the offline builder's aggregation (spec.md §4.4): dedupes
    /// `(artist_credit_id, encoded_name)` pairs, routes single- vs.
    /// multi-contributor credits to separate indexes, routes credits whose
    /// normal encoding is empty to the stupid index, gives transliterated
    /// credits (Latin+non-Latin credit name, all-Latin sort name) an extra
    /// indexed entry keyed on the sort name, and, for single-contributor
    /// credits only, indexes each `artist_alias` row name as its own
    /// additional entry for the same artist_credit_id.
    pub fn build(credits: &[ArtistCredit]) -> Result<Self, CatalogError> {
        let mut single_seen = BTreeSet::new();
        let mut single_ids = Vec::new();
        let mut single_texts = Vec::new();

        let mut multiple_seen = BTreeSet::new();
        let mut multiple_ids = Vec::new();
        let mut multiple_texts = Vec::new();

        let mut stupid_seen = BTreeSet::new();
        let mut stupid_ids = Vec::new();
        let mut stupid_texts = Vec::new();

        for credit in credits {
            let encoded = encode::encode(&credit.artist_credit_name);

            if encoded.is_empty() {
                let stupid_encoded = encode::encode_stupid(&credit.artist_credit_name);
                if !stupid_encoded.is_empty()
                    && stupid_seen.insert((credit.artist_credit_id, stupid_encoded.clone()))
                {
                    stupid_ids.push(credit.artist_credit_id);
                    stupid_texts.push(stupid_encoded);
                }
                continue;
            }

            let (seen, ids, texts) = if credit.contributor_count == 1 {
                (&mut single_seen, &mut single_ids, &mut single_texts)
            } else {
                (&mut multiple_seen, &mut multiple_ids, &mut multiple_texts)
            };

            if seen.insert((credit.artist_credit_id, encoded.clone())) {
                ids.push(credit.artist_credit_id);
                texts.push(encoded);
            }

            if is_transliterated(&credit.artist_credit_name, &credit.artist_credit_sortname) {
                let sort_encoded = encode::encode(&credit.artist_credit_sortname);
                if !sort_encoded.is_empty() && seen.insert((credit.artist_credit_id, sort_encoded.clone())) {
                    ids.push(credit.artist_credit_id);
                    texts.push(sort_encoded);
                }
            }

            if credit.contributor_count == 1 {
                for alias in &credit.aliases {
                    let alias_encoded = encode::encode(alias);
                    if !alias_encoded.is_empty() && seen.insert((credit.artist_credit_id, alias_encoded.clone())) {
                        ids.push(credit.artist_credit_id);
                        texts.push(alias_encoded);
                    }
                }
            }
        }

        debug!(
            single = single_ids.len(),
            multiple = multiple_ids.len(),
            stupid = stupid_ids.len(),
            "built artist index set"
        );

        let mut single = FuzzyIndex::new();
        if !single_ids.is_empty() {
            single.build(single_ids, single_texts)?;
        }
        let mut multiple = FuzzyIndex::new();
        if !multiple_ids.is_empty() {
            multiple.build(multiple_ids, multiple_texts)?;
        }
        let mut stupid = FuzzyIndex::new();
        if !stupid_ids.is_empty() {
            stupid.build(stupid_ids, stupid_texts)?;
        }

        Ok(Self { single, multiple, stupid })
    }

    /// Load all three indexes from their reserved blobs in the snapshot.
    /// A missing blob yields an empty (unbuilt) index rather than an error,
    /// since a fresh snapshot may simply not have that path populated yet.
    pub fn load(snapshot: &CatalogSnapshot) -> Result<Self, CatalogError> {
        Ok(Self {
            single: load_index(snapshot, SINGLE_ARTIST_INDEX_ENTITY_ID)?,
            multiple: load_index(snapshot, MULTIPLE_ARTIST_INDEX_ENTITY_ID)?,
            stupid: load_index(snapshot, STUPID_ARTIST_INDEX_ENTITY_ID)?,
        })
    }

    /// Persist all three indexes under their reserved sentinel ids.
    pub fn save(&self, snapshot: &CatalogSnapshot) -> Result<(), CatalogError> {
        save_index(snapshot, SINGLE_ARTIST_INDEX_ENTITY_ID, &self.single)?;
        save_index(snapshot, MULTIPLE_ARTIST_INDEX_ENTITY_ID, &self.multiple)?;
        save_index(snapshot, STUPID_ARTIST_INDEX_ENTITY_ID, &self.stupid)?;
        Ok(())
    }
}

fn load_index(snapshot: &CatalogSnapshot, entity_id: i64) -> Result<FuzzyIndex, CatalogError> {
    match snapshot.load_index_blob(entity_id)? {
        Some(bytes) => FuzzyIndex::load(&bytes[..]).map_err(CatalogError::from),
        None => Ok(FuzzyIndex::new()),
    }
}

fn save_index(snapshot: &CatalogSnapshot, entity_id: i64, index: &FuzzyIndex) -> Result<(), CatalogError> {
    let mut buf = Vec::new();
    index.save(&mut buf)?;
    snapshot.store_index_blob(entity_id, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(id: u32, name: &str, sort: &str, contributors: usize) -> ArtistCredit {
        ArtistCredit {
            artist_credit_id: id,
            artist_credit_name: name.to_string(),
            artist_credit_sortname: sort.to_string(),
            contributor_count: contributors,
            aliases: Vec::new(),
        }
    }

    #[test]
    fn routes_single_and_multiple_credits_separately() {
        let credits = vec![
            credit(1, "Portishead", "Portishead", 1),
            credit(2, "Queen & David Bowie", "Queen & David Bowie", 2),
        ];
        let set = ArtistIndexSet::build(&credits).unwrap();

        assert!(set.single.is_built());
        assert_eq!(set.single.len(), 1);
        assert!(set.multiple.is_built());
        assert_eq!(set.multiple.len(), 1);
        assert!(!set.stupid.is_built());
    }

    #[test]
    fn punctuation_only_name_routes_to_stupid() {
        let credits = vec![credit(3, "!!!", "!!!", 1)];
        let set = ArtistIndexSet::build(&credits).unwrap();

        assert!(!set.single.is_built());
        assert!(set.stupid.is_built());
        assert_eq!(set.stupid.len(), 1);
    }

    #[test]
    fn transliterated_credit_gets_extra_sort_name_entry() {
        let credits = vec![credit(4, "幾何学模様", "Kikagaku Moyo", 1)];
        let set = ArtistIndexSet::build(&credits).unwrap();

        assert!(set.single.is_built());
        // one entry for the romanized credit name, one for the sort name
        assert_eq!(set.single.len(), 2);
    }

    #[test]
    fn save_and_load_round_trips_through_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CatalogSnapshot::open(dir.path().join("catalog.redb")).unwrap();

        let credits = vec![credit(1, "Portishead", "Portishead", 1)];
        let built = ArtistIndexSet::build(&credits).unwrap();
        built.save(&snapshot).unwrap();

        let loaded = ArtistIndexSet::load(&snapshot).unwrap();
        assert_eq!(loaded.single.len(), built.single.len());
        assert!(!loaded.multiple.is_built());
        assert!(!loaded.stupid.is_built());
    }

    #[test]
    fn alias_gets_its_own_indexed_entry() {
        let mut c = credit(5, "Diddy", "Diddy", 1);
        c.aliases = vec!["Puff Daddy".to_string(), "Sean Combs".to_string()];
        let set = ArtistIndexSet::build(&[c]).unwrap();

        assert!(set.single.is_built());
        // credit name + two distinct aliases
        assert_eq!(set.single.len(), 3);
    }

    #[test]
    fn duplicate_alias_is_deduped_against_credit_name() {
        let mut c = credit(6, "Portishead", "Portishead", 1);
        c.aliases = vec!["Portishead".to_string()];
        let set = ArtistIndexSet::build(&[c]).unwrap();

        assert_eq!(set.single.len(), 1);
    }

    #[test]
    fn multi_contributor_credit_aliases_are_not_indexed() {
        let mut c = credit(7, "Queen & David Bowie", "Queen & David Bowie", 2);
        c.aliases = vec!["Bowie & Queen".to_string()];
        let set = ArtistIndexSet::build(&[c]).unwrap();

        assert!(set.multiple.is_built());
        // only the credit name itself; aliases are single-artist-only enrichment
        assert_eq!(set.multiple.len(), 1);
    }

    #[test]
    fn loading_empty_snapshot_yields_unbuilt_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CatalogSnapshot::open(dir.path().join("catalog.redb")).unwrap();
        let loaded = ArtistIndexSet::load(&snapshot).unwrap();
        assert!(!loaded.single.is_built());
        assert!(!loaded.multiple.is_built());
        assert!(!loaded.stupid.is_built());
    }
}
