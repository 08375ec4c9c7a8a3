//! Resolves a matched `(release_id, recording_id)` pair back to MBIDs and
//! display names from the catalog snapshot.

use crate::{CatalogError, CatalogSnapshot, MappingRow};

/// Fully resolved metadata for a matched triple.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    pub artist_credit_id: u32,
    pub artist_credit_name: String,
    pub artist_credit_mbids: Vec<String>,
    pub release_id: u32,
    pub release_name: String,
    pub release_mbid: String,
    pub recording_id: u32,
    pub recording_name: String,
    pub recording_mbid: String,
}

fn parse_mbids(artist_mbids: &str) -> Vec<String> {
    artist_mbids
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_row(row: MappingRow) -> ResolvedMetadata {
    ResolvedMetadata {
        artist_credit_id: row.artist_credit_id,
        artist_credit_name: row.artist_credit_name,
        artist_credit_mbids: parse_mbids(&row.artist_mbids),
        release_id: row.release_id,
        release_name: row.release_name,
        release_mbid: row.release_mbid,
        recording_id: row.recording_id,
        recording_name: row.recording_name,
        recording_mbid: row.recording_mbid,
    }
}

/// Resolves matched ids to display metadata via one snapshot handle.
///
/// Each worker owns its own `MetadataResolver` over its own `CatalogSnapshot`
/// handle (spec.md §5: "one catalog-snapshot connection per worker").
pub struct MetadataResolver {
    snapshot: CatalogSnapshot,
}

impl MetadataResolver {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self { snapshot }
    }

    /// Resolve `(release_id, recording_id)`. If `release_id` is zero (the
    /// synthetic unknown-release branch), falls back to the lowest-score row
    /// matching `recording_id` alone.
    pub fn resolve(
        &self,
        release_id: u32,
        recording_id: u32,
    ) -> Result<Option<ResolvedMetadata>, CatalogError> {
        let row = if release_id != 0 {
            self.snapshot.row_for_release_recording(release_id, recording_id)?
        } else {
            self.snapshot.lowest_score_row_for_recording(recording_id)?
        };
        Ok(row.map(resolve_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MappingRow;

    fn row() -> MappingRow {
        MappingRow {
            artist_credit_id: 1,
            artist_mbids: "mbid-a,mbid-b".into(),
            artist_credit_name: "Queen & David Bowie".into(),
            artist_credit_sortname: "Queen & David Bowie".into(),
            artist_aliases: Vec::new(),
            release_id: 10,
            release_mbid: "mbid-release".into(),
            release_artist_credit_id: 1,
            release_name: "Hot Space".into(),
            recording_id: 100,
            recording_mbid: "mbid-recording".into(),
            recording_name: "Under Pressure".into(),
            score: 0,
        }
    }

    #[test]
    fn resolves_exact_release_and_recording() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CatalogSnapshot::open(dir.path().join("catalog.redb")).unwrap();
        snapshot.ingest_rows(&[row()]).unwrap();

        let resolver = MetadataResolver::new(snapshot);
        let resolved = resolver.resolve(10, 100).unwrap().unwrap();
        assert_eq!(resolved.artist_credit_mbids, vec!["mbid-a", "mbid-b"]);
        assert_eq!(resolved.release_name, "Hot Space");
    }

    #[test]
    fn falls_back_to_lowest_score_when_release_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CatalogSnapshot::open(dir.path().join("catalog.redb")).unwrap();
        let mut canonical = row();
        canonical.release_id = 20;
        canonical.score = 1;
        let mut other = row();
        other.release_id = 30;
        other.score = 9;
        snapshot.ingest_rows(&[other, canonical.clone()]).unwrap();

        let resolver = MetadataResolver::new(snapshot);
        let resolved = resolver.resolve(0, 100).unwrap().unwrap();
        assert_eq!(resolved.release_id, 20);
    }

    #[test]
    fn missing_pair_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CatalogSnapshot::open(dir.path().join("catalog.redb")).unwrap();
        let resolver = MetadataResolver::new(snapshot);
        assert_eq!(resolver.resolve(1, 1).unwrap(), None);
    }
}
