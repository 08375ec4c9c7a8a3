//! Error-path behavior at the `MapperEngine` boundary (spec.md §7): a
//! corrupted sub-index blob surfaces as a hard error, while a missing
//! sub-index blob on the stupid-artist path resolves to a clean no-match
//! rather than propagating `SubIndexMissing`.

use mapper::{ArtistCredit, ArtistIndexSet, CatalogSnapshot, MapperEngine, MappingRow, MatchError, MatcherConfig, SubIndex};

fn row(artist_credit_id: u32, artist_credit_name: &str) -> MappingRow {
    MappingRow {
        artist_credit_id,
        artist_mbids: "mbid-artist".into(),
        artist_credit_name: artist_credit_name.into(),
        artist_credit_sortname: artist_credit_name.into(),
        artist_aliases: Vec::new(),
        release_id: 10,
        release_mbid: "mbid-release-10".into(),
        release_artist_credit_id: artist_credit_id,
        release_name: "Some Release".into(),
        recording_id: 100,
        recording_mbid: "mbid-recording-100".into(),
        recording_name: "Some Recording".into(),
        score: 0,
    }
}

fn engine_without_sub_index(dir: &std::path::Path, artist_credit_name: &str) -> MapperEngine {
    let path = dir.join("catalog.redb");
    let snapshot = CatalogSnapshot::open(&path).unwrap();
    let rows = vec![row(1, artist_credit_name)];
    snapshot.ingest_rows(&rows).unwrap();

    let credits = vec![ArtistCredit {
        artist_credit_id: 1,
        artist_credit_name: artist_credit_name.into(),
        artist_credit_sortname: artist_credit_name.into(),
        contributor_count: 1,
        aliases: Vec::new(),
    }];
    ArtistIndexSet::build(&credits).unwrap().save(&snapshot).unwrap();
    // Deliberately skip storing the sub_index blob for artist_credit_id 1.

    MapperEngine::open(MatcherConfig { index_dir: path, ..MatcherConfig::default() }).unwrap()
}

/// Stupid path: artist name is punctuation-only, so `encode` yields an empty
/// string and the matcher falls back to `encode_stupid`. With no sub-index
/// blob stored for the matched artist credit, the FSM must backtrack to a
/// clean no-match instead of surfacing `SubIndexMissing`.
#[test]
fn stupid_path_missing_sub_index_resolves_to_no_match() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_without_sub_index(dir.path(), "!!!");

    let result = engine.search("!!!", None, "Some Recording").unwrap();
    assert!(result.is_none());
}

/// Normal path: artist name encodes fine, so a missing sub-index blob is an
/// internal inconsistency (the artist index and the sub-index store
/// disagreeing) and must surface as a hard error, not a silent no-match.
#[test]
fn normal_path_missing_sub_index_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_without_sub_index(dir.path(), "Portishead");

    let err = engine.search("Portishead", None, "Some Recording").unwrap_err();
    assert!(matches!(err, mapper::MapperError::Match(MatchError::SubIndexMissing(1))));
}

/// A sub-index blob that fails to deserialize (here, simply truncated garbage
/// rather than a valid bincode-encoded `SubIndex`) must surface as
/// `DeserializeCorrupt`, not panic or silently behave as a no-match.
#[test]
fn corrupted_sub_index_blob_surfaces_as_deserialize_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.redb");
    let snapshot = CatalogSnapshot::open(&path).unwrap();
    let rows = vec![row(1, "Portishead")];
    snapshot.ingest_rows(&rows).unwrap();

    let credits = vec![ArtistCredit {
        artist_credit_id: 1,
        artist_credit_name: "Portishead".into(),
        artist_credit_sortname: "Portishead".into(),
        contributor_count: 1,
        aliases: Vec::new(),
    }];
    ArtistIndexSet::build(&credits).unwrap().save(&snapshot).unwrap();
    snapshot.store_index_blob(1, &[0xff, 0x01, 0x02, 0x03]).unwrap();

    let engine = MapperEngine::open(MatcherConfig { index_dir: path, ..MatcherConfig::default() }).unwrap();
    let err = engine.search("Portishead", None, "Some Recording").unwrap_err();
    assert!(matches!(err, mapper::MapperError::Match(MatchError::DeserializeCorrupt(_))));
}

/// An artist name with no catalog match at all is a clean `Ok(None)`, never
/// an error — absence of a match is not a failure condition.
#[test]
fn unknown_artist_is_ok_none_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.redb");
    let snapshot = CatalogSnapshot::open(&path).unwrap();
    let rows = vec![row(1, "Portishead")];
    snapshot.ingest_rows(&rows).unwrap();
    let credits = vec![ArtistCredit {
        artist_credit_id: 1,
        artist_credit_name: "Portishead".into(),
        artist_credit_sortname: "Portishead".into(),
        contributor_count: 1,
        aliases: Vec::new(),
    }];
    ArtistIndexSet::build(&credits).unwrap().save(&snapshot).unwrap();
    let artist_rows = snapshot.rows_for_artist_credit(1).unwrap();
    let sub_index = SubIndex::build(1, &artist_rows).unwrap();
    let mut buf = Vec::new();
    sub_index.save(&mut buf).unwrap();
    snapshot.store_index_blob(1, &buf).unwrap();

    let engine = MapperEngine::open(MatcherConfig { index_dir: path, ..MatcherConfig::default() }).unwrap();
    let result = engine.search("Nobody Resembling This At All Xyz", None, "Some Recording").unwrap();
    assert!(result.is_none());
}
