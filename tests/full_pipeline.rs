//! End-to-end scenarios over an in-memory catalog snapshot, mirroring the
//! seven literal examples worked through end to end.

use mapper::{ArtistCredit, ArtistIndexSet, CatalogSnapshot, MapperEngine, MappingRow, MatcherConfig, SubIndex};

fn row(
    artist_credit_id: u32,
    artist_credit_name: &str,
    artist_mbids: &str,
    release_id: u32,
    release_name: &str,
    recording_id: u32,
    recording_name: &str,
    score: u32,
) -> MappingRow {
    MappingRow {
        artist_credit_id,
        artist_mbids: artist_mbids.into(),
        artist_credit_name: artist_credit_name.into(),
        artist_credit_sortname: artist_credit_name.into(),
        artist_aliases: Vec::new(),
        release_id,
        release_mbid: format!("mbid-release-{release_id}"),
        release_artist_credit_id: artist_credit_id,
        release_name: release_name.into(),
        recording_id,
        recording_mbid: format!("mbid-recording-{recording_id}"),
        recording_name: recording_name.into(),
        score,
    }
}

fn engine_over(rows: &[MappingRow]) -> (MapperEngine, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.redb");
    let snapshot = CatalogSnapshot::open(&path).unwrap();
    snapshot.ingest_rows(rows).unwrap();

    let mut credits_seen = std::collections::BTreeMap::new();
    for r in rows {
        credits_seen.entry(r.artist_credit_id).or_insert_with(|| ArtistCredit {
            artist_credit_id: r.artist_credit_id,
            artist_credit_name: r.artist_credit_name.clone(),
            artist_credit_sortname: r.artist_credit_sortname.clone(),
            contributor_count: r.artist_mbids.split(',').count(),
            aliases: r.artist_aliases.clone(),
        });
    }
    let credits: Vec<ArtistCredit> = credits_seen.into_values().collect();
    ArtistIndexSet::build(&credits).unwrap().save(&snapshot).unwrap();

    let artist_credit_ids: std::collections::BTreeSet<u32> =
        rows.iter().map(|r| r.artist_credit_id).collect();
    for artist_credit_id in artist_credit_ids {
        let artist_rows = snapshot.rows_for_artist_credit(artist_credit_id).unwrap();
        let sub_index = SubIndex::build(artist_credit_id, &artist_rows).unwrap();
        let mut buf = Vec::new();
        sub_index.save(&mut buf).unwrap();
        snapshot.store_index_blob(artist_credit_id as i64, &buf).unwrap();
    }

    let engine = MapperEngine::open(MatcherConfig {
        index_dir: path,
        ..MatcherConfig::default()
    })
    .unwrap();
    (engine, dir)
}

/// Scenario 1: exact triple resolves with high confidence.
#[test]
fn exact_triple_resolves_with_high_confidence() {
    let rows = vec![row(1, "Portishead", "8f3471b5-artist", 10, "Portishead", 100, "Western Eyes", 0)];
    let (engine, _dir) = engine_over(&rows);

    let result = engine
        .search("portishead", Some("portishead"), "western eyes")
        .unwrap()
        .expect("expected a match");
    assert_eq!(result.artist_credit_id, 1);
    assert_eq!(result.release_id, 10);
    assert_eq!(result.recording_id, 100);
    assert!(result.confidence >= 0.9);
}

/// Scenario 2: fuzzy-tolerant variants of the same triple still resolve.
#[test]
fn fuzzy_variants_still_resolve_above_threshold() {
    let rows = vec![row(1, "Portishead", "8f3471b5-artist", 10, "Portishead", 100, "Western Eyes", 0)];
    let (engine, _dir) = engine_over(&rows);

    let result = engine
        .search("portished", Some("portishad"), "western ey")
        .unwrap()
        .expect("expected a fuzzy match");
    assert_eq!(result.release_id, 10);
    assert_eq!(result.recording_id, 100);
    assert!(result.confidence >= 0.7);
}

/// Scenario 3: no release given, canonical (lowest-score) release wins.
#[test]
fn missing_release_falls_back_to_lowest_score_release() {
    let rows = vec![
        row(1, "Billie Eilish", "f4abc000-artist", 50, "Non-canonical reissue", 500, "COPYCAT", 9),
        row(1, "Billie Eilish", "f4abc000-artist", 51, "dont smile at me", 500, "COPYCAT", 0),
    ];
    let (engine, _dir) = engine_over(&rows);

    let result = engine
        .search("Billie Eilish", None, "COPYCAT")
        .unwrap()
        .expect("expected a canonical-release match");
    assert_eq!(result.release_id, 51);
}

/// Scenario 4: multi-artist credit carries both contributing MBIDs.
#[test]
fn multi_artist_credit_carries_both_mbids() {
    let rows = vec![row(
        1,
        "Queen & David Bowie",
        "0383dadf-artist,0d82be22-artist",
        20,
        "Hot Space",
        200,
        "Under Pressure",
        0,
    )];
    let (engine, _dir) = engine_over(&rows);

    let result = engine
        .search("queen & david bowie", Some("Hot Space"), "under pressure")
        .unwrap()
        .expect("expected a match");
    assert_eq!(result.artist_credit_mbids.len(), 2);
}

/// Scenario 5: a transliterated credit name (non-Latin script paired with an
/// all-Latin sort name) resolves from a query against the sort name alone.
#[test]
fn transliterated_artist_resolves_from_sortname_query() {
    let rows = vec![MappingRow {
        artist_credit_id: 1,
        artist_mbids: "c4e52c3a-artist".into(),
        artist_credit_name: "幾何学模様".into(),
        artist_credit_sortname: "Kikagaku Moyo".into(),
        artist_aliases: Vec::new(),
        release_id: 60,
        release_mbid: "mbid-release-60".into(),
        release_artist_credit_id: 1,
        release_name: "Forest of Lost Children".into(),
        recording_id: 600,
        recording_mbid: "mbid-recording-600".into(),
        recording_name: "Green Sugar".into(),
        score: 0,
    }];
    let (engine, _dir) = engine_over(&rows);

    let result = engine
        .search("Kikagaku Moyo", Some("Forest of Lost Children"), "Green Sugar")
        .unwrap()
        .expect("expected a transliterated match");
    assert_eq!(result.artist_credit_id, 1);
    assert_eq!(result.release_id, 60);
    assert_eq!(result.recording_id, 600);
}

/// Scenario 6: stupid-artist path resolves a punctuation-only credit name.
#[test]
fn stupid_artist_path_resolves_punctuation_only_name() {
    let rows = vec![row(1, "!!!", "731ff3e8-artist", 30, "As If", 300, "Ooo", 0)];
    let (engine, _dir) = engine_over(&rows);

    let result = engine
        .search("!!!", Some("As If"), "Ooo")
        .unwrap()
        .expect("expected a stupid-path match");
    assert_eq!(result.release_id, 30);
    assert_eq!(result.recording_id, 300);
}

/// Scenario 7: a recording mis-attributed to the wrong artist, with no
/// release argument to disambiguate, must end in no-match rather than a
/// wrong triple.
#[test]
fn misattributed_recording_without_release_fails_cleanly() {
    let rows = vec![row(
        1,
        "Darkseed",
        "aaaaaaaa-artist",
        40,
        "Spellcraft",
        400,
        "Poison My Eyes",
        0,
    )];
    let (engine, _dir) = engine_over(&rows);

    let result = engine.search("darkseed", None, "entre dos tierras").unwrap();
    assert!(result.is_none());
}
