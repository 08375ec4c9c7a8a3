//! Demo binary: builds a small on-disk catalog snapshot, runs a handful of
//! queries against it end to end, and prints the results.
//!
//! This exercises the pipeline the way a caller would — `mapper::init`,
//! `MapperEngine::open`, `MapperEngine::search` — without standing up the
//! HTTP surface or CLI argument parsing that sit outside this crate's scope.

use std::error::Error;

use mapper::{ArtistCredit, ArtistIndexSet, CatalogSnapshot, MapperEngine, MappingRow, MatcherConfig, SubIndex};
use tracing_subscriber::EnvFilter;

fn seed_rows() -> Vec<MappingRow> {
    vec![
        MappingRow {
            artist_credit_id: 1,
            artist_mbids: "8f3471b5-7e6a-48e3-8e4a-c5e7cd0eb2f8".into(),
            artist_credit_name: "Portishead".into(),
            artist_credit_sortname: "Portishead".into(),
            artist_aliases: Vec::new(),
            release_id: 10,
            release_mbid: "76df3287-6cda-33eb-8e9a-044b5e15ffdd".into(),
            release_artist_credit_id: 1,
            release_name: "Portishead".into(),
            recording_id: 100,
            recording_mbid: "f3b0b3b0-0b3b-0b3b-0b3b-0b3b0b3b0b3b".into(),
            recording_name: "Western Eyes".into(),
            score: 0,
        },
        MappingRow {
            artist_credit_id: 2,
            artist_mbids: "0383dadf-2a4e-4d10-a46a-e9e041da8eb3,0d82be22-b8a1-4cd8-a754-6e0e6ccb3aab".into(),
            artist_credit_name: "Queen & David Bowie".into(),
            artist_credit_sortname: "Queen & David Bowie".into(),
            artist_aliases: Vec::new(),
            release_id: 20,
            release_mbid: "08c45cb9-8879-3ed1-a01a-fa2b5dc4cce7".into(),
            release_artist_credit_id: 2,
            release_name: "Hot Space".into(),
            recording_id: 200,
            recording_mbid: "a1a2a3a4-a5a6-a7a8-a9aa-abacadaeafb0".into(),
            recording_name: "Under Pressure".into(),
            score: 0,
        },
    ]
}

fn build_demo_snapshot(path: &std::path::Path) -> Result<(), Box<dyn Error>> {
    let snapshot = CatalogSnapshot::open(path)?;
    let rows = seed_rows();
    snapshot.ingest_rows(&rows)?;

    let credits: Vec<ArtistCredit> = rows
        .iter()
        .map(|r| ArtistCredit {
            artist_credit_id: r.artist_credit_id,
            artist_credit_name: r.artist_credit_name.clone(),
            artist_credit_sortname: r.artist_credit_sortname.clone(),
            contributor_count: r.artist_mbids.split(',').count(),
            aliases: r.artist_aliases.clone(),
        })
        .collect();
    ArtistIndexSet::build(&credits)?.save(&snapshot)?;

    for artist_credit_id in [1u32, 2u32] {
        let artist_rows = snapshot.rows_for_artist_credit(artist_credit_id)?;
        let sub_index = SubIndex::build(artist_credit_id, &artist_rows)?;
        let mut buf = Vec::new();
        sub_index.save(&mut buf)?;
        snapshot.store_index_blob(artist_credit_id as i64, &buf)?;
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    mapper::init()?;

    let snapshot_path = std::env::temp_dir().join(format!("mapper-demo-{}.redb", std::process::id()));
    build_demo_snapshot(&snapshot_path)?;

    let engine = MapperEngine::open(MatcherConfig {
        index_dir: snapshot_path.clone(),
        ..MatcherConfig::default()
    })?;

    let queries: [(&str, Option<&str>, &str); 3] = [
        ("portishead", Some("portishead"), "western eyes"),
        ("portished", Some("portishad"), "western ey"),
        ("queen & david bowie", Some("Hot Space"), "under pressure"),
    ];

    for (artist, release, recording) in queries {
        match engine.search(artist, release, recording)? {
            Some(result) => println!(
                "{artist:?} / {release:?} / {recording:?} -> recording_id={} release_id={} confidence={:.3}",
                result.recording_id, result.release_id, result.confidence
            ),
            None => println!("{artist:?} / {release:?} / {recording:?} -> no match"),
        }
    }

    drop(engine);
    let _ = std::fs::remove_file(&snapshot_path);
    Ok(())
}
