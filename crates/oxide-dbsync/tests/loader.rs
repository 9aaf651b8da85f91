//! Integration tests for loading a score directory and applying it.

mod common;

use std::fs;

use common::{updater, GRAIN_A, GRAIN_B};
use oxide_dbsync::adaptor::DbAdaptor;
use oxide_dbsync::error::DbSyncError;
use oxide_dbsync::loader::load_score_dir;
use oxide_score::checksum::Fingerprint;
use oxide_score::score::Score;

const B_EXTRA: &str = r#"{"elements": [
    {"kind": "index", "name": "ix_ref", "table": "t2", "columns": ["ref"]}
]}"#;

#[test]
fn directory_is_loaded_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.json"), GRAIN_B).unwrap();
    fs::write(dir.path().join("a.json"), GRAIN_A).unwrap();
    fs::write(dir.path().join("b.indices.json"), B_EXTRA).unwrap();

    let grains = load_score_dir(dir.path()).unwrap();
    let names: Vec<&str> = grains.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(grains[0].fingerprint, Fingerprint::of(GRAIN_A.as_bytes()));
    assert_eq!(
        grains[1].fingerprint,
        Fingerprint::of(GRAIN_B.as_bytes()).combine(Fingerprint::of(B_EXTRA.as_bytes()))
    );

    let score = Score::build(grains).unwrap();
    assert_eq!(score.grain("b").unwrap().indices().len(), 1);
}

#[test]
fn invalid_json_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.json"), "{\"name\": ").unwrap();

    let err = load_score_dir(dir.path()).unwrap_err();
    let DbSyncError::ParseError { path, .. } = &err else {
        panic!("Expected a parse error, got {err}");
    };
    assert!(path.ends_with("a.json"));
}

#[tokio::test]
async fn loaded_score_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.json"), GRAIN_A).unwrap();
    fs::write(dir.path().join("b.json"), GRAIN_B).unwrap();
    fs::write(dir.path().join("b.indices.json"), B_EXTRA).unwrap();

    let score = Score::build(load_score_dir(dir.path()).unwrap()).unwrap();
    let mut updater = updater().await;
    updater.update_db(&score).await.unwrap();

    let db = updater.adaptor_mut();
    let indices = db.indices("b").await.unwrap();
    assert_eq!(indices.len(), 1);
    assert_eq!(indices[0].name, "ix_ref");
    assert_eq!(indices[0].columns, ["ref"]);

    let record = db.grain_record("b").await.unwrap().unwrap();
    assert!(record.matches(score.grain("b").unwrap().fingerprint()));
}
