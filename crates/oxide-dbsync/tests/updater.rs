//! Integration tests for reconciling an SQLite database with a score.
//!
//! Every test starts from an empty in-memory database and drives
//! `DbUpdater::update_db` through one or more score revisions.

mod common;

use common::{
    build, exec, record, scalar, set_state, updater, GRAIN_A, GRAIN_B, GRAIN_B_1_1, GRAIN_M,
};
use oxide_dbsync::adaptor::DbAdaptor;
use oxide_dbsync::catalog::{GrainState, TableType};
use oxide_dbsync::error::DbSyncError;
use oxide_dbsync::updater::UpdaterConfig;
use oxide_score::grain::SYSTEM_GRAIN;
use oxide_score::version::VersionOrdering;

// =============================================================================
// First run and idempotence
// =============================================================================

#[tokio::test]
async fn first_run_creates_everything() {
    let score = build(&[GRAIN_A, GRAIN_B]);
    let mut updater = updater().await;
    updater.update_db(&score).await.unwrap();

    let db = updater.adaptor_mut();
    assert!(db.table_exists(SYSTEM_GRAIN, "grains").await.unwrap());
    assert!(db.table_exists("a", "t1").await.unwrap());
    assert!(db.table_exists("b", "t2").await.unwrap());

    let records = db.grain_records().await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", SYSTEM_GRAIN]);
    for record in &records {
        assert_eq!(record.state, GrainState::Ready, "grain {}", record.id);
        let grain = score.grain(&record.id).unwrap();
        assert!(record.matches(grain.fingerprint()));
        assert_eq!(record.version, grain.version().to_string());
    }

    let fks = db.foreign_keys("b").await.unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].ref_grain, "a");
    assert_eq!(fks[0].ref_table, "t1");

    let catalog = db.table_catalog("a").await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].name, "t1");
    assert_eq!(catalog[0].table_type, TableType::Table);
    assert!(!catalog[0].orphaned);
}

#[tokio::test]
async fn second_run_executes_no_ddl() {
    let score = build(&[GRAIN_A, GRAIN_B]);
    let mut updater = updater().await;
    updater.update_db(&score).await.unwrap();
    updater.adaptor_mut().take_executed_ddl();

    updater.update_db(&score).await.unwrap();
    assert!(updater.adaptor().executed_ddl().is_empty());
}

#[tokio::test]
async fn recover_on_unchanged_grains_executes_no_ddl() {
    let score = build(&[GRAIN_A, GRAIN_B]);
    let mut updater = updater().await;
    updater.update_db(&score).await.unwrap();

    let db = updater.adaptor_mut();
    set_state(db, "a", GrainState::Recover).await;
    set_state(db, "b", GrainState::Recover).await;
    db.take_executed_ddl();

    updater.update_db(&score).await.unwrap();
    assert_eq!(updater.adaptor().executed_ddl(), &[] as &[String]);

    let db = updater.adaptor_mut();
    assert_eq!(record(db, "a").await.state, GrainState::Ready);
    assert_eq!(record(db, "b").await.state, GrainState::Ready);
}

// =============================================================================
// Upgrades
// =============================================================================

#[tokio::test]
async fn new_version_adds_column_only_to_its_grain() {
    let mut updater = updater().await;
    updater
        .update_db(&build(&[GRAIN_A, GRAIN_B]))
        .await
        .unwrap();
    updater.adaptor_mut().take_executed_ddl();

    let score = build(&[GRAIN_A, GRAIN_B_1_1]);
    updater.update_db(&score).await.unwrap();

    let ddl = updater.adaptor().executed_ddl();
    assert_eq!(ddl.len(), 1, "{ddl:?}");
    assert!(ddl[0].starts_with("ALTER TABLE \"b_t2\" ADD COLUMN \"y\""));

    let db = updater.adaptor_mut();
    let b = record(db, "b").await;
    assert_eq!(b.version, "1.1");
    assert_eq!(b.state, GrainState::Ready);
    assert_eq!(record(db, "a").await.version, "1.0");
    assert!(db.columns("b", "t2").await.unwrap().contains_key("y"));
}

#[tokio::test]
async fn changed_checksum_at_same_version_is_applied() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_A])).await.unwrap();
    updater.adaptor_mut().take_executed_ddl();

    let edited = GRAIN_A.replace(
        r#"{"name": "x", "type": "INT"}"#,
        r#"{"name": "x", "type": "INT"}, {"name": "note", "type": "VARCHAR", "length": 20}"#,
    );
    let score = build(&[&edited]);
    updater.update_db(&score).await.unwrap();

    assert_eq!(updater.adaptor().executed_ddl().len(), 1);
    let db = updater.adaptor_mut();
    let a = record(db, "a").await;
    assert!(a.matches(score.grain("a").unwrap().fingerprint()));
}

#[tokio::test]
async fn altered_column_keeps_rows() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_A])).await.unwrap();
    exec(updater.adaptor_mut(), "INSERT INTO \"a_t1\" (\"id\", \"x\") VALUES (1, 7)").await;

    let widened = GRAIN_A
        .replace(r#""version": "1.0""#, r#""version": "1.1""#)
        .replace(
            r#"{"name": "x", "type": "INT"}"#,
            r#"{"name": "x", "type": "INT", "nullable": false, "default": "0"}"#,
        );
    updater.update_db(&build(&[&widened])).await.unwrap();

    let db = updater.adaptor_mut();
    let columns = db.columns("a", "t1").await.unwrap();
    assert!(!columns["x"].nullable);
    assert_eq!(columns["x"].default_value, "0");
    assert_eq!(scalar(db, "SELECT \"x\" FROM \"a_t1\" WHERE \"id\" = 1").await, 7);
}

#[tokio::test]
async fn sequences_are_created_and_altered() {
    let v1 = r#"{"name": "s", "version": "1.0", "elements": [
        {"kind": "sequence", "name": "ids", "start_with": 5}
    ]}"#;
    let v2 = r#"{"name": "s", "version": "1.1", "elements": [
        {"kind": "sequence", "name": "ids", "start_with": 5, "increment_by": 2}
    ]}"#;

    let mut updater = updater().await;
    updater.update_db(&build(&[v1])).await.unwrap();
    let db = updater.adaptor_mut();
    let sequences = db.sequences("s").await.unwrap();
    assert_eq!(sequences.len(), 1);
    assert_eq!(sequences[0].increment_by, 1);
    assert_eq!(
        scalar(db, "SELECT \"seqvalue\" FROM \"celesta_sequences\" WHERE \"seqname\" = 'ids'").await,
        5
    );

    updater.update_db(&build(&[v2])).await.unwrap();
    let sequences = updater.adaptor_mut().sequences("s").await.unwrap();
    assert_eq!(sequences[0].increment_by, 2);
}

// =============================================================================
// Primary keys
// =============================================================================

/// Grain `p` with `t1` keyed on `id` and `t3` referencing its primary key.
const GRAIN_P: &str = r#"{
    "name": "p",
    "version": "1.0",
    "elements": [
        {"kind": "table", "name": "t1", "columns": [
            {"name": "id", "type": "INT", "nullable": false},
            {"name": "code", "type": "INT", "nullable": false}
        ], "primary_key": {"columns": ["id"]}},
        {"kind": "table", "name": "t3", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "parent", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["parent"], "references": {"table": "t1"}}
        ]}
    ]
}"#;

/// Grain `q` with `t2` referencing the primary key of `p.t1`.
const GRAIN_Q: &str = r#"{
    "name": "q",
    "version": "1.0",
    "elements": [
        {"kind": "table", "name": "t2", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "ref", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["ref"], "references": {"grain": "p", "table": "t1"}}
        ]}
    ]
}"#;

#[tokio::test]
async fn renamed_primary_key_keeps_keys_of_other_grains() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_A, GRAIN_B])).await.unwrap();
    assert_eq!(updater.adaptor_mut().foreign_keys("b").await.unwrap().len(), 1);

    let renamed = r#"{
        "name": "a",
        "version": "1.1",
        "elements": [
            {"kind": "table", "name": "t1", "columns": [
                {"name": "id", "type": "INT", "nullable": false},
                {"name": "x", "type": "INT"}
            ], "primary_key": {"name": "pk_renamed", "columns": ["id"]}}
        ]
    }"#;
    let score = build(&[renamed, GRAIN_B]);
    updater.update_db(&score).await.unwrap();

    let db = updater.adaptor_mut();
    let pk = db.primary_key("a", "t1").await.unwrap();
    assert_eq!(pk.name, "pk_renamed");
    assert_eq!(pk.columns, vec!["id"]);
    let fks = db.foreign_keys("b").await.unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].table, "t2");
    assert!(fks[0].references("a", "t1"));
    assert_eq!(record(db, "b").await.state, GrainState::Ready);

    db.take_executed_ddl();
    updater.update_db(&score).await.unwrap();
    let db = updater.adaptor_mut();
    assert!(db.executed_ddl().is_empty());
    assert_eq!(db.foreign_keys("b").await.unwrap().len(), 1);
}

#[tokio::test]
async fn changed_primary_key_columns_keep_referencing_keys() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_P, GRAIN_Q])).await.unwrap();

    let rekeyed = GRAIN_P
        .replace(r#""version": "1.0""#, r#""version": "1.1""#)
        .replace(
            r#""primary_key": {"columns": ["id"]}"#,
            r#""primary_key": {"columns": ["code"]}"#,
        );
    updater
        .update_db(&build(&[&rekeyed, GRAIN_Q]))
        .await
        .unwrap();

    let db = updater.adaptor_mut();
    let pk = db.primary_key("p", "t1").await.unwrap();
    assert_eq!(pk.name, "pk_t1");
    assert_eq!(pk.columns, vec!["code"]);

    let same_grain = db.foreign_keys("p").await.unwrap();
    assert_eq!(same_grain.len(), 1);
    assert_eq!(same_grain[0].table, "t3");
    assert!(same_grain[0].references("p", "t1"));

    let other_grain = db.foreign_keys("q").await.unwrap();
    assert_eq!(other_grain.len(), 1);
    assert_eq!(other_grain[0].table, "t2");
    assert!(other_grain[0].references("p", "t1"));
    assert_eq!(record(db, "q").await.state, GrainState::Ready);
}

#[tokio::test]
async fn altered_primary_key_column_keeps_key_and_references() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_A, GRAIN_B])).await.unwrap();
    exec(updater.adaptor_mut(), "INSERT INTO \"a_t1\" (\"id\", \"x\") VALUES (1, 7)").await;

    let defaulted = GRAIN_A
        .replace(r#""version": "1.0""#, r#""version": "1.1""#)
        .replace(
            r#"{"name": "id", "type": "INT", "nullable": false, "primary_key": true}"#,
            r#"{"name": "id", "type": "INT", "nullable": false, "primary_key": true, "default": "0"}"#,
        );
    updater
        .update_db(&build(&[&defaulted, GRAIN_B]))
        .await
        .unwrap();

    let db = updater.adaptor_mut();
    assert_eq!(db.columns("a", "t1").await.unwrap()["id"].default_value, "0");
    let pk = db.primary_key("a", "t1").await.unwrap();
    assert_eq!(pk.name, "pk_t1");
    assert_eq!(pk.columns, vec!["id"]);
    assert_eq!(db.foreign_keys("b").await.unwrap().len(), 1);
    assert_eq!(scalar(db, "SELECT \"x\" FROM \"a_t1\" WHERE \"id\" = 1").await, 7);
}

// =============================================================================
// Refusals
// =============================================================================

#[tokio::test]
async fn lower_version_is_a_conflict() {
    let mut updater = updater().await;
    updater
        .update_db(&build(&[GRAIN_A, GRAIN_B_1_1]))
        .await
        .unwrap();
    updater.adaptor_mut().take_executed_ddl();

    let err = updater
        .update_db(&build(&[GRAIN_A, GRAIN_B]))
        .await
        .unwrap_err();
    match err {
        DbSyncError::VersionConflict {
            grain, ordering, ..
        } => {
            assert_eq!(grain, "b");
            assert_eq!(ordering, VersionOrdering::Lower);
        }
        other => panic!("Expected version conflict, got {other}"),
    }
    assert!(updater.adaptor().executed_ddl().is_empty());
}

#[tokio::test]
async fn version_with_other_tag_is_inconsistent() {
    let tagged = |version: &str| {
        GRAIN_A.replace(
            r#""version": "1.0""#,
            &format!(r#""version": "{version}""#),
        )
    };

    let mut updater = updater().await;
    updater.update_db(&build(&[&tagged("A1.0")])).await.unwrap();
    updater.adaptor_mut().take_executed_ddl();

    let err = updater
        .update_db(&build(&[&tagged("B1.0")]))
        .await
        .unwrap_err();
    match err {
        DbSyncError::VersionConflict {
            grain, ordering, ..
        } => {
            assert_eq!(grain, "a");
            assert_eq!(ordering, VersionOrdering::Inconsistent);
        }
        other => panic!("Expected version conflict, got {other}"),
    }
    assert!(updater.adaptor().executed_ddl().is_empty());
    assert_eq!(record(updater.adaptor_mut(), "a").await.version, "A1.0");
}

#[tokio::test]
async fn non_empty_database_requires_force() {
    let score = build(&[GRAIN_A]);

    let mut updater = updater().await;
    exec(updater.adaptor_mut(), "CREATE TABLE legacy (id INTEGER)").await;
    let err = updater.update_db(&score).await.unwrap_err();
    assert!(matches!(err, DbSyncError::NonEmptyDatabase));
    assert!(!updater
        .adaptor_mut()
        .table_exists(SYSTEM_GRAIN, "grains")
        .await
        .unwrap());

    let mut updater = updater
        .config(UpdaterConfig::new().force_init(true));
    updater.update_db(&score).await.unwrap();
    let db = updater.adaptor_mut();
    assert!(db.table_exists("a", "t1").await.unwrap());
    assert_eq!(scalar(db, "SELECT COUNT(*) FROM legacy").await, 0);
}

#[tokio::test]
async fn locked_grain_is_skipped() {
    let mut updater = updater().await;
    updater
        .update_db(&build(&[GRAIN_A, GRAIN_B]))
        .await
        .unwrap();
    set_state(updater.adaptor_mut(), "b", GrainState::Lock).await;
    updater.adaptor_mut().take_executed_ddl();

    updater
        .update_db(&build(&[GRAIN_A, GRAIN_B_1_1]))
        .await
        .unwrap();
    assert!(updater.adaptor().executed_ddl().is_empty());

    let b = record(updater.adaptor_mut(), "b").await;
    assert_eq!(b.state, GrainState::Lock);
    assert_eq!(b.version, "1.0");
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn failed_grain_is_marked_and_blocks_later_runs() {
    let mut updater = updater().await;
    updater
        .update_db(&build(&[GRAIN_A, GRAIN_B]))
        .await
        .unwrap();
    exec(updater.adaptor_mut(), "INSERT INTO \"a_t1\" (\"id\", \"x\") VALUES (1, 1)").await;

    let broken = GRAIN_A
        .replace(r#""version": "1.0""#, r#""version": "1.1""#)
        .replace(
            r#"{"name": "x", "type": "INT"}"#,
            r#"{"name": "x", "type": "INT"}, {"name": "z", "type": "INT", "nullable": false}"#,
        );
    let score = build(&[&broken, GRAIN_B]);
    let err = updater.update_db(&score).await.unwrap_err();
    match &err {
        DbSyncError::NotAllGrainsUpdated(grains) => assert_eq!(grains, &["a".to_string()]),
        other => panic!("Expected partial failure, got {other}"),
    }

    let db = updater.adaptor_mut();
    let a = record(db, "a").await;
    assert_eq!(a.state, GrainState::Error);
    assert!(a.message.starts_with("1.1/"), "{}", a.message);
    assert!(!db.columns("a", "t1").await.unwrap().contains_key("z"));
    assert_eq!(scalar(db, "SELECT COUNT(*) FROM \"a_t1\"").await, 1);
    assert_eq!(record(db, "b").await.state, GrainState::Ready);

    let err = updater.update_db(&score).await.unwrap_err();
    assert!(matches!(
        err,
        DbSyncError::InvalidGrainState {
            state: GrainState::Error,
            ..
        }
    ));
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn undeclared_table_is_marked_orphaned() {
    let v1 = r#"{"name": "a", "version": "1.0", "elements": [
        {"kind": "table", "name": "t1", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true}
        ]},
        {"kind": "table", "name": "t3", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true}
        ]}
    ]}"#;
    let v2 = r#"{"name": "a", "version": "1.1", "elements": [
        {"kind": "table", "name": "t1", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true}
        ]}
    ]}"#;

    let mut updater = updater().await;
    updater.update_db(&build(&[v1])).await.unwrap();
    updater.update_db(&build(&[v2])).await.unwrap();

    let db = updater.adaptor_mut();
    let catalog = db.table_catalog("a").await.unwrap();
    let t3 = catalog.iter().find(|e| e.name == "t3").unwrap();
    assert!(t3.orphaned);
    assert!(!catalog.iter().find(|e| e.name == "t1").unwrap().orphaned);
    assert!(db.table_exists("a", "t3").await.unwrap());
}

// =============================================================================
// Views
// =============================================================================

#[tokio::test]
async fn views_are_created() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_M])).await.unwrap();

    let db = updater.adaptor_mut();
    assert_eq!(db.views("m").await.unwrap(), ["big"]);
    assert_eq!(db.parameterized_views("m").await.unwrap(), ["by_id"]);

    exec(db, "INSERT INTO \"m_t1\" (\"id\", \"grp\", \"amount\") VALUES (1, 'a', 50.0)").await;
    exec(db, "INSERT INTO \"m_t1\" (\"id\", \"grp\", \"amount\") VALUES (2, 'a', 5.0)").await;
    assert_eq!(scalar(db, "SELECT COUNT(*) FROM \"m_big\"").await, 1);

    let catalog = db.table_catalog("m").await.unwrap();
    let kinds: Vec<(&str, TableType)> = catalog
        .iter()
        .map(|e| (e.name.as_str(), e.table_type))
        .collect();
    assert!(kinds.contains(&("big", TableType::View)));
    assert!(kinds.contains(&("by_id", TableType::Function)));
    assert!(kinds.contains(&("totals", TableType::MaterializedView)));
}

#[tokio::test]
async fn materialized_view_follows_source_rows() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_M])).await.unwrap();

    let db = updater.adaptor_mut();
    exec(db, "INSERT INTO \"m_t1\" (\"id\", \"grp\", \"amount\") VALUES (1, 'a', 2.0)").await;
    exec(db, "INSERT INTO \"m_t1\" (\"id\", \"grp\", \"amount\") VALUES (2, 'a', 3.0)").await;
    exec(db, "INSERT INTO \"m_t1\" (\"id\", \"grp\", \"amount\") VALUES (3, 'b', 4.0)").await;

    let total_a = "SELECT CAST(\"total\" AS INTEGER) FROM \"m_totals\" WHERE \"grp\" = 'a'";
    let count_a = "SELECT \"cnt\" FROM \"m_totals\" WHERE \"grp\" = 'a'";
    assert_eq!(scalar(db, total_a).await, 5);
    assert_eq!(scalar(db, count_a).await, 2);

    exec(db, "UPDATE \"m_t1\" SET \"grp\" = 'b' WHERE \"id\" = 2").await;
    assert_eq!(scalar(db, total_a).await, 2);
    assert_eq!(
        scalar(db, "SELECT \"cnt\" FROM \"m_totals\" WHERE \"grp\" = 'b'").await,
        2
    );

    exec(db, "DELETE FROM \"m_t1\" WHERE \"id\" = 1").await;
    assert_eq!(
        scalar(db, "SELECT COUNT(*) FROM \"m_totals\" WHERE \"grp\" = 'a'").await,
        0
    );
}

#[tokio::test]
async fn materialized_view_is_refilled_when_source_changes() {
    let mut updater = updater().await;
    updater.update_db(&build(&[GRAIN_M])).await.unwrap();
    let db = updater.adaptor_mut();
    exec(db, "INSERT INTO \"m_t1\" (\"id\", \"grp\", \"amount\") VALUES (1, 'a', 2.0)").await;
    exec(db, "DELETE FROM \"m_totals\"").await;

    let v2 = GRAIN_M.replace(r#""version": "1.0""#, r#""version": "1.1""#).replace(
        r#"{"name": "amount", "type": "REAL"}"#,
        r#"{"name": "amount", "type": "REAL"}, {"name": "note", "type": "TEXT"}"#,
    );
    updater.update_db(&build(&[&v2])).await.unwrap();

    let db = updater.adaptor_mut();
    assert_eq!(
        scalar(db, "SELECT \"cnt\" FROM \"m_totals\" WHERE \"grp\" = 'a'").await,
        1
    );
}
