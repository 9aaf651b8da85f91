#![allow(dead_code)]

use oxide_dbsync::adaptor::{DbAdaptor, SqliteAdaptor};
use oxide_dbsync::catalog::{GrainRecord, GrainState};
use oxide_dbsync::updater::DbUpdater;
use oxide_score::raw::RawGrain;
use oxide_score::score::Score;

pub fn build(grains: &[&str]) -> Score {
    let raw = grains
        .iter()
        .map(|g| RawGrain::from_json(g).unwrap_or_else(|e| panic!("Invalid grain JSON: {e}\n{g}")))
        .collect();
    Score::build(raw).unwrap_or_else(|e| panic!("Failed to build score:\n{e}"))
}

pub async fn updater() -> DbUpdater<SqliteAdaptor> {
    let adaptor = SqliteAdaptor::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    DbUpdater::new(adaptor)
}

pub async fn exec(db: &mut SqliteAdaptor, sql: &str) {
    sqlx::query(sql)
        .execute(db.connection())
        .await
        .unwrap_or_else(|e| panic!("Failed to execute {sql}: {e}"));
}

pub async fn scalar(db: &mut SqliteAdaptor, sql: &str) -> i64 {
    let (value,): (i64,) = sqlx::query_as(sql)
        .fetch_one(db.connection())
        .await
        .unwrap_or_else(|e| panic!("Failed to query {sql}: {e}"));
    value
}

pub async fn record(db: &mut SqliteAdaptor, grain: &str) -> GrainRecord {
    db.grain_record(grain)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("No record for grain '{grain}'"))
}

pub async fn set_state(db: &mut SqliteAdaptor, grain: &str, state: GrainState) {
    let sql = format!(
        "UPDATE \"celesta_grains\" SET \"state\" = {} WHERE \"id\" = '{grain}'",
        state.code()
    );
    exec(db, &sql).await;
}

/// Grain `a` with `t1(id INT PK, x INT)`.
pub const GRAIN_A: &str = r#"{
    "name": "a",
    "version": "1.0",
    "elements": [
        {"kind": "table", "name": "t1", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "x", "type": "INT"}
        ]}
    ]
}"#;

/// Grain `b` with `t2(id INT PK, ref INT REFERENCES a.t1(id))`.
pub const GRAIN_B: &str = r#"{
    "name": "b",
    "version": "1.0",
    "elements": [
        {"kind": "table", "name": "t2", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "ref", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["ref"], "references": {"grain": "a", "table": "t1", "columns": ["id"]}}
        ]}
    ]
}"#;

/// Grain `b` at 1.1, adding the nullable column `y`.
pub const GRAIN_B_1_1: &str = r#"{
    "name": "b",
    "version": "1.1",
    "elements": [
        {"kind": "table", "name": "t2", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "ref", "type": "INT"},
            {"name": "y", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["ref"], "references": {"grain": "a", "table": "t1", "columns": ["id"]}}
        ]}
    ]
}"#;

/// Grain `m` with a materialized view summing `t1.amount` per `grp`.
pub const GRAIN_M: &str = r#"{
    "name": "m",
    "version": "1.0",
    "elements": [
        {"kind": "table", "name": "t1", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "grp", "type": "VARCHAR", "length": 10, "nullable": false},
            {"name": "amount", "type": "REAL"}
        ]},
        {"kind": "view", "name": "big", "select": {
            "columns": [{"expr": {"field": {"column": "id"}}}],
            "from": [{"table": "t1"}],
            "where": {"compare": {"op": ">", "left": {"field": {"column": "amount"}}, "right": {"int": 10}}}
        }},
        {"kind": "parameterized_view", "name": "by_id", "parameters": [{"name": "p", "type": "INT"}],
         "select": {
            "columns": [{"expr": {"field": {"column": "amount"}}}],
            "from": [{"table": "t1"}],
            "where": {"compare": {"op": "=", "left": {"field": {"column": "id"}}, "right": {"param": {"name": "p"}}}}
        }},
        {"kind": "materialized_view", "name": "totals", "select": {
            "columns": [
                {"expr": {"field": {"column": "grp"}}},
                {"alias": "total", "expr": {"aggregate": {"func": "SUM",
                    "arg": {"field": {"column": "amount"}}}}},
                {"alias": "cnt", "expr": {"aggregate": {"func": "COUNT"}}}
            ],
            "from": [{"table": "t1"}],
            "group_by": ["grp"]
        }}
    ]
}"#;
