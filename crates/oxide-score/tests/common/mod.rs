#![allow(dead_code)]

use oxide_score::error::ScoreBuildError;
use oxide_score::raw::RawGrain;
use oxide_score::score::Score;

pub fn raw(json: &str) -> RawGrain {
    RawGrain::from_json(json).unwrap_or_else(|e| panic!("Invalid grain JSON: {e}\n{json}"))
}

pub fn build(grains: &[&str]) -> Score {
    Score::build(grains.iter().map(|g| raw(g)).collect())
        .unwrap_or_else(|e| panic!("Failed to build score:\n{e}"))
}

pub fn build_err(grains: &[&str]) -> ScoreBuildError {
    match Score::build(grains.iter().map(|g| raw(g)).collect()) {
        Ok(_) => panic!("Expected score build to fail"),
        Err(e) => e,
    }
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
