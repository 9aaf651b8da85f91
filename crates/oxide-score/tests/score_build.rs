//! Integration tests for building scores from JSON grain declarations.

mod common;

use common::{build, build_err, GRAIN_A, GRAIN_B};
use oxide_score::error::ErrorKind;
use oxide_score::foreign_key::FkRule;
use oxide_score::grain::SYSTEM_GRAIN;

// =============================================================================
// Dependency order
// =============================================================================

#[test]
fn grains_are_ordered_by_references() {
    let score = build(&[GRAIN_B, GRAIN_A]);
    let order: Vec<_> = score.grains().map(|g| g.name().to_string()).collect();
    assert_eq!(order, vec![SYSTEM_GRAIN, "a", "b"]);

    let orders: Vec<_> = score.grains().filter_map(|g| g.dependency_order()).collect();
    assert!(orders.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn foreign_key_is_resolved_across_grains() {
    let score = build(&[GRAIN_A, GRAIN_B]);
    let t2 = score.grain("b").unwrap().table("t2").unwrap();
    let fk = &t2.foreign_keys()[0];
    assert_eq!(fk.referenced_grain(), "a");
    assert_eq!(fk.referenced_table(), "t1");
    assert_eq!(fk.on_delete(), FkRule::NoAction);
    assert_eq!(fk.name(), "fk_b_t2_a_t1_ref");
}

#[test]
fn cycle_is_rejected_in_either_order() {
    let a = r#"{"name": "a", "elements": [
        {"kind": "table", "name": "t1", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "r", "type": "INT"}
        ], "foreign_keys": [{"columns": ["r"], "references": {"grain": "b", "table": "t2"}}]}
    ]}"#;
    let b = r#"{"name": "b", "elements": [
        {"kind": "table", "name": "t2", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "r", "type": "INT"}
        ], "foreign_keys": [{"columns": ["r"], "references": {"grain": "a", "table": "t1"}}]}
    ]}"#;

    for input in [[a, b], [b, a]] {
        let err = build_err(&input);
        let cycles: Vec<_> = err
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::CyclicReference)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].message.contains("'a'"));
        assert!(cycles[0].message.contains("'b'"));
    }
}

#[test]
fn self_referencing_table_is_not_a_cycle() {
    let tree = r#"{"name": "tree", "elements": [
        {"kind": "table", "name": "node", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "parent", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["parent"], "references": {"table": "node"}, "on_delete": "SET NULL"}
        ]}
    ]}"#;
    let score = build(&[tree]);
    let fk = &score.grain("tree").unwrap().table("node").unwrap().foreign_keys()[0];
    assert_eq!(fk.on_delete(), FkRule::SetNull);
}

// =============================================================================
// Foreign key shape
// =============================================================================

fn with_fk(column_type: &str, extra: &str, references: &str) -> String {
    format!(
        r#"{{"name": "c", "elements": [
            {{"kind": "table", "name": "t3", "columns": [
                {{"name": "id", "type": "INT", "nullable": false, "primary_key": true}},
                {{"name": "r", "type": "{column_type}"{extra}}}
            ], "foreign_keys": [{{"columns": ["r"], "references": {references}}}]}}
        ]}}"#
    )
}

#[test]
fn foreign_key_type_must_match_primary_key() {
    let grain = with_fk("VARCHAR", r#", "length": 5"#, r#"{"grain": "a", "table": "t1"}"#);
    let err = build_err(&[GRAIN_A, grain.as_str()]);
    assert!(err.for_grain("c").any(|e| e.kind == ErrorKind::TypeMismatch));
}

#[test]
fn foreign_key_columns_must_match_primary_key() {
    let grain = with_fk("INT", "", r#"{"grain": "a", "table": "t1", "columns": ["x"]}"#);
    let err = build_err(&[GRAIN_A, grain.as_str()]);
    assert!(err.for_grain("c").any(|e| e.kind == ErrorKind::IllegalKey));
}

#[test]
fn set_null_requires_nullable_columns() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "table", "name": "t3", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "r", "type": "INT", "nullable": false}
        ], "foreign_keys": [
            {"columns": ["r"], "references": {"grain": "a", "table": "t1"}, "on_delete": "SET NULL"}
        ]}
    ]}"#;
    let err = build_err(&[GRAIN_A, grain]);
    assert_eq!(err.errors.len(), 1);
}

#[test]
fn duplicate_foreign_key_is_rejected() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "table", "name": "t3", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "r", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["r"], "references": {"grain": "a", "table": "t1"}},
            {"name": "fk_other", "columns": ["r"], "references": {"grain": "a", "table": "t1"}}
        ]}
    ]}"#;
    let err = build_err(&[GRAIN_A, grain]);
    assert!(err.errors[0].message.contains("already defined"));
}

// =============================================================================
// Keys and indices
// =============================================================================

#[test]
fn primary_key_declared_twice_is_rejected() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "table", "name": "t", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "k", "type": "INT", "nullable": false}
        ], "primary_key": {"columns": ["k"]}}
    ]}"#;
    let err = build_err(&[grain]);
    assert!(err.errors[0].message.contains("More than one PRIMARY KEY definition"));
}

#[test]
fn read_only_table_may_lack_primary_key() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "table", "name": "t", "columns": [{"name": "v", "type": "TEXT"}],
         "options": {"read_only": true, "with_version_check": false}}
    ]}"#;
    let score = build(&[grain]);
    let table = score.grain("c").unwrap().table("t").unwrap();
    assert!(table.primary_key().is_empty());
    assert!(!table.is_versioned());
}

#[test]
fn index_rules() {
    let index = |columns: &str| {
        format!(
            r#"{{"name": "c", "elements": [
                {{"kind": "table", "name": "t", "columns": [
                    {{"name": "id", "type": "INT", "nullable": false, "primary_key": true}},
                    {{"name": "a", "type": "VARCHAR", "length": 10}},
                    {{"name": "b", "type": "DATETIME"}},
                    {{"name": "note", "type": "TEXT"}}
                ]}},
                {{"kind": "index", "name": "ix_first", "table": "t", "columns": ["a", "b"]}},
                {{"kind": "index", "name": "ix_second", "table": "t", "columns": {columns}}}
            ]}}"#
        )
    };
    assert_eq!(build(&[index(r#"["b"]"#).as_str()]).grain("c").unwrap().indices().len(), 2);
    assert_eq!(build_err(&[index(r#"["b", "a"]"#).as_str()]).errors[0].kind, ErrorKind::DuplicateName);
    assert_eq!(build_err(&[index(r#"["id"]"#).as_str()]).errors[0].kind, ErrorKind::IllegalKey);
    assert_eq!(build_err(&[index(r#"["note"]"#).as_str()]).errors[0].kind, ErrorKind::IllegalKey);
    assert_eq!(build_err(&[index(r#"["zzz"]"#).as_str()]).errors[0].kind, ErrorKind::Unresolved);
}

// =============================================================================
// Grain-level rules
// =============================================================================

#[test]
fn element_names_are_shared_across_kinds() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "sequence", "name": "t"},
        {"kind": "table", "name": "t", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true}
        ]}
    ]}"#;
    assert_eq!(build_err(&[grain]).errors[0].kind, ErrorKind::DuplicateName);
}

#[test]
fn sequence_default_and_limits() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "sequence", "name": "counter", "start_with": 10, "increment_by": 5},
        {"kind": "table", "name": "t", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true, "default": "NEXTVAL(counter)"}
        ]}
    ]}"#;
    let score = build(&[grain]);
    let c = score.grain("c").unwrap();
    assert_eq!(c.sequences()["counter"].start_with, 10);
    assert_eq!(c.table("t").unwrap().column("id").unwrap().sequence(), Some("counter"));

    let invalid = r#"{"name": "c", "elements": [
        {"kind": "sequence", "name": "s", "increment_by": 0}
    ]}"#;
    assert_eq!(build_err(&[invalid]).errors[0].kind, ErrorKind::IllegalDefinition);
}

#[test]
fn malformed_version_is_reported() {
    let grain = r#"{"name": "c", "version": "1.0,beta"}"#;
    assert_eq!(build_err(&[grain]).errors[0].kind, ErrorKind::MalformedVersion);
}

#[test]
fn invalid_default_is_reported() {
    let grain = r#"{"name": "c", "elements": [
        {"kind": "table", "name": "t", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "code", "type": "VARCHAR", "length": 2, "default": "'long'"}
        ]}
    ]}"#;
    let err = build_err(&[grain]);
    assert_eq!(err.errors[0].kind, ErrorKind::IllegalDefinition);
    assert!(err.errors[0].message.contains("Column 'code'"));
}
