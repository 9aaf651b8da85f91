//! Integration tests for views, materialized views and functions.

mod common;

use common::{build, build_err, GRAIN_A};
use oxide_score::error::ErrorKind;
use oxide_score::expr::ViewColumnType;
use oxide_score::view::{MvColumn, SURROGATE_COUNT};

const SALES: &str = r#"{
    "name": "sales",
    "version": "1.0",
    "elements": [
        {"kind": "table", "name": "orders", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "region", "type": "VARCHAR", "length": 8, "nullable": false},
            {"name": "amount", "type": "DECIMAL", "precision": 12, "scale": 2},
            {"name": "item", "type": "INT"}
        ], "foreign_keys": [
            {"columns": ["item"], "references": {"grain": "a", "table": "t1"}}
        ]},
        {"kind": "view", "name": "big_orders", "select": {
            "columns": [
                {"expr": {"field": {"table": "o", "column": "id"}}},
                {"alias": "label", "expr": {"arith": {"op": "||", "operands": [
                    {"field": {"column": "region"}}, {"text": "-"}
                ]}}},
                {"alias": "x", "expr": {"field": {"table": "i", "column": "x"}}}
            ],
            "from": [
                {"table": "orders", "alias": "o"},
                {"grain": "a", "table": "t1", "alias": "i", "join": "left", "on":
                    {"compare": {"op": "=", "left": {"field": {"table": "o", "column": "item"}},
                                 "right": {"field": {"table": "i", "column": "id"}}}}}
            ],
            "where": {"compare": {"op": ">", "left": {"field": {"column": "amount"}}, "right": {"int": 100}}}
        }},
        {"kind": "materialized_view", "name": "totals", "select": {
            "columns": [
                {"expr": {"field": {"column": "region"}}},
                {"alias": "total", "expr": {"aggregate": {"func": "SUM", "arg": {"field": {"column": "amount"}}}}},
                {"alias": "cnt", "expr": {"aggregate": {"func": "COUNT"}}}
            ],
            "from": [{"table": "orders"}],
            "group_by": ["region"]
        }},
        {"kind": "parameterized_view", "name": "by_region",
         "parameters": [{"name": "r", "type": "VARCHAR", "length": 8}],
         "select": {
            "columns": [{"expr": {"field": {"column": "id"}}}],
            "from": [{"table": "orders"}],
            "where": {"compare": {"op": "=", "left": {"field": {"column": "region"}}, "right": {"param": {"name": "r"}}}}
        }}
    ]
}"#;

#[test]
fn view_columns_are_typed() {
    let score = build(&[GRAIN_A, SALES]);
    let sales = score.grain("sales").unwrap();
    let view = &sales.views()["big_orders"];
    let columns = &view.select().columns;
    assert_eq!(columns.keys().collect::<Vec<_>>(), ["id", "label", "x"]);
    assert_eq!(columns["label"].meta.ty, ViewColumnType::Text);
    assert!(!columns["label"].meta.nullable);
    assert!(columns["x"].meta.nullable, "left-joined column is nullable");
    assert!(view.celesta_sql().contains("left join a.t1 as i on o.item = i.id"));
}

#[test]
fn materialized_view_gets_a_keyed_table() {
    let score = build(&[GRAIN_A, SALES]);
    let mv = &score.grain("sales").unwrap().materialized_views()["totals"];
    let table = mv.table();
    assert_eq!(table.primary_key(), ["region".to_string()]);
    assert_eq!(
        table.columns().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ["region", "total", "cnt", SURROGATE_COUNT]
    );
    assert_eq!(
        mv.mv_columns()["total"],
        MvColumn::Sum {
            source: "amount".to_string()
        }
    );
    assert_eq!(mv.checksum(), mv.checksum(), "checksum is stable");
}

#[test]
fn parameterized_view_is_registered() {
    let score = build(&[GRAIN_A, SALES]);
    let f = &score.grain("sales").unwrap().parameterized_views()["by_region"];
    assert_eq!(f.parameters().len(), 1);
    assert!(f.celesta_sql().ends_with("where region = $r"));
}

#[test]
fn view_depends_on_referenced_grain() {
    let err = build_err(&[SALES]);
    assert_eq!(err.errors.len(), 1);
    assert_eq!(err.errors[0].kind, ErrorKind::Unresolved);
    assert!(err.errors[0].message.contains("'a'"));
}

#[test]
fn view_errors_are_attributed_to_the_view() {
    let grain = r#"{"name": "v", "elements": [
        {"kind": "table", "name": "t", "columns": [
            {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
            {"name": "flag", "type": "BIT"}
        ]},
        {"kind": "view", "name": "bad", "select": {
            "columns": [{"expr": {"field": {"column": "id"}}}],
            "from": [{"table": "t"}],
            "where": {"compare": {"op": ">", "left": {"field": {"column": "flag"}}, "right": {"bool": true}}}
        }}
    ]}"#;
    let err = build_err(&[grain]);
    assert_eq!(err.errors[0].element.as_deref(), Some("bad"));
    assert_eq!(err.errors[0].kind, ErrorKind::TypeMismatch);
}

#[test]
fn materialized_view_cannot_read_other_grains() {
    let grain = r#"{"name": "v", "elements": [
        {"kind": "materialized_view", "name": "m", "select": {
            "columns": [
                {"expr": {"field": {"column": "id"}}},
                {"alias": "cnt", "expr": {"aggregate": {"func": "COUNT"}}}
            ],
            "from": [{"grain": "a", "table": "t1"}],
            "group_by": ["id"]
        }}
    ]}"#;
    let err = build_err(&[GRAIN_A, grain]);
    assert_eq!(err.errors[0].kind, ErrorKind::IllegalDefinition);
}
